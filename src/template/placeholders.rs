//! `{{...}}` placeholder scanning and substitution.
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Prefix that marks a placeholder as a secret reference.
pub const REFERENCE_PREFIX: &str = "op://";

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder regex is valid"));

/// Trimmed placeholder bodies in first-seen order, without duplicates.
fn placeholders(content: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in PLACEHOLDER.captures_iter(content) {
        let body = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
        if !body.is_empty() && !seen.contains(&body) {
            seen.push(body);
        }
    }
    seen
}

/// Secret references (`{{op://vault/item/field}}`).
#[must_use]
pub fn find_references(content: &str) -> Vec<String> {
    placeholders(content)
        .into_iter()
        .filter(|p| p.starts_with(REFERENCE_PREFIX))
        .collect()
}

/// Every other placeholder, e.g. `{{machine.name}}`.
#[must_use]
pub fn find_variables(content: &str) -> Vec<String> {
    placeholders(content)
        .into_iter()
        .filter(|p| !p.starts_with(REFERENCE_PREFIX))
        .collect()
}

/// Replace each placeholder whose trimmed body has a value; leave the rest
/// verbatim.
#[must_use]
pub fn replace_placeholders(content: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(content, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let body = caps.get(1).map_or("", |m| m.as_str()).trim();
            values
                .get(body)
                .cloned()
                .unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const CONTENT: &str = "\
[user]
  name = {{ git.name }}
  email = {{git.email}}
  signingkey = {{op://Private/GitHub/signing key}}
  host = {{machine.name}} {{git.name}}
";

    #[test]
    fn references_and_variables_are_split() {
        assert_eq!(
            find_references(CONTENT),
            vec!["op://Private/GitHub/signing key"]
        );
        assert_eq!(
            find_variables(CONTENT),
            vec!["git.name", "git.email", "machine.name"]
        );
    }

    #[test]
    fn unresolved_placeholders_pass_through() {
        let values = HashMap::from([("git.name".to_string(), "Ada".to_string())]);
        let out = replace_placeholders("{{ git.name }}/{{git.name}}/{{nope}}", &values);
        assert_eq!(out, "Ada/Ada/{{nope}}");
    }

    #[test]
    fn no_placeholders() {
        assert!(find_variables("plain text { not } {{}}").is_empty());
    }
}
