//! Environment expansion of link target expressions.
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static WINDOWS_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([^%]+)%").expect("windows variable regex is valid"));

#[allow(clippy::expect_used)]
static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}").expect("braced variable regex is valid")
});

#[allow(clippy::expect_used)]
static UNIX_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("unix variable regex is valid")
});

/// Expand `%VAR%`, `${VAR}`, `$VAR` and a leading `~` in `input`.
///
/// Names resolve from `variables` first (machine profile variables), then the
/// process environment. Unknown names are left verbatim.
#[must_use]
pub fn expand(input: &str, variables: Option<&HashMap<String, String>>) -> String {
    expand_with(
        input,
        variables,
        |name| std::env::var(name).ok(),
        dirs::home_dir().as_deref(),
    )
}

/// [`expand`] with an explicit environment lookup and home directory.
#[must_use]
pub fn expand_with(
    input: &str,
    variables: Option<&HashMap<String, String>>,
    env: impl Fn(&str) -> Option<String>,
    home: Option<&Path>,
) -> String {
    let lookup = |caps: &Captures<'_>| -> String {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let name = caps.get(1).map_or("", |m| m.as_str());
        variables
            .and_then(|vars| vars.get(name).cloned())
            .or_else(|| env(name))
            .unwrap_or_else(|| whole.to_string())
    };

    let result = WINDOWS_VAR.replace_all(input, &lookup);
    let result = BRACED_VAR.replace_all(&result, &lookup);
    let result = UNIX_VAR.replace_all(&result, &lookup).into_owned();

    expand_tilde(&result, home)
}

fn expand_tilde(input: &str, home: Option<&Path>) -> String {
    let Some(home) = home else {
        return input.to_string();
    };
    if input == "~" {
        return home.display().to_string();
    }
    match input.strip_prefix("~/").or_else(|| input.strip_prefix("~\\")) {
        Some(rest) => home.join(rest).display().to_string(),
        None => input.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/me".to_string()),
            "APPDATA" => Some("C:/Users/me/AppData/Roaming".to_string()),
            _ => None,
        }
    }

    fn run(input: &str, vars: Option<&HashMap<String, String>>) -> String {
        expand_with(input, vars, env, Some(Path::new("/home/me")))
    }

    #[test]
    fn expands_all_variable_styles() {
        assert_eq!(run("$HOME/.gitconfig", None), "/home/me/.gitconfig");
        assert_eq!(run("${HOME}/.config", None), "/home/me/.config");
        assert_eq!(
            run("%APPDATA%/Code/User", None),
            "C:/Users/me/AppData/Roaming/Code/User"
        );
    }

    #[test]
    fn profile_variables_win_over_environment() {
        let vars = HashMap::from([("HOME".to_string(), "/custom".to_string())]);
        assert_eq!(run("$HOME/x", Some(&vars)), "/custom/x");
    }

    #[test]
    fn unknown_names_left_verbatim() {
        assert_eq!(
            run("%NOPE%/$MISSING/${GONE}", None),
            "%NOPE%/$MISSING/${GONE}"
        );
    }

    #[test]
    fn leading_tilde_expands_to_home() {
        assert_eq!(
            run("~/.bashrc", None),
            Path::new("/home/me").join(".bashrc").display().to_string()
        );
        assert_eq!(run("~", None), "/home/me");
        assert_eq!(run("a/~/b", None), "a/~/b");
    }
}
