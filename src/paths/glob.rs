//! Glob resolution of expanded link targets.
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};

/// Resolves a target expression to concrete paths.
pub trait GlobResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `expr` to zero or more paths.
    ///
    /// An expression without wildcards resolves to itself whether or not it
    /// exists.
    fn resolve(&self, expr: &str) -> Vec<PathBuf>;
}

/// Walks the filesystem segment by segment, matching wildcard segments
/// (`*`, `?`, `[..]`) against directory entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsGlobResolver;

impl GlobResolver for FsGlobResolver {
    fn resolve(&self, expr: &str) -> Vec<PathBuf> {
        resolve(expr)
    }
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

fn segment_matcher(segment: &str) -> Option<GlobMatcher> {
    GlobBuilder::new(segment)
        .literal_separator(true)
        .case_insensitive(cfg!(windows))
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| tracing::debug!("invalid glob segment '{segment}': {e}"))
        .ok()
}

/// Matching children of `dir`. Only directories qualify for inner segments.
fn matching_children(dir: &Path, matcher: &GlobMatcher, dirs_only: bool) -> Vec<PathBuf> {
    let read_from = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let Ok(entries) = std::fs::read_dir(read_from) else {
        return Vec::new();
    };
    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| matcher.is_match(entry.file_name()))
        .map(|entry| dir.join(entry.file_name()))
        .filter(|path| !dirs_only || path.is_dir())
        .collect();
    matches.sort();
    matches
}

/// Resolve `expr` against the real filesystem.
#[must_use]
pub fn resolve(expr: &str) -> Vec<PathBuf> {
    if !has_wildcard(expr) {
        return vec![PathBuf::from(expr)];
    }

    let components: Vec<Component<'_>> = Path::new(expr).components().collect();
    let last = components.len().saturating_sub(1);
    let mut current = vec![PathBuf::new()];

    for (i, component) in components.iter().enumerate() {
        let segment = component.as_os_str().to_string_lossy();
        let is_normal = matches!(component, Component::Normal(_));

        if !is_normal || !has_wildcard(&segment) {
            for path in &mut current {
                path.push(component.as_os_str());
            }
            continue;
        }

        let Some(matcher) = segment_matcher(&segment) else {
            return Vec::new();
        };
        current = current
            .iter()
            .flat_map(|dir| matching_children(dir, &matcher, i != last))
            .collect();
        if current.is_empty() {
            break;
        }
    }

    current
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn expr(path: &Path) -> String {
        path.display().to_string()
    }

    #[test]
    fn literal_path_resolves_to_itself() {
        assert_eq!(
            resolve("/definitely/missing/file"),
            vec![PathBuf::from("/definitely/missing/file")]
        );
    }

    #[test]
    fn star_in_last_segment_matches_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "").unwrap();
        std::fs::write(dir.path().join("b.json"), "").unwrap();
        std::fs::write(dir.path().join("c.txt"), "").unwrap();

        let found = resolve(&expr(&dir.path().join("*.json")));
        assert_eq!(
            found,
            vec![dir.path().join("a.json"), dir.path().join("b.json")]
        );
    }

    #[test]
    fn wildcard_in_middle_segment_only_descends_directories() {
        let dir = tempfile::tempdir().unwrap();
        for profile in ["abc.default", "xyz.default-release"] {
            std::fs::create_dir_all(dir.path().join(profile)).unwrap();
        }
        std::fs::write(dir.path().join("file.default"), "").unwrap();

        let found = resolve(&expr(&dir.path().join("*.default*").join("user.js")));
        assert_eq!(
            found,
            vec![
                dir.path().join("abc.default").join("user.js"),
                dir.path().join("xyz.default-release").join("user.js"),
            ]
        );
    }

    #[test]
    fn question_mark_and_class() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["v1", "v2", "vx"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(resolve(&expr(&dir.path().join("v?"))).len(), 3);
        assert_eq!(
            resolve(&expr(&dir.path().join("v[0-9]"))),
            vec![dir.path().join("v1"), dir.path().join("v2")]
        );
    }

    #[test]
    fn no_match_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve(&expr(&dir.path().join("missing*").join("x"))).is_empty());
    }
}
