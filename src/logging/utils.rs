//! Log file location, ANSI stripping and timestamps.
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[^@-~]*[@-~]?|.)?").expect("ANSI escape regex is valid")
});

/// Strip ANSI escape sequences (CSI and two-character escapes) from `s`.
pub(super) fn strip_ansi(s: &str) -> String {
    ANSI_ESCAPE.replace_all(s, "").into_owned()
}

/// Return the `$XDG_CACHE_HOME/perch/` directory, creating it if needed.
///
/// Falls back to the platform cache directory, then `./.cache`.
pub(super) fn perch_cache_dir() -> Option<PathBuf> {
    let cache_dir = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from(".cache"));
    let dir = cache_dir.join("perch");
    fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Return the log file path for `command` under [`perch_cache_dir`].
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    Some(perch_cache_dir()?.join(format!("{command}.log")))
}

/// Format the current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub(super) fn format_utc_datetime() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format the current UTC time as `HH:MM:SS`.
pub(super) fn format_utc_time() -> String {
    chrono::Utc::now().format("%H:%M:%S").to_string()
}
