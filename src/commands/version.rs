//! Command: print version information.
use anyhow::{Context as _, Result};

/// Version string: `PERCH_VERSION` from the build, else the crate version.
#[must_use]
pub const fn version() -> &'static str {
    match option_env!("PERCH_VERSION") {
        Some(version) => version,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Print the perch version to `out`.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn run(out: &mut dyn std::io::Write) -> Result<i32> {
    writeln!(out, "perch {}", version()).context("writing version")?;
    Ok(0)
}
