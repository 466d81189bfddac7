//! Operating system detection.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Microsoft Windows.
    Windows,
    /// Any Linux distribution.
    Linux,
    /// Apple macOS.
    #[serde(alias = "macOS", alias = "osx")]
    MacOs,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::Linux => write!(f, "linux"),
            Self::MacOs => write!(f, "macos"),
        }
    }
}

impl std::str::FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" | "osx" => Ok(Self::MacOs),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Platform information for the current system.
#[derive(Debug, Clone)]
pub struct Platform {
    /// Operating system the engine runs on.
    pub os: Os,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub const fn detect() -> Self {
        Self {
            os: Self::detect_os(),
        }
    }

    /// Create a platform with an explicit OS (tests and cross-platform previews).
    #[must_use]
    pub const fn new(os: Os) -> Self {
        Self { os }
    }

    /// The operating system.
    #[must_use]
    pub const fn os(&self) -> Os {
        self.os
    }

    /// Whether path comparisons should ignore case.
    ///
    /// NTFS and APFS are case-insensitive by default; Linux filesystems are not.
    #[must_use]
    pub fn paths_case_insensitive(&self) -> bool {
        matches!(self.os, Os::Windows | Os::MacOs)
    }

    const fn detect_os() -> Os {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else {
            // Other Unix-likes behave like Linux for our purposes
            Os::Linux
        }
    }
}
