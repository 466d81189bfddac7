//! Link resource: classification and convergence of one (source, target) pair.
use anyhow::{Context as _, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::config::LinkKind;
#[cfg(windows)]
use crate::error::ResourceError;

/// Hint appended when Windows refuses to create a symlink.
pub const PRIVILEGE_HINT: &str =
    "creating symlinks requires Developer Mode or an elevated shell; enable Developer Mode in Settings > System > For developers";

/// The facts about a directory entry that classification needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkMetadata {
    /// The entry is a symlink or junction.
    pub is_link: bool,
    /// The entry is (or, for links, behaves as) a directory.
    pub is_dir: bool,
}

/// OS primitives for inspecting and creating links.
#[cfg_attr(test, mockall::automock)]
pub trait LinkProvider: Send + Sync + std::fmt::Debug {
    /// Metadata of `path` without following links.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotFound`] when nothing exists at `path`
    /// (not even a dangling link), or any other probe failure.
    fn symlink_metadata(&self, path: &Path) -> io::Result<LinkMetadata>;

    /// Destination of the link at `path`, as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a link or cannot be read.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create a link at `target` pointing to `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be created.
    fn create_link(&self, source: &Path, target: &Path, kind: LinkKind) -> Result<()>;

    /// Remove the link at `target` (never its destination).
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be removed.
    fn remove_link(&self, target: &Path) -> Result<()>;
}

/// Relationship between a target path and the desired source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Target is a link to the source.
    Linked,
    /// Target is a link to somewhere else.
    Drift {
        /// Where the link currently points.
        current: PathBuf,
    },
    /// Target is a regular file or directory.
    Conflict,
    /// Nothing exists at the target.
    Missing,
    /// The target could not be probed.
    Error {
        /// Probe failure text.
        message: String,
    },
}

/// One desired link, checked and applied through a [`LinkProvider`].
#[derive(Debug, Clone)]
pub struct LinkResource {
    /// What the link points to.
    pub source: PathBuf,
    /// Where the link lives.
    pub target: PathBuf,
    /// Link flavour.
    pub kind: LinkKind,
    /// Compare destinations ignoring case.
    pub case_insensitive: bool,
    provider: Arc<dyn LinkProvider>,
}

impl LinkResource {
    /// Create a new link resource.
    #[must_use]
    pub fn new(
        source: PathBuf,
        target: PathBuf,
        kind: LinkKind,
        case_insensitive: bool,
        provider: Arc<dyn LinkProvider>,
    ) -> Self {
        Self {
            source,
            target,
            kind,
            case_insensitive,
            provider,
        }
    }

    /// Classify the target. Never fails; probe failures become
    /// [`LinkState::Error`].
    #[must_use]
    pub fn classify(&self) -> LinkState {
        let meta = match self.provider.symlink_metadata(&self.target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return LinkState::Missing,
            Err(e) => {
                return LinkState::Error {
                    message: e.to_string(),
                };
            }
        };

        if !meta.is_link {
            return LinkState::Conflict;
        }

        match self.provider.read_link(&self.target) {
            Ok(dest) => {
                let dest = resolve_against_parent(&self.target, &dest);
                if paths_equal(&dest, &self.source, self.case_insensitive) {
                    LinkState::Linked
                } else {
                    LinkState::Drift { current: dest }
                }
            }
            Err(e) => LinkState::Error {
                message: e.to_string(),
            },
        }
    }
}

impl Applicable for LinkResource {
    fn description(&self) -> String {
        format!("{} -> {}", self.target.display(), self.source.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        match self.classify() {
            LinkState::Linked => return Ok(ResourceChange::AlreadyCorrect),
            LinkState::Conflict => {
                return Ok(ResourceChange::Failed {
                    message: "Target exists and is not a link; resolve manually".to_string(),
                });
            }
            LinkState::Error { message } => return Ok(ResourceChange::Failed { message }),
            LinkState::Drift { .. } => self
                .provider
                .remove_link(&self.target)
                .with_context(|| format!("remove existing: {}", self.target.display()))?,
            LinkState::Missing => super::helpers::fs::ensure_parent_dir(&self.target)?,
        }

        self.provider
            .create_link(&self.source, &self.target, self.kind)
            .with_context(|| format!("create link: {}", self.target.display()))?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for LinkResource {
    fn current_state(&self) -> Result<ResourceState> {
        Ok(match self.classify() {
            LinkState::Linked => ResourceState::Correct,
            LinkState::Missing => ResourceState::Missing,
            LinkState::Drift { current } => ResourceState::Incorrect {
                current: current.display().to_string(),
            },
            LinkState::Conflict => ResourceState::Invalid {
                reason: "target exists and is not a link".to_string(),
            },
            LinkState::Error { message } => ResourceState::Invalid { reason: message },
        })
    }
}

/// Relative link destinations are relative to the link's own directory.
fn resolve_against_parent(link: &Path, dest: &Path) -> PathBuf {
    if dest.is_absolute() {
        return dest.to_path_buf();
    }
    link.parent()
        .map_or_else(|| dest.to_path_buf(), |parent| parent.join(dest))
}

/// Compare two paths, stripping the Windows verbatim prefix and optionally
/// ignoring case.
fn paths_equal(a: &Path, b: &Path, case_insensitive: bool) -> bool {
    let normalize = |p: &Path| -> String {
        let s = p.to_string_lossy();
        let s = s.strip_prefix(r"\\?\").unwrap_or(&s);
        let s = s.trim_end_matches(['/', '\\']);
        if case_insensitive {
            s.to_lowercase()
        } else {
            s.to_string()
        }
    };
    normalize(a) == normalize(b)
}

/// [`LinkProvider`] backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLinkProvider;

impl LinkProvider for SystemLinkProvider {
    fn symlink_metadata(&self, path: &Path) -> io::Result<LinkMetadata> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(LinkMetadata {
            is_link: meta.is_symlink() || is_junction(&meta),
            is_dir: is_dir_like(&meta),
        })
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn create_link(&self, source: &Path, target: &Path, kind: LinkKind) -> Result<()> {
        create_link(source, target, kind)
    }

    fn remove_link(&self, target: &Path) -> Result<()> {
        remove_link(target)
    }
}

/// Create a link at `link` pointing to `source`.
fn create_link(source: &Path, link: &Path, kind: LinkKind) -> Result<()> {
    #[cfg(unix)]
    {
        let _ = kind;
        std::os::unix::fs::symlink(source, link).with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                source.display()
            )
        })?;
    }

    #[cfg(windows)]
    {
        use crate::exec;

        if kind == LinkKind::Junction {
            let link_str = link.to_string_lossy();
            let source_str = source.to_string_lossy();
            exec::run("cmd", &["/c", "mklink", "/J", &link_str, &source_str])?;
            return Ok(());
        }

        let result = if source.is_dir() {
            std::os::windows::fs::symlink_dir(source, link)
        } else {
            std::os::windows::fs::symlink_file(source, link)
        };
        match result {
            Ok(()) => {}
            // ERROR_PRIVILEGE_NOT_HELD
            Err(e) if e.raw_os_error() == Some(1314) => {
                return Err(ResourceError::Link(format!("{e} ({PRIVILEGE_HINT})")).into());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "creating symlink {} -> {}",
                        link.display(),
                        source.display()
                    )
                });
            }
        }
    }

    Ok(())
}

/// Remove a link, handling platform differences.
///
/// On Windows, directory symlinks and junctions must be removed with
/// `remove_dir`. If that fails with access denied, fall back to
/// `cmd /c rmdir` which runs in a separate process.
fn remove_link(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("reading metadata: {}", path.display()))?;
    if cfg!(windows) && is_dir_like(&meta) {
        match std::fs::remove_dir(path) {
            Ok(()) => {}
            #[cfg(windows)]
            Err(e) if e.raw_os_error() == Some(5) => remove_dir_fallback(path)?,
            Err(e) => return Err(e.into()),
        }
    } else {
        std::fs::remove_file(path).with_context(|| format!("removing link: {}", path.display()))?;
    }
    Ok(())
}

/// `symlink_metadata().is_dir()` is `false` for directory symlinks on
/// Windows, so check the raw `FILE_ATTRIBUTE_DIRECTORY` bit there.
fn is_dir_like(meta: &std::fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x10 != 0
    }
    #[cfg(not(windows))]
    {
        meta.is_dir()
    }
}

/// Junctions are reparse points that `is_symlink` does not report.
fn is_junction(meta: &std::fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x400 != 0
    }
    #[cfg(not(windows))]
    {
        let _ = meta;
        false
    }
}

#[cfg(windows)]
fn remove_dir_fallback(path: &Path) -> Result<()> {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    use std::os::windows::process::CommandExt;
    let output = std::process::Command::new("cmd")
        .arg("/c")
        .arg("rmdir")
        .arg("/q")
        .arg(path)
        .creation_flags(CREATE_NO_WINDOW)
        .output()
        .context("failed to run rmdir")?;
    if !output.status.success() {
        anyhow::bail!(
            "remove link '{}': {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
