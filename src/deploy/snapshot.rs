//! Pre-deploy snapshots of every path a run may touch, and their restore.
//!
//! Layout: `<backup-root>/<YYYYMMDD-HHMMSS>/` holds one `<index>-<file name>`
//! copy per captured path plus a `snapshot.json` index. Links are not
//! copied; the index records their destination.
use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::cancel::CancellationToken;
use crate::config::LinkKind;
use crate::resources::helpers::fs::{copy_dir_recursive, copy_path};
use crate::resources::link::LinkProvider;

/// Name of the per-snapshot index file.
pub const INDEX_FILE: &str = "snapshot.json";

const ID_FORMAT: &str = "%Y%m%d-%H%M%S";

/// How a path was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file, copied.
    File,
    /// Directory, copied recursively.
    Directory,
    /// Link, recorded by destination.
    Link,
}

/// One captured path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// File name of the original path.
    pub file_name: String,
    /// Name of the copy inside the snapshot directory (empty for links).
    pub stored_as: String,
    /// Where the entry came from.
    pub original_path: PathBuf,
    /// Capture kind.
    pub kind: EntryKind,
    /// Link destination, for [`EntryKind::Link`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotIndex {
    created: DateTime<Utc>,
    entries: Vec<SnapshotEntry>,
}

/// A snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Directory name, e.g. `20250215-120000`.
    pub id: String,
    /// Snapshot directory.
    pub path: PathBuf,
    /// Creation time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Captured entries in capture order.
    pub entries: Vec<SnapshotEntry>,
}

/// Outcome of restoring one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreOutcome {
    /// The original content is back in place.
    Restored,
    /// Nothing to do; the path already matches the snapshot.
    Skipped,
    /// The entry could not be restored.
    Error,
}

/// Restore result for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreResult {
    /// Entry file name (or the snapshot id for snapshot-level errors).
    pub file_name: String,
    /// Path the entry is restored to.
    pub original_path: PathBuf,
    /// What happened.
    pub outcome: RestoreOutcome,
    /// Detail for skips and errors.
    pub message: Option<String>,
}

/// Creates, lists and restores snapshots.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotProvider: Send + Sync + std::fmt::Debug {
    /// Capture every existing path in `paths`.
    ///
    /// Returns `Ok(None)` when none of the paths exist. Per-path failures are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot directory or index cannot be written.
    fn create_snapshot(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Option<SnapshotInfo>>;

    /// Every snapshot under the backup root, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup root exists but cannot be read.
    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>>;

    /// Restore snapshot `id`, optionally only entries named `file`.
    #[allow(clippy::needless_lifetimes)]
    fn restore_snapshot<'a>(
        &self,
        id: &str,
        file: Option<&'a str>,
        cancel: &CancellationToken,
    ) -> Vec<RestoreResult>;
}

/// [`SnapshotProvider`] writing to a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsSnapshotProvider {
    root: PathBuf,
    links: Arc<dyn LinkProvider>,
}

impl FsSnapshotProvider {
    /// Provider storing snapshots under `root`.
    #[must_use]
    pub fn new(root: PathBuf, links: Arc<dyn LinkProvider>) -> Self {
        Self { root, links }
    }

    /// The backup root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn new_snapshot_dir(&self) -> Result<(String, PathBuf)> {
        let base = Utc::now().format(ID_FORMAT).to_string();
        let mut id = base.clone();
        let mut suffix = 1;
        while self.root.join(&id).exists() {
            suffix += 1;
            id = format!("{base}-{suffix}");
        }
        let dir = self.root.join(&id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
        Ok((id, dir))
    }

    fn capture(&self, index: usize, path: &Path, dir: &Path) -> Result<SnapshotEntry> {
        let file_name = path
            .file_name()
            .map_or_else(|| "root".to_string(), |n| n.to_string_lossy().into_owned());
        let meta = self
            .links
            .symlink_metadata(path)
            .with_context(|| format!("reading metadata: {}", path.display()))?;

        if meta.is_link {
            let dest = self
                .links
                .read_link(path)
                .with_context(|| format!("reading link: {}", path.display()))?;
            return Ok(SnapshotEntry {
                file_name,
                stored_as: String::new(),
                original_path: path.to_path_buf(),
                kind: EntryKind::Link,
                link_target: Some(dest),
            });
        }

        let stored_as = format!("{index}-{file_name}");
        let dest = dir.join(&stored_as);
        let kind = if meta.is_dir {
            copy_dir_recursive(path, &dest)?;
            EntryKind::Directory
        } else {
            std::fs::copy(path, &dest)
                .with_context(|| format!("copying {}", path.display()))?;
            EntryKind::File
        };
        Ok(SnapshotEntry {
            file_name,
            stored_as,
            original_path: path.to_path_buf(),
            kind,
            link_target: None,
        })
    }

    fn read_index(dir: &Path) -> Result<SnapshotIndex> {
        let path = dir.join(INDEX_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("snapshot manifest not readable: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid snapshot manifest: {}", path.display()))
    }

    fn restore_entry(&self, dir: &Path, entry: &SnapshotEntry) -> Result<RestoreOutcome> {
        let target = &entry.original_path;
        match entry.kind {
            EntryKind::Link => {
                let dest = entry
                    .link_target
                    .as_deref()
                    .context("link entry without destination")?;
                if self.links.read_link(target).is_ok_and(|d| d == dest) {
                    return Ok(RestoreOutcome::Skipped);
                }
                self.move_aside(target)?;
                crate::resources::helpers::fs::ensure_parent_dir(target)?;
                self.links.create_link(dest, target, LinkKind::Symlink)?;
            }
            EntryKind::File | EntryKind::Directory => {
                let stored = dir.join(&entry.stored_as);
                if entry.kind == EntryKind::File && same_file_content(&stored, target) {
                    return Ok(RestoreOutcome::Skipped);
                }
                self.move_aside(target)?;
                copy_path(&stored, target)?;
            }
        }
        Ok(RestoreOutcome::Restored)
    }

    /// Clear `path` for a restore: links are removed, real files and
    /// directories are renamed to `<name>.pre-restore`.
    fn move_aside(&self, path: &Path) -> Result<()> {
        let meta = match self.links.symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        if meta.is_link {
            return self.links.remove_link(path);
        }
        let mut aside = path.as_os_str().to_owned();
        aside.push(".pre-restore");
        let aside = PathBuf::from(aside);
        if aside.is_dir() {
            std::fs::remove_dir_all(&aside)
                .with_context(|| format!("removing {}", aside.display()))?;
        } else if aside.exists() {
            std::fs::remove_file(&aside)
                .with_context(|| format!("removing {}", aside.display()))?;
        }
        std::fs::rename(path, &aside)
            .with_context(|| format!("moving {} aside", path.display()))
    }
}

fn same_file_content(a: &Path, b: &Path) -> bool {
    match (std::fs::read(a), std::fs::read(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn parse_id_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let stamp = id.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, ID_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

fn snapshot_error(id: &str, message: String) -> RestoreResult {
    RestoreResult {
        file_name: id.to_string(),
        original_path: PathBuf::new(),
        outcome: RestoreOutcome::Error,
        message: Some(message),
    }
}

impl SnapshotProvider for FsSnapshotProvider {
    fn create_snapshot(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Option<SnapshotInfo>> {
        let mut seen = HashSet::new();
        let existing: Vec<&PathBuf> = paths
            .iter()
            .filter(|p| seen.insert(p.as_path()))
            .filter(|p| self.links.symlink_metadata(p).is_ok())
            .collect();
        if existing.is_empty() {
            tracing::debug!("no existing target paths, skipping snapshot");
            return Ok(None);
        }

        let (id, dir) = self.new_snapshot_dir()?;
        let entries: Vec<SnapshotEntry> = existing
            .par_iter()
            .enumerate()
            .filter_map(|(index, path)| {
                if cancel.is_cancelled() {
                    return None;
                }
                match self.capture(index, path, &dir) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!("snapshot skipped {}: {e:#}", path.display());
                        None
                    }
                }
            })
            .collect();

        let index = SnapshotIndex {
            created: Utc::now(),
            entries,
        };
        let json = serde_json::to_string_pretty(&index).context("serializing snapshot index")?;
        std::fs::write(dir.join(INDEX_FILE), json)
            .with_context(|| format!("writing {}", dir.join(INDEX_FILE).display()))?;
        tracing::debug!(
            "snapshot {id}: {} path(s) in {}",
            index.entries.len(),
            dir.display()
        );

        Ok(Some(SnapshotInfo {
            id,
            path: dir,
            timestamp: index.created,
            entries: index.entries,
        }))
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut snapshots = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("reading {}", self.root.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let id = entry.file_name().to_string_lossy().into_owned();
            if !path.is_dir() {
                continue;
            }
            let Some(stamp) = parse_id_timestamp(&id) else {
                continue;
            };
            let (timestamp, entries) = match Self::read_index(&path) {
                Ok(index) => (index.created, index.entries),
                Err(e) => {
                    tracing::debug!("{e:#}");
                    (stamp, Vec::new())
                }
            };
            snapshots.push(SnapshotInfo {
                id,
                path,
                timestamp,
                entries,
            });
        }
        snapshots.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(snapshots)
    }

    #[allow(clippy::needless_lifetimes)]
    fn restore_snapshot<'a>(
        &self,
        id: &str,
        file: Option<&'a str>,
        cancel: &CancellationToken,
    ) -> Vec<RestoreResult> {
        let dir = self.root.join(id);
        if id.contains(['/', '\\']) || !dir.is_dir() {
            return vec![snapshot_error(id, format!("Snapshot '{id}' not found"))];
        }
        let index = match Self::read_index(&dir) {
            Ok(index) => index,
            Err(e) => return vec![snapshot_error(id, format!("{e:#}"))],
        };

        let mut results = Vec::new();
        for entry in index
            .entries
            .iter()
            .filter(|e| file.is_none_or(|f| e.file_name.eq_ignore_ascii_case(f)))
        {
            if cancel.is_cancelled() {
                break;
            }
            let (outcome, message) = match self.restore_entry(&dir, entry) {
                Ok(RestoreOutcome::Skipped) => (
                    RestoreOutcome::Skipped,
                    Some("already matches snapshot".to_string()),
                ),
                Ok(outcome) => (outcome, None),
                Err(e) => (RestoreOutcome::Error, Some(format!("{e:#}"))),
            };
            results.push(RestoreResult {
                file_name: entry.file_name.clone(),
                original_path: entry.original_path.clone(),
                outcome,
                message,
            });
        }
        results
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::link::SystemLinkProvider;

    fn provider(dir: &Path) -> FsSnapshotProvider {
        FsSnapshotProvider::new(dir.join("backups"), Arc::new(SystemLinkProvider))
    }

    #[test]
    fn no_existing_paths_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(dir.path());
        let snapshot = p
            .create_snapshot(&[dir.path().join("missing")], &CancellationToken::new())
            .unwrap();
        assert!(snapshot.is_none());
        assert!(!p.root().exists());
    }

    #[test]
    fn captures_files_and_directories_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();
        let sub = dir.path().join("conf");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("x"), "x").unwrap();

        let p = provider(dir.path());
        let snapshot = p
            .create_snapshot(
                &[file.clone(), dir.path().join("missing"), sub.clone(), file],
                &CancellationToken::new(),
            )
            .unwrap()
            .unwrap();

        let names: Vec<_> = snapshot.entries.iter().map(|e| e.stored_as.as_str()).collect();
        assert_eq!(names, vec!["0-a.txt", "1-conf"]);
        assert!(snapshot.path.join(INDEX_FILE).is_file());
        assert_eq!(
            std::fs::read_to_string(snapshot.path.join("1-conf").join("x")).unwrap(),
            "x"
        );
        assert!(parse_id_timestamp(&snapshot.id).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn links_are_recorded_by_destination() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join(".gitconfig");
        std::os::unix::fs::symlink("/repo/git/.gitconfig", &link).unwrap();

        let snapshot = provider(dir.path())
            .create_snapshot(&[link], &CancellationToken::new())
            .unwrap()
            .unwrap();
        let entry = &snapshot.entries[0];
        assert_eq!(entry.kind, EntryKind::Link);
        assert_eq!(
            entry.link_target.as_deref(),
            Some(Path::new("/repo/git/.gitconfig"))
        );
    }

    #[test]
    fn restore_puts_original_back() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "original").unwrap();
        let p = provider(dir.path());
        let snapshot = p
            .create_snapshot(&[file.clone()], &CancellationToken::new())
            .unwrap()
            .unwrap();

        std::fs::write(&file, "modified").unwrap();
        let results = p.restore_snapshot(&snapshot.id, None, &CancellationToken::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, RestoreOutcome::Restored);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");
        assert!(dir.path().join("a.txt.pre-restore").exists());

        let again = p.restore_snapshot(&snapshot.id, None, &CancellationToken::new());
        assert_eq!(again[0].outcome, RestoreOutcome::Skipped);
    }

    #[test]
    fn restore_filters_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();
        let p = provider(dir.path());
        let snapshot = p
            .create_snapshot(&[a.clone(), b.clone()], &CancellationToken::new())
            .unwrap()
            .unwrap();
        std::fs::write(&a, "a2").unwrap();
        std::fs::write(&b, "b2").unwrap();

        let results = p.restore_snapshot(&snapshot.id, Some("a.txt"), &CancellationToken::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_name, "a.txt");
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "b2");
    }

    #[test]
    fn restore_unknown_or_broken_snapshot_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(dir.path());
        let results = p.restore_snapshot("nonexistent", None, &CancellationToken::new());
        assert_eq!(results[0].outcome, RestoreOutcome::Error);
        assert!(results[0].message.as_deref().unwrap().contains("not found"));

        std::fs::create_dir_all(p.root().join("20250101-120000")).unwrap();
        let results = p.restore_snapshot("20250101-120000", None, &CancellationToken::new());
        assert_eq!(results[0].outcome, RestoreOutcome::Error);
        assert!(results[0].message.as_deref().unwrap().contains("manifest"));
    }

    #[test]
    fn list_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(dir.path());
        assert!(p.list_snapshots().unwrap().is_empty());
        for id in ["20250101-120000", "20250301-080000", "not-a-snapshot"] {
            std::fs::create_dir_all(p.root().join(id)).unwrap();
        }
        let ids: Vec<_> = p.list_snapshots().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["20250301-080000", "20250101-120000"]);
    }
}
