//! Ad-hoc change tracking for one directory.
//!
//! `start` records the size and SHA-256 of every file below a root into a
//! JSON state file; `stop` rescans the same root, lists what was added,
//! modified or deleted since, and removes the state file.
use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::deploy::CancellationToken;

/// State file name inside the perch config directory.
pub const STATE_FILE: &str = "diff-snapshot.json";

/// One recorded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the root, `/`-separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the contents.
    pub hash: String,
}

/// What `start` wrote to the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffState {
    /// Absolute directory that was scanned.
    pub root: PathBuf,
    /// When the scan ran.
    pub captured_at: DateTime<Utc>,
    /// Every file below `root`, sorted by path.
    pub files: Vec<FileRecord>,
}

/// How a file changed between `start` and `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Present now, absent before.
    Added,
    /// Present in both with different contents.
    Modified,
    /// Present before, absent now.
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
        })
    }
}

/// One changed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffChange {
    /// Path relative to the root, `/`-separated.
    pub path: String,
    /// Kind of change.
    pub kind: ChangeKind,
}

/// Result of `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    /// Directory that was compared.
    pub root: PathBuf,
    /// Changes sorted by path.
    pub changes: Vec<DiffChange>,
}

/// Keeps one [`DiffState`] in a JSON file.
#[derive(Debug, Clone)]
pub struct DiffTracker {
    state_path: PathBuf,
}

impl DiffTracker {
    /// Tracker storing its state at `state_path`.
    #[must_use]
    pub const fn new(state_path: PathBuf) -> Self {
        Self { state_path }
    }

    /// `<config dir>/perch/diff-snapshot.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("perch")
            .join(STATE_FILE)
    }

    /// Where the state lives.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Whether a `start` is waiting for its `stop`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state_path.is_file()
    }

    /// Record every file below `root`, replacing any earlier state.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a directory, a file cannot be read,
    /// the scan is cancelled or the state cannot be written.
    pub fn start(&self, root: &Path, cancel: &CancellationToken) -> Result<DiffState> {
        if !root.is_dir() {
            bail!("Directory not found: {}", root.display());
        }
        let root = dunce::canonicalize(root)
            .with_context(|| format!("resolving {}", root.display()))?;
        let state = DiffState {
            files: scan(&root, cancel)?,
            root,
            captured_at: Utc::now(),
        };

        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&state).context("serializing diff state")?;
        std::fs::write(&self.state_path, json)
            .with_context(|| format!("writing {}", self.state_path.display()))?;
        Ok(state)
    }

    /// Compare the recorded root against its current contents and clear the
    /// state. Returns `None` when no `start` preceded this call.
    ///
    /// A root that no longer exists reports every recorded file as deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file is unreadable, a file cannot be
    /// hashed or the scan is cancelled. The state is kept in those cases.
    pub fn stop(&self, cancel: &CancellationToken) -> Result<Option<DiffReport>> {
        let content = match std::fs::read_to_string(&self.state_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.state_path.display()));
            }
        };
        let before: DiffState = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.state_path.display()))?;

        let after = if before.root.is_dir() {
            scan(&before.root, cancel)?
        } else {
            Vec::new()
        };
        let changes = compare(&before.files, &after);

        std::fs::remove_file(&self.state_path)
            .with_context(|| format!("removing {}", self.state_path.display()))?;
        Ok(Some(DiffReport {
            root: before.root,
            changes,
        }))
    }
}

/// Changes from `before` to `after`, sorted by path.
#[must_use]
pub fn compare(before: &[FileRecord], after: &[FileRecord]) -> Vec<DiffChange> {
    let old: BTreeMap<&str, &str> = before
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();
    let new: BTreeMap<&str, &str> = after
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();

    let mut changes: Vec<DiffChange> = new
        .iter()
        .filter_map(|(path, hash)| {
            let kind = match old.get(path) {
                None => ChangeKind::Added,
                Some(prev) if prev != hash => ChangeKind::Modified,
                Some(_) => return None,
            };
            Some(DiffChange {
                path: (*path).to_string(),
                kind,
            })
        })
        .chain(
            old.keys()
                .filter(|path| !new.contains_key(*path))
                .map(|path| DiffChange {
                    path: (*path).to_string(),
                    kind: ChangeKind::Deleted,
                }),
        )
        .collect();
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

/// Record every regular file below `root`. Links to directories are not
/// followed.
fn scan(root: &Path, cancel: &CancellationToken) -> Result<Vec<FileRecord>> {
    let mut paths = Vec::new();
    collect_files(root, &mut paths, cancel)?;
    let mut files = paths
        .par_iter()
        .map(|path| -> Result<FileRecord> {
            let relative = path.strip_prefix(root).unwrap_or(path);
            let size = std::fs::metadata(path)
                .with_context(|| format!("reading metadata of {}", path.display()))?
                .len();
            Ok(FileRecord {
                path: relative.to_string_lossy().replace('\\', "/"),
                size,
                hash: compute_sha256(path)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        bail!("cancelled");
    }
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("reading entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("reading file type of {}", path.display()))?;
        if file_type.is_dir() {
            collect_files(&path, out, cancel)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// Lowercase hex SHA-256 of the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn compute_sha256(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(64);
    for b in &digest {
        // write! to a String is infallible
        write!(hex, "{b:02x}").unwrap_or(());
    }
    Ok(hex)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn record(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            size: 0,
            hash: hash.to_string(),
        }
    }

    fn tracker(dir: &tempfile::TempDir) -> DiffTracker {
        DiffTracker::new(dir.path().join("state").join(STATE_FILE))
    }

    #[test]
    fn sha256_of_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(
            compute_sha256(&file).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn compare_classifies_and_sorts() {
        let before = [record("b", "1"), record("c", "2"), record("d", "3")];
        let after = [record("a", "9"), record("b", "1"), record("c", "5")];
        let changes: Vec<(String, ChangeKind)> = compare(&before, &after)
            .into_iter()
            .map(|c| (c.path, c.kind))
            .collect();
        assert_eq!(
            changes,
            vec![
                ("a".to_string(), ChangeKind::Added),
                ("c".to_string(), ChangeKind::Modified),
                ("d".to_string(), ChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn start_records_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("watched");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("top.txt"), "a").unwrap();
        std::fs::write(root.join("sub").join("inner.txt"), "bc").unwrap();

        let tracker = tracker(&dir);
        let state = tracker.start(&root, &CancellationToken::new()).unwrap();

        assert!(tracker.is_active());
        let files: Vec<(&str, u64)> = state
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.size))
            .collect();
        assert_eq!(files, vec![("sub/inner.txt", 2), ("top.txt", 1)]);
        assert_eq!(state.root, dunce::canonicalize(&root).unwrap());
    }

    #[test]
    fn start_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);
        let err = tracker
            .start(&dir.path().join("absent"), &CancellationToken::new())
            .unwrap_err();
        assert!(err.to_string().starts_with("Directory not found: "));
        assert!(!tracker.is_active());
    }

    #[test]
    fn stop_reports_changes_and_clears_state() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("watched");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("kept.txt"), "same").unwrap();
        std::fs::write(root.join("edited.txt"), "old").unwrap();
        std::fs::write(root.join("removed.txt"), "gone").unwrap();
        let tracker = tracker(&dir);
        tracker.start(&root, &CancellationToken::new()).unwrap();

        std::fs::write(root.join("edited.txt"), "new").unwrap();
        std::fs::remove_file(root.join("removed.txt")).unwrap();
        std::fs::write(root.join("added.txt"), "fresh").unwrap();
        let report = tracker.stop(&CancellationToken::new()).unwrap().unwrap();

        let changes: Vec<String> = report
            .changes
            .iter()
            .map(|c| format!("{} {}", c.kind, c.path))
            .collect();
        assert_eq!(
            changes,
            vec![
                "Added added.txt",
                "Modified edited.txt",
                "Deleted removed.txt",
            ]
        );
        assert!(!tracker.is_active());
    }

    #[test]
    fn stop_without_start_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            tracker(&dir)
                .stop(&CancellationToken::new())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn vanished_root_deletes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("watched");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a"), "1").unwrap();
        let tracker = tracker(&dir);
        tracker.start(&root, &CancellationToken::new()).unwrap();

        std::fs::remove_dir_all(&root).unwrap();
        let report = tracker.stop(&CancellationToken::new()).unwrap().unwrap();

        assert_eq!(
            report.changes,
            vec![DiffChange {
                path: "a".to_string(),
                kind: ChangeKind::Deleted,
            }]
        );
    }

    #[test]
    fn cancelled_scan_keeps_no_state() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tracker = tracker(&dir);
        assert!(tracker.start(dir.path(), &cancel).is_err());
        assert!(!tracker.is_active());
    }
}
