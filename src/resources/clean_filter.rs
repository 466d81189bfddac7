//! Git clean filter registration for files in the config repository.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::config::module::CleanFilter;

/// A clean filter registered in the config repo's local git config plus the
/// `.gitattributes` lines that route module files through it.
#[derive(Debug, Clone)]
pub struct CleanFilterResource {
    /// Config repository root.
    pub repo_root: PathBuf,
    /// Module key (directory name).
    pub module: String,
    /// Declared filter.
    pub filter: CleanFilter,
}

impl CleanFilterResource {
    /// Create a new clean filter resource.
    #[must_use]
    pub fn new(repo_root: &Path, module: &str, filter: CleanFilter) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            module: module.to_string(),
            filter,
        }
    }

    /// `filter.<name>.clean`.
    #[must_use]
    pub fn config_key(&self) -> String {
        format!("filter.{}.clean", self.filter.name)
    }

    /// Absolute script path.
    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.repo_root.join(&self.module).join(&self.filter.script)
    }

    /// Filter command: the script path relative to the repo, `/`-separated.
    #[must_use]
    pub fn command(&self) -> String {
        format!("{}/{}", self.module, self.filter.script.replace('\\', "/"))
    }

    /// `.gitattributes` lines this filter needs.
    #[must_use]
    pub fn attribute_lines(&self) -> Vec<String> {
        self.filter
            .files
            .iter()
            .map(|file| {
                format!(
                    "{}/{} filter={}",
                    self.module,
                    file.replace('\\', "/"),
                    self.filter.name
                )
            })
            .collect()
    }

    fn attributes_path(&self) -> PathBuf {
        self.repo_root.join(".gitattributes")
    }

    fn missing_attribute_lines(&self) -> Result<Vec<String>> {
        let path = self.attributes_path();
        let existing = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Ok(self
            .attribute_lines()
            .into_iter()
            .filter(|line| !existing.lines().any(|l| l.trim() == line))
            .collect())
    }

    fn local_config(&self) -> Result<git2::Config> {
        let repo = git2::Repository::open(&self.repo_root)
            .with_context(|| format!("opening git repository {}", self.repo_root.display()))?;
        repo.config()
            .and_then(|c| c.open_level(git2::ConfigLevel::Local))
            .context("opening local git config")
    }

    fn configured_command(&self) -> Result<Option<String>> {
        let config = self.local_config()?;
        local_value(&config, &self.config_key())
    }

    fn write_config(&self) -> Result<()> {
        let mut config = self.local_config()?;
        config
            .set_str(&self.config_key(), &self.command())
            .with_context(|| format!("setting {}", self.config_key()))
    }

    fn append_attributes(&self, lines: &[String]) -> Result<()> {
        use std::io::Write as _;
        if lines.is_empty() {
            return Ok(());
        }
        let path = self.attributes_path();
        let needs_newline = std::fs::read(&path)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        if needs_newline {
            writeln!(file).with_context(|| format!("writing {}", path.display()))?;
        }
        for line in lines {
            writeln!(file, "{line}").with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(())
    }
}

/// `key` from the repository-local level of `config` only. Global and
/// system values do not count as registered.
fn local_value(config: &git2::Config, key: &str) -> Result<Option<String>> {
    let local = config
        .open_level(git2::ConfigLevel::Local)
        .context("opening local git config")?;
    match local.get_string(key) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e).context("reading git config"),
    }
}

impl Applicable for CleanFilterResource {
    fn description(&self) -> String {
        format!("{} = {}", self.config_key(), self.command())
    }

    fn apply(&self) -> Result<ResourceChange> {
        if !self.script_path().is_file() {
            return Ok(ResourceChange::Failed {
                message: format!(
                    "Clean filter script not found: {}",
                    self.script_path().display()
                ),
            });
        }
        if !self.needs_change()? {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        if self.configured_command()?.as_deref() != Some(self.command().as_str()) {
            self.write_config()?;
        }
        self.append_attributes(&self.missing_attribute_lines()?)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for CleanFilterResource {
    fn current_state(&self) -> Result<ResourceState> {
        let configured = self.configured_command()?;
        let missing = self.missing_attribute_lines()?;
        Ok(match configured {
            None => ResourceState::Missing,
            Some(current) if current != self.command() => ResourceState::Incorrect { current },
            Some(_) if !missing.is_empty() => ResourceState::Incorrect {
                current: format!("{} .gitattributes line(s) missing", missing.len()),
            },
            Some(_) => ResourceState::Correct,
        })
    }
}
