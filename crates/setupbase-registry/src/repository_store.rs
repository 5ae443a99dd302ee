use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// User repositories persisted across runs in a single TOML file.
///
/// Temporary (session-only) repositories never reach this store.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RepositoryStateFile {
    #[serde(default = "state_file_version")]
    version: u32,
    #[serde(default)]
    repositories: Vec<String>,
}

impl Default for RepositoryStateFile {
    fn default() -> Self {
        Self {
            version: state_file_version(),
            repositories: Vec::new(),
        }
    }
}

fn state_file_version() -> u32 {
    1
}

impl RepositoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds the given repositories, skipping ones already stored. Returns the newly added ones.
    pub fn add_repositories(&self, repositories: &[String]) -> Result<Vec<String>> {
        let mut state = self.load_state()?;
        let mut added = Vec::new();
        for repository in repositories {
            if state.repositories.iter().any(|existing| existing == repository)
                || added.contains(repository)
            {
                continue;
            }
            added.push(repository.clone());
        }
        if added.is_empty() {
            return Ok(added);
        }

        state.repositories.extend(added.iter().cloned());
        self.save_state(&state)?;
        Ok(added)
    }

    pub fn list_repositories(&self) -> Result<Vec<String>> {
        Ok(self.load_state()?.repositories)
    }

    fn load_state(&self) -> Result<RepositoryStateFile> {
        if !self.path.exists() {
            return Ok(RepositoryStateFile::default());
        }

        let content = fs::read_to_string(&self.path).with_context(|| {
            format!("failed reading repository state: {}", self.path.display())
        })?;
        let state: RepositoryStateFile = toml::from_str(&content).with_context(|| {
            format!("failed parsing repository state: {}", self.path.display())
        })?;
        let expected = state_file_version();
        if state.version != expected {
            anyhow::bail!(
                "unsupported repository state version {} (expected {expected}): {}",
                state.version,
                self.path.display()
            );
        }
        Ok(state)
    }

    fn save_state(&self, state: &RepositoryStateFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating repository state root: {}", parent.display())
            })?;
        }

        let content = toml::to_string(state).with_context(|| {
            format!("failed serializing repository state: {}", self.path.display())
        })?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed writing repository state: {}", self.path.display()))
    }
}
