use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::LOCKFILE_NAME;

/// Well-known locations shared by every invocation of the installer binary.
///
/// The lockfile and backups live in the temp dir. The state root is only
/// resolved when a flow asks for it, so modes that never touch persisted
/// state run without `HOME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerLayout {
    state_root: Option<PathBuf>,
    temp_dir: PathBuf,
}

impl InstallerLayout {
    pub fn new(state_root: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_root: Some(state_root.into()),
            temp_dir: temp_dir.into(),
        }
    }

    /// State root left to [`default_state_root`] on first use.
    pub fn in_temp_dir(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_root: None,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn detect() -> Self {
        Self::in_temp_dir(std::env::temp_dir())
    }

    pub fn state_root(&self) -> Result<PathBuf> {
        match &self.state_root {
            Some(root) => Ok(root.clone()),
            None => default_state_root(),
        }
    }

    pub fn repositories_file(&self) -> Result<PathBuf> {
        Ok(self.state_root()?.join("repositories.toml"))
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.temp_dir.join(LOCKFILE_NAME)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.temp_dir.join("setupbase-backups")
    }
}

pub fn default_state_root() -> Result<PathBuf> {
    if let Ok(explicit) = std::env::var("SETUPBASE_HOME") {
        if !explicit.trim().is_empty() {
            return Ok(PathBuf::from(explicit));
        }
    }

    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows state root")?;
        return Ok(PathBuf::from(app_data).join("Setupbase"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve state root")?;
    Ok(PathBuf::from(home).join(".setupbase"))
}
