use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::bootstrap::copy_permissions;

pub const UPDATE_BASE_FLAG: &str = "--update-installerbase";

/// A request to swap the running maintenance tool for a newer installer base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseReplacement {
    pub new_binary: PathBuf,
    /// Arguments for the relaunched tool: the original ones minus the replacement request.
    pub relaunch_args: Vec<String>,
}

impl BaseReplacement {
    pub fn from_args(args: &[String]) -> Result<Self> {
        let flag_at = args
            .iter()
            .position(|arg| arg == UPDATE_BASE_FLAG)
            .ok_or_else(|| anyhow!("no {UPDATE_BASE_FLAG} argument given"))?;
        let new_binary = args
            .get(flag_at + 1)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("missing installer base path after {UPDATE_BASE_FLAG}"))?;

        let relaunch_args = args
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != flag_at && *index != flag_at + 1)
            .map(|(_, arg)| arg.clone())
            .collect();

        Ok(Self {
            new_binary: PathBuf::from(new_binary),
            relaunch_args,
        })
    }
}

/// Replaces `target` with `new_binary`, keeping the previous image as `<target>.old`
/// until the copy has landed. On failure the original binary is put back.
pub fn replace_maintenance_tool_binary(target: &Path, new_binary: &Path) -> Result<()> {
    if !new_binary.is_file() {
        bail!("installer base does not exist: {}", new_binary.display());
    }
    if !target.is_file() {
        bail!("maintenance tool does not exist: {}", target.display());
    }

    let backup = old_binary_path(target);
    if backup.exists() {
        fs::remove_file(&backup)
            .with_context(|| format!("failed to remove stale backup {}", backup.display()))?;
    }
    fs::rename(target, &backup).with_context(|| {
        format!(
            "failed to move {} out of the way to {}",
            target.display(),
            backup.display()
        )
    })?;

    let copied = fs::copy(new_binary, target)
        .with_context(|| {
            format!(
                "failed to copy {} to {}",
                new_binary.display(),
                target.display()
            )
        })
        .and_then(|_| copy_permissions(&backup, target));

    if let Err(err) = copied {
        let _ = fs::remove_file(target);
        if let Err(restore_err) = fs::rename(&backup, target) {
            return Err(err.context(format!(
                "failed to restore {} from {}: {restore_err}",
                target.display(),
                backup.display()
            )));
        }
        return Err(err);
    }

    tracing::debug!(
        target = %target.display(),
        source = %new_binary.display(),
        "maintenance tool replaced"
    );
    Ok(())
}

fn old_binary_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".old");
    target.with_file_name(name)
}
