use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};

/// Relaunches the installer once the current run is over.
///
/// A relaunch is only ever recorded as pending; [`SelfRestarter::finish`] is the
/// single place that acts on it and consumes the restarter, so a process can
/// relaunch itself at most once.
#[derive(Debug)]
pub struct SelfRestarter {
    program: PathBuf,
    pending: Option<Vec<String>>,
}

impl SelfRestarter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            pending: None,
        }
    }

    /// A later request replaces an earlier one.
    pub fn request_restart_with(&mut self, args: Vec<String>) {
        self.pending = Some(args);
    }

    pub fn pending_args(&self) -> Option<&[String]> {
        self.pending.as_deref()
    }

    /// Spawns the pending relaunch without waiting for it. Returns whether a process was started.
    pub fn finish(self) -> Result<bool> {
        let Some(args) = self.pending else {
            return Ok(false);
        };

        Command::new(&self.program)
            .args(&args)
            .spawn()
            .with_context(|| format!("failed to relaunch {}", self.program.display()))?;
        tracing::debug!(program = %self.program.display(), ?args, "relaunch spawned");
        Ok(true)
    }
}
