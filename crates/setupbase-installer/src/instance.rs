use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
#[cfg(not(target_os = "linux"))]
use std::process::Command;

use anyhow::{anyhow, Context, Result};

pub const LOCKFILE_NAME: &str = "setupbase-instance.lock";

/// The two advisory signals. They are independent: a stale lockfile can outlive
/// its process, and a sibling process can run without holding the lockfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceSignal {
    Lockfile,
    ProcessList,
}

pub trait InstanceProbe {
    /// Keeps the lockfile owned by this process until dropped.
    type Claim;

    fn is_running(&self, signal: InstanceSignal) -> bool;

    /// Records this process in the lockfile, taking over whatever it held.
    fn claim(&self) -> Result<Self::Claim>;

    /// Creates the lockfile only if no other process has. `None` means
    /// another process got there first.
    fn try_claim(&self) -> Result<Option<Self::Claim>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

pub trait ProcessLister {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessLister;

impl ProcessLister for SystemProcessLister {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>> {
        list_system_processes()
    }
}

#[derive(Debug, Clone)]
pub struct InstanceLock<L = SystemProcessLister> {
    lockfile: PathBuf,
    executable_name: String,
    own_pid: u32,
    lister: L,
}

impl InstanceLock<SystemProcessLister> {
    pub fn for_current_process(lockfile: impl Into<PathBuf>) -> Result<Self> {
        let current_exe =
            std::env::current_exe().context("failed to resolve current executable")?;
        let executable_name = current_exe
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("current executable has no file name"))?;
        Ok(Self::with_lister(
            lockfile,
            executable_name,
            std::process::id(),
            SystemProcessLister,
        ))
    }
}

impl<L: ProcessLister> InstanceLock<L> {
    pub fn with_lister(
        lockfile: impl Into<PathBuf>,
        executable_name: impl Into<String>,
        own_pid: u32,
        lister: L,
    ) -> Self {
        Self {
            lockfile: lockfile.into(),
            executable_name: executable_name.into(),
            own_pid,
            lister,
        }
    }

    pub fn lockfile_path(&self) -> &Path {
        &self.lockfile
    }

    fn lockfile_held_by_other(&self) -> bool {
        match read_lockfile_pid(&self.lockfile) {
            Ok(Some(pid)) => pid != self.own_pid,
            Ok(None) => self.lockfile.exists(),
            Err(err) => {
                tracing::debug!(
                    error = %format!("{err:#}"),
                    "lockfile unreadable; treating as held"
                );
                true
            }
        }
    }

    fn sibling_process_listed(&self) -> bool {
        match self.lister.list_processes() {
            Ok(processes) => processes.iter().any(|process| {
                process.pid != self.own_pid
                    && process_name_matches(&process.name, &self.executable_name)
            }),
            Err(err) => {
                tracing::debug!(error = %format!("{err:#}"), "process listing failed");
                false
            }
        }
    }

    fn create_parent(&self) -> Result<()> {
        if let Some(parent) = self.lockfile.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        Ok(())
    }

    fn write_own_pid(&self, mut file: fs::File) -> Result<LockfileGuard> {
        file.write_all(format!("{}\n", self.own_pid).as_bytes())
            .with_context(|| format!("failed to write lockfile: {}", self.lockfile.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush lockfile: {}", self.lockfile.display()))?;
        Ok(self.guard())
    }

    fn guard(&self) -> LockfileGuard {
        LockfileGuard {
            path: self.lockfile.clone(),
            pid: self.own_pid,
        }
    }
}

impl<L: ProcessLister> InstanceProbe for InstanceLock<L> {
    type Claim = LockfileGuard;

    fn is_running(&self, signal: InstanceSignal) -> bool {
        match signal {
            InstanceSignal::Lockfile => self.lockfile_held_by_other(),
            InstanceSignal::ProcessList => self.sibling_process_listed(),
        }
    }

    fn claim(&self) -> Result<LockfileGuard> {
        self.create_parent()?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.lockfile)
            .with_context(|| format!("failed to claim lockfile: {}", self.lockfile.display()))?;
        self.write_own_pid(file)
    }

    fn try_claim(&self) -> Result<Option<LockfileGuard>> {
        self.create_parent()?;
        let opened = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lockfile);
        match opened {
            Ok(file) => self.write_own_pid(file).map(Some),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let ours = matches!(
                    read_lockfile_pid(&self.lockfile),
                    Ok(Some(pid)) if pid == self.own_pid
                );
                Ok(ours.then(|| self.guard()))
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to claim lockfile: {}", self.lockfile.display())),
        }
    }
}

/// Removes the lockfile on drop, unless another process has taken it over.
#[derive(Debug)]
pub struct LockfileGuard {
    path: PathBuf,
    pid: u32,
}

impl LockfileGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockfileGuard {
    fn drop(&mut self) {
        if matches!(read_lockfile_pid(&self.path), Ok(Some(pid)) if pid == self.pid) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn read_lockfile_pid(path: &Path) -> Result<Option<u32>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read lockfile: {}", path.display()));
        }
    };
    Ok(raw.trim().parse::<u32>().ok())
}

// Linux truncates `comm` to 15 bytes.
const COMM_LEN: usize = 15;

pub(crate) fn process_name_matches(listed: &str, executable_name: &str) -> bool {
    let listed = listed.trim_end_matches(" (deleted)");
    if listed.eq_ignore_ascii_case(executable_name) {
        return true;
    }
    listed.len() == COMM_LEN && executable_name.starts_with(listed)
}

#[cfg(target_os = "linux")]
fn list_system_processes() -> Result<Vec<ProcessEntry>> {
    let proc_dir = fs::read_dir("/proc").context("failed to read /proc")?;

    let mut processes = Vec::new();
    for entry in proc_dir {
        let Ok(entry) = entry else {
            continue;
        };
        let file_name = entry.file_name();
        let Ok(pid) = file_name.to_string_lossy().parse::<u32>() else {
            continue;
        };

        let proc_path = entry.path();
        let name = match fs::read_link(proc_path.join("exe")) {
            Ok(exe) => exe
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            Err(_) => fs::read_to_string(proc_path.join("comm"))
                .ok()
                .map(|comm| comm.trim().to_string()),
        };
        if let Some(name) = name {
            processes.push(ProcessEntry { pid, name });
        }
    }
    Ok(processes)
}

#[cfg(windows)]
fn list_system_processes() -> Result<Vec<ProcessEntry>> {
    let output = Command::new("tasklist")
        .args(["/FO", "CSV", "/NH"])
        .output()
        .context("failed to run tasklist")?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut processes = Vec::new();
    for line in stdout.lines() {
        let mut fields = line.split("\",\"").map(|field| field.trim_matches('"'));
        let (Some(name), Some(pid)) = (fields.next(), fields.next()) else {
            continue;
        };
        if let Ok(pid) = pid.parse::<u32>() {
            processes.push(ProcessEntry {
                pid,
                name: name.to_string(),
            });
        }
    }
    Ok(processes)
}

#[cfg(all(not(target_os = "linux"), not(windows)))]
fn list_system_processes() -> Result<Vec<ProcessEntry>> {
    let output = Command::new("ps")
        .args(["-A", "-o", "pid=,comm="])
        .output()
        .context("failed to run ps")?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut processes = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        let Some((pid, command)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let Ok(pid) = pid.parse::<u32>() else {
            continue;
        };
        let name = Path::new(command.trim())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| command.trim().to_string());
        processes.push(ProcessEntry { pid, name });
    }
    Ok(processes)
}
