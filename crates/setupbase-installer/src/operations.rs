use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use setupbase_core::{PerformedOperation, SetupError};

const RUN_FLAG: &str = "--runoperation";
const UNDO_FLAG: &str = "--undooperation";
const VALUE_FLAG: &str = "--value";
const UNDO_EXECUTE_MARKER: &str = "UNDOEXECUTE";

static BACKUP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Mkdir,
    Copy,
    Move,
    Delete,
    AppendFile,
    Execute,
}

impl OperationKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Mkdir" => Some(Self::Mkdir),
            "Copy" => Some(Self::Copy),
            "Move" => Some(Self::Move),
            "Delete" => Some(Self::Delete),
            "AppendFile" => Some(Self::AppendFile),
            "Execute" => Some(Self::Execute),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mkdir => "Mkdir",
            Self::Copy => "Copy",
            Self::Move => "Move",
            Self::Delete => "Delete",
            Self::AppendFile => "AppendFile",
            Self::Execute => "Execute",
        }
    }

    fn check_arguments(self, arguments: &[String]) -> Result<()> {
        let (min, max) = match self {
            Self::Mkdir | Self::Delete => (1, Some(1)),
            Self::Copy | Self::Move | Self::AppendFile => (2, Some(2)),
            Self::Execute => (1, None),
        };
        let count = arguments.len();
        if count < min || max.is_some_and(|max| count > max) {
            let expected = match max {
                Some(max) if max == min => format!("exactly {min}"),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            bail!(
                "invalid arguments in {}: {count} arguments given, {expected} expected",
                self.name()
            );
        }
        Ok(())
    }
}

fn operation_kind(operation: &PerformedOperation) -> Result<OperationKind> {
    let kind = OperationKind::from_name(&operation.name).ok_or_else(|| {
        SetupError::UnknownOperation {
            name: operation.name.clone(),
        }
    })?;
    kind.check_arguments(&operation.arguments)?;
    Ok(kind)
}

/// Performs `operation`, recording in its values whatever undo will need.
pub fn perform_operation(operation: &mut PerformedOperation, backups_dir: &Path) -> Result<()> {
    match operation_kind(operation)? {
        OperationKind::Mkdir => perform_mkdir(operation),
        OperationKind::Copy => perform_copy(operation, backups_dir, false),
        OperationKind::Move => perform_copy(operation, backups_dir, true),
        OperationKind::Delete => perform_delete(operation, backups_dir),
        OperationKind::AppendFile => perform_append(operation),
        OperationKind::Execute => {
            let (perform, _) = split_execute_arguments(&operation.arguments);
            run_program(perform)
        }
    }
}

pub fn undo_operation(operation: &PerformedOperation) -> Result<()> {
    match operation_kind(operation)? {
        OperationKind::Mkdir => undo_mkdir(operation),
        OperationKind::Copy => undo_copy(operation, false),
        OperationKind::Move => undo_copy(operation, true),
        OperationKind::Delete => undo_delete(operation),
        OperationKind::AppendFile => undo_append(operation),
        OperationKind::Execute => {
            let (_, undo) = split_execute_arguments(&operation.arguments);
            if undo.is_empty() {
                return Ok(());
            }
            run_program(undo)
        }
    }
}

fn perform_mkdir(operation: &mut PerformedOperation) -> Result<()> {
    let path = PathBuf::from(&operation.arguments[0]);
    let top_created = path
        .ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
        .last()
        .map(Path::to_path_buf);

    fs::create_dir_all(&path).with_context(|| format!("failed to create {}", path.display()))?;
    operation.values.insert(
        "createddir".to_string(),
        top_created
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
    );
    Ok(())
}

fn undo_mkdir(operation: &PerformedOperation) -> Result<()> {
    let top = match operation.values.get("createddir") {
        Some(top) if !top.is_empty() => PathBuf::from(top),
        _ => return Ok(()),
    };

    let path = PathBuf::from(&operation.arguments[0]);
    for dir in path.ancestors() {
        if dir.exists() {
            fs::remove_dir(dir)
                .with_context(|| format!("failed to remove directory {}", dir.display()))?;
        }
        if dir == top.as_path() {
            break;
        }
    }
    Ok(())
}

fn copy_destination(source: &Path, destination: &str) -> PathBuf {
    let destination = PathBuf::from(destination);
    if destination.is_dir() {
        if let Some(name) = source.file_name() {
            return destination.join(name);
        }
    }
    destination
}

fn perform_copy(
    operation: &mut PerformedOperation,
    backups_dir: &Path,
    remove_source: bool,
) -> Result<()> {
    let source = PathBuf::from(&operation.arguments[0]);
    if !source.is_file() {
        bail!("source file does not exist: {}", source.display());
    }
    let destination = copy_destination(&source, &operation.arguments[1]);

    if destination.exists() {
        let backup = backup_file(&destination, backups_dir)?;
        operation
            .values
            .insert("backup".to_string(), backup.display().to_string());
    }

    if remove_source {
        move_file(&source, &destination)?;
    } else {
        fs::copy(&source, &destination).with_context(|| {
            format!(
                "failed to copy {} to {}",
                source.display(),
                destination.display()
            )
        })?;
    }
    operation
        .values
        .insert("destination".to_string(), destination.display().to_string());
    Ok(())
}

fn undo_copy(operation: &PerformedOperation, restore_source: bool) -> Result<()> {
    let Some(destination) = operation.values.get("destination").map(PathBuf::from) else {
        return Ok(());
    };

    if restore_source {
        let source = PathBuf::from(&operation.arguments[0]);
        move_file(&destination, &source)?;
    } else if destination.exists() {
        fs::remove_file(&destination)
            .with_context(|| format!("failed to remove {}", destination.display()))?;
    }

    if let Some(backup) = operation.values.get("backup").map(PathBuf::from) {
        restore_backup(&backup, &destination)?;
    }
    Ok(())
}

fn perform_delete(operation: &mut PerformedOperation, backups_dir: &Path) -> Result<()> {
    let path = PathBuf::from(&operation.arguments[0]);
    if !path.exists() {
        return Ok(());
    }
    if !path.is_file() {
        bail!("Delete only removes files: {}", path.display());
    }

    let backup = backup_file(&path, backups_dir)?;
    operation
        .values
        .insert("backup".to_string(), backup.display().to_string());
    fs::remove_file(&path).with_context(|| format!("failed to delete {}", path.display()))
}

fn undo_delete(operation: &PerformedOperation) -> Result<()> {
    let Some(backup) = operation.values.get("backup").map(PathBuf::from) else {
        return Ok(());
    };
    restore_backup(&backup, Path::new(&operation.arguments[0]))
}

fn perform_append(operation: &mut PerformedOperation) -> Result<()> {
    let path = PathBuf::from(&operation.arguments[0]);
    match fs::metadata(&path) {
        Ok(metadata) => {
            operation
                .values
                .insert("previous_len".to_string(), metadata.len().to_string());
        }
        Err(_) => {
            operation
                .values
                .insert("created".to_string(), "true".to_string());
        }
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(operation.arguments[1].as_bytes())
        .with_context(|| format!("failed to append to {}", path.display()))
}

fn undo_append(operation: &PerformedOperation) -> Result<()> {
    let path = PathBuf::from(&operation.arguments[0]);
    if operation.values.get("created").map(String::as_str) == Some("true") {
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        return Ok(());
    }

    let Some(previous_len) = operation.values.get("previous_len") else {
        return Ok(());
    };
    let previous_len: u64 = previous_len
        .parse()
        .context("previous_len must be u64")?;
    let file = fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.set_len(previous_len)
        .with_context(|| format!("failed to truncate {}", path.display()))
}

fn split_execute_arguments(arguments: &[String]) -> (&[String], &[String]) {
    match arguments
        .iter()
        .position(|argument| argument == UNDO_EXECUTE_MARKER)
    {
        Some(index) => (&arguments[..index], &arguments[index + 1..]),
        None => (arguments, &[]),
    }
}

fn run_program(command_line: &[String]) -> Result<()> {
    let Some((program, args)) = command_line.split_first() else {
        bail!("Execute requires a program");
    };
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("failed to launch {program}"))?;
    if !status.success() {
        bail!("{program} exited with status {status}");
    }
    Ok(())
}

fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    fs::copy(source, destination).with_context(|| {
        format!(
            "failed to move {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    fs::remove_file(source).with_context(|| format!("failed to remove {}", source.display()))
}

fn backup_file(path: &Path, backups_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(backups_dir)
        .with_context(|| format!("failed to create {}", backups_dir.display()))?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let seq = BACKUP_SEQ.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let backup = backups_dir.join(format!(
        "{}-{nanos}-{seq}-{file_name}",
        std::process::id()
    ));

    fs::copy(path, &backup).with_context(|| {
        format!(
            "failed to back up {} to {}",
            path.display(),
            backup.display()
        )
    })?;
    Ok(backup)
}

fn restore_backup(backup: &Path, destination: &Path) -> Result<()> {
    fs::copy(backup, destination).with_context(|| {
        format!(
            "failed to restore {} from {}",
            destination.display(),
            backup.display()
        )
    })?;
    let _ = fs::remove_file(backup);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationDirection {
    Run,
    Undo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub direction: OperationDirection,
    pub operation: PerformedOperation,
}

impl OperationRequest {
    /// Parses `[..] --runoperation|--undooperation <Name> [args..] [--value key=value]..`.
    pub fn parse(args: &[String]) -> Result<Self> {
        let run_at = args.iter().position(|arg| arg == RUN_FLAG);
        let undo_at = args.iter().position(|arg| arg == UNDO_FLAG);
        let (direction, flag_at) = match (run_at, undo_at) {
            (Some(_), Some(_)) => return Err(SetupError::ConflictingOperationFlags.into()),
            (Some(index), None) => (OperationDirection::Run, index),
            (None, Some(index)) => (OperationDirection::Undo, index),
            (None, None) => bail!("no {RUN_FLAG} or {UNDO_FLAG} argument given"),
        };

        let mut rest = args[flag_at + 1..].iter();
        let name = rest
            .next()
            .ok_or_else(|| anyhow!("missing operation name after {}", args[flag_at]))?;

        let mut operation = PerformedOperation::new(name.clone(), Vec::new());
        while let Some(arg) = rest.next() {
            match arg.as_str() {
                "--verbose" | "-v" => {}
                VALUE_FLAG => {
                    let pair = rest
                        .next()
                        .ok_or_else(|| anyhow!("missing key=value after {VALUE_FLAG}"))?;
                    let (key, value) = pair
                        .split_once('=')
                        .ok_or_else(|| anyhow!("expected key=value after {VALUE_FLAG}: {pair}"))?;
                    operation.values.insert(key.to_string(), value.to_string());
                }
                _ => operation.arguments.push(arg.clone()),
            }
        }

        Ok(Self {
            direction,
            operation,
        })
    }
}

/// Executes a single operation on behalf of another installer process.
#[derive(Debug, Clone)]
pub struct OperationRunner {
    verbose: bool,
    backups_dir: PathBuf,
}

impl OperationRunner {
    pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            verbose: false,
            backups_dir: backups_dir.into(),
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Returns the process exit code: 0 on success, 1 otherwise. Values captured by a
    /// performed operation are written to `out` as `key=value` lines.
    pub fn run(&self, args: &[String], out: &mut impl Write) -> i32 {
        match self.run_inner(args, out) {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("{err:#}");
                1
            }
        }
    }

    fn run_inner(&self, args: &[String], out: &mut impl Write) -> Result<()> {
        let mut request = OperationRequest::parse(args)?;
        if self.verbose {
            tracing::debug!(
                operation = %request.operation.name,
                arguments = ?request.operation.arguments,
                direction = ?request.direction,
                "executing operation"
            );
        }

        match request.direction {
            OperationDirection::Run => {
                perform_operation(&mut request.operation, &self.backups_dir)?;
                for (key, value) in &request.operation.values {
                    writeln!(out, "{key}={value}").context("failed to write operation values")?;
                }
            }
            OperationDirection::Undo => undo_operation(&request.operation)?,
        }
        Ok(())
    }
}
