use std::path::PathBuf;

use anyhow::Result;
use setupbase_core::{ExitStatus, PackageManagerCore, PayloadContent, ProxyMode};
use setupbase_installer::{
    bootstrap_payload, parse_server_port, replace_maintenance_tool_binary, BaseReplacement,
    FsServer, InstallerLayout, InstanceLock, InstanceProbe, OperationRunner, SelfRestarter,
};
use setupbase_registry::{RepositoryStore, UpdateChecker};

use crate::classify::{classify, ArgumentSet, InvocationMode, CHECK_UPDATES_FLAG};
use crate::controller::{ConsoleContext, ConsoleController};
use crate::coordinator::{admit_normal_instance, update_flow_blocked, Admission};
use crate::normal_mode::{run_normal_session, NormalContext};
use crate::render::{print_error, print_status, OutputStyle};
use crate::usage::version_lines;

#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub args: ArgumentSet,
    pub current_exe: PathBuf,
    pub layout: InstallerLayout,
    pub style: OutputStyle,
}

impl LaunchContext {
    fn instance_lock(&self) -> Result<InstanceLock> {
        InstanceLock::for_current_process(self.layout.lockfile_path())
    }

    fn repository_store(&self) -> Result<RepositoryStore> {
        Ok(RepositoryStore::new(self.layout.repositories_file()?))
    }
}

/// Runs the single mode selected for this invocation and returns the exit code.
pub fn run_mode(context: &LaunchContext, restarter: &mut SelfRestarter) -> Result<i32> {
    let classification = classify(&context.args);
    tracing::debug!(mode = ?classification.mode, "invocation classified");

    match classification.mode {
        InvocationMode::Version => {
            for line in version_lines() {
                println!("{line}");
            }
            Ok(ExitStatus::Success.code())
        }
        InvocationMode::StartServer => run_start_server(&classification.residual),
        InvocationMode::CheckUpdates => {
            let probe = context.instance_lock()?;
            run_check_updates(context, &probe, &classification.residual)
        }
        InvocationMode::RunOperation | InvocationMode::UndoOperation => {
            Ok(run_operation(context, &classification.residual))
        }
        InvocationMode::UpdateInstallerBase => {
            let probe = context.instance_lock()?;
            Ok(run_update_installer_base(
                context,
                &probe,
                &classification.residual,
                restarter,
            ))
        }
        InvocationMode::Normal => run_normal(context, &classification.residual),
    }
}

fn run_start_server(residual: &[String]) -> Result<i32> {
    let port = parse_server_port(residual.first().map(String::as_str).unwrap_or_default())?;
    let mut server = FsServer::bind(port)?;
    if let Some(key) = residual.get(1).filter(|key| !key.is_empty()) {
        server.set_authorization_key(key.as_str());
    }
    server.serve()?;
    Ok(ExitStatus::Success.code())
}

fn run_check_updates(
    context: &LaunchContext,
    probe: &impl InstanceProbe,
    residual: &[String],
) -> Result<i32> {
    if update_flow_blocked(probe) {
        tracing::debug!("another instance is running; skipping update check");
        return Ok(ExitStatus::Success.code());
    }

    let args = ArgumentSet::new(residual.to_vec());
    for unknown in args.unknown_flags(&[CHECK_UPDATES_FLAG, "--verbose", "-v", "--proxy"]) {
        tracing::warn!("Unknown option: {unknown}");
    }

    let payload = bootstrap_payload()?;
    let mut core = PackageManagerCore::from_payload(&payload);
    core.add_user_repositories(context.repository_store()?.list_repositories()?);
    let proxy = ProxyMode::resolve(
        args.has_flag("--proxy"),
        http_proxy_from_env().as_deref(),
        ProxyMode::env_supported(),
    );

    match UpdateChecker::new(proxy).check(&core.effective_repositories(), core.components()) {
        Ok(updates) => {
            for update in updates {
                println!("{update}");
            }
            Ok(ExitStatus::Success.code())
        }
        Err(err) => {
            print_error(context.style, &format!("{err:#}"));
            Ok(ExitStatus::Failure.code())
        }
    }
}

fn run_operation(context: &LaunchContext, residual: &[String]) -> i32 {
    let mut runner = OperationRunner::new(context.layout.backups_dir());
    runner.set_verbose(context.args.is_verbose());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    runner.run(residual, &mut out)
}

fn run_update_installer_base(
    context: &LaunchContext,
    probe: &impl InstanceProbe,
    residual: &[String],
    restarter: &mut SelfRestarter,
) -> i32 {
    if update_flow_blocked(probe) {
        tracing::debug!("another instance is running; skipping installer base update");
        return ExitStatus::Success.code();
    }

    let replaced = BaseReplacement::from_args(residual).and_then(|replacement| {
        replace_maintenance_tool_binary(&context.current_exe, &replacement.new_binary)?;
        Ok(replacement)
    });
    match replaced {
        Ok(replacement) => {
            print_status(context.style, "ok", "installer base updated");
            restarter.request_restart_with(replacement.relaunch_args);
            tracing::debug!(args = ?restarter.pending_args(), "relaunch requested");
            ExitStatus::Success.code()
        }
        Err(err) => {
            print_error(context.style, &format!("{err:#}"));
            ExitStatus::Failure.code()
        }
    }
}

fn run_normal(context: &LaunchContext, residual: &[String]) -> Result<i32> {
    let probe = context.instance_lock()?;
    let _lockfile = match admit_normal_instance(&probe, std::thread::sleep) {
        Admission::AlreadyOpen => {
            print_status(context.style, "warn", "the installer is already running");
            return Ok(ExitStatus::Success.code());
        }
        Admission::Proceed { polls, lockfile } => {
            tracing::debug!(polls, claimed = lockfile.is_some(), "instance admitted");
            lockfile
        }
    };

    let payload = bootstrap_payload()?;
    if context.args.is_verbose() {
        log_startup(context, &payload);
    }

    let mut core = PackageManagerCore::from_payload(&payload);
    let normal_context = NormalContext {
        store: context.repository_store()?,
        http_proxy: http_proxy_from_env(),
        style: context.style,
    };
    core.add_user_repositories(normal_context.store.list_repositories()?);

    run_normal_session(&mut core, residual, &normal_context, |runtime| {
        Ok(ConsoleController::new(ConsoleContext {
            source_exe: context.current_exe.clone(),
            backups_dir: context.layout.backups_dir(),
            runtime: runtime.clone(),
            style: context.style,
        }))
    })
}

fn log_startup(context: &LaunchContext, payload: &PayloadContent) {
    for line in version_lines() {
        tracing::debug!("{line}");
    }
    tracing::debug!(
        arguments = ?context.args.tokens(),
        values = ?context.args.values(),
        "command line"
    );
    tracing::debug!(
        marker = payload.magic_marker.as_str(),
        operations = payload.performed_operations().len(),
        components = ?payload
            .components()
            .iter()
            .map(|component| component.name.as_str())
            .collect::<Vec<_>>(),
        "payload"
    );
}

fn http_proxy_from_env() -> Option<String> {
    ["http_proxy", "HTTP_PROXY"]
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|value| !value.trim().is_empty())
}
