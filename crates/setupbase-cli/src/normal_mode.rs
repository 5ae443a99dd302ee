use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use setupbase_core::{
    ExitStatus, PackageManagerCore, ProxyMode, RuntimeOptions, SetupError, Status,
};
use setupbase_registry::{parse_repository_list, RepositoryStore};

use crate::controller::{Controller, GuiFlavor};
use crate::render::{print_error, OutputStyle};
use crate::usage::usage_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NormalFlag {
    Script,
    Verbose,
    Proxy,
    ShowVirtualComponents,
    Updater,
    ManagePackages,
    Help,
    AddTempRepository,
    SetTempRepository,
    AddRepository,
    NoForceInstallations,
}

/// Flags understood in Normal mode, legacy bare spellings included.
const NORMAL_FLAGS: &[(&str, NormalFlag)] = &[
    ("--script", NormalFlag::Script),
    ("Script", NormalFlag::Script),
    ("--verbose", NormalFlag::Verbose),
    ("-v", NormalFlag::Verbose),
    ("--proxy", NormalFlag::Proxy),
    ("--show-virtual-components", NormalFlag::ShowVirtualComponents),
    ("ShowVirtualComponents", NormalFlag::ShowVirtualComponents),
    ("--updater", NormalFlag::Updater),
    ("Updater", NormalFlag::Updater),
    ("--manage-packages", NormalFlag::ManagePackages),
    ("ManagePackages", NormalFlag::ManagePackages),
    ("--help", NormalFlag::Help),
    ("-h", NormalFlag::Help),
    ("--addTempRepository", NormalFlag::AddTempRepository),
    ("--setTempRepository", NormalFlag::SetTempRepository),
    ("--addRepository", NormalFlag::AddRepository),
    ("--no-force-installations", NormalFlag::NoForceInstallations),
];

fn lookup_flag(token: &str) -> Option<NormalFlag> {
    NORMAL_FLAGS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, flag)| *flag)
}

/// Inputs of Normal mode that come from outside the command line.
#[derive(Debug, Clone)]
pub struct NormalContext {
    pub store: RepositoryStore,
    pub http_proxy: Option<String>,
    pub style: OutputStyle,
}

/// Session state gathered from the command line for the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalSession {
    pub params: BTreeMap<String, String>,
    pub control_script: Option<PathBuf>,
    pub runtime: RuntimeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentOutcome {
    Continue(NormalSession),
    Exit(ExitStatus),
}

/// Applies the residual command line to `core`, in order.
///
/// Locally recoverable problems print one diagnostic and yield
/// `Exit(Failure)`; `--help` yields `Exit(Success)` after printing usage.
pub fn apply_arguments(
    tokens: &[String],
    core: &mut PackageManagerCore,
    context: &NormalContext,
) -> Result<ArgumentOutcome> {
    let mut session = NormalSession::default();
    let mut proxy_requested = false;

    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        if token.is_empty() {
            continue;
        }
        if let Some((key, value)) = token.split_once('=') {
            session.params.insert(key.to_string(), value.to_string());
            core.set_value(key, value);
            continue;
        }

        let flag = match lookup_flag(token) {
            Some(NormalFlag::Updater | NormalFlag::ManagePackages) if !core.is_uninstaller() => {
                None
            }
            flag => flag,
        };
        let Some(flag) = flag else {
            tracing::warn!("Unknown option: {token}");
            continue;
        };

        match flag {
            NormalFlag::Script => {
                let Some(path) = iter.next().filter(|path| !path.is_empty()) else {
                    let message = format!("no control script specified for {token}");
                    print_error(context.style, &message);
                    return Ok(ArgumentOutcome::Exit(ExitStatus::Failure));
                };
                let path = PathBuf::from(path);
                if !path.exists() {
                    let err = SetupError::MissingScript { path };
                    print_error(context.style, &err.to_string());
                    return Ok(ArgumentOutcome::Exit(ExitStatus::Failure));
                }
                session.control_script = Some(path);
            }
            NormalFlag::Verbose => {
                session.runtime.verbose = true;
                core.set_verbose(true);
            }
            NormalFlag::Proxy => proxy_requested = true,
            NormalFlag::ShowVirtualComponents => session.runtime.show_virtual_components(),
            NormalFlag::Updater => core.set_updater(),
            NormalFlag::ManagePackages => core.set_package_manager(),
            NormalFlag::Help => {
                println!("{}", usage_text());
                return Ok(ArgumentOutcome::Exit(ExitStatus::Success));
            }
            NormalFlag::AddTempRepository
            | NormalFlag::SetTempRepository
            | NormalFlag::AddRepository => {
                let repositories = iter
                    .next()
                    .map(|raw| parse_repository_list(raw))
                    .unwrap_or_default();
                if repositories.is_empty() {
                    let err = SetupError::EmptyRepositoryList {
                        flag: token.clone(),
                    };
                    print_error(context.style, &err.to_string());
                    return Ok(ArgumentOutcome::Exit(ExitStatus::Failure));
                }
                match flag {
                    NormalFlag::AddRepository => {
                        let added = context.store.add_repositories(&repositories)?;
                        tracing::debug!(?added, "user repositories persisted");
                        core.add_user_repositories(repositories);
                    }
                    NormalFlag::SetTempRepository => {
                        core.set_temporary_repositories(repositories, true)
                    }
                    _ => core.set_temporary_repositories(repositories, false),
                }
            }
            NormalFlag::NoForceInstallations => session.runtime.no_force_installations = true,
        }
    }

    session.runtime.proxy = ProxyMode::resolve(
        proxy_requested,
        context.http_proxy.as_deref(),
        ProxyMode::env_supported(),
    );
    core.set_proxy(session.runtime.proxy.clone());
    Ok(ArgumentOutcome::Continue(session))
}

/// Maps the end of a controller run to the process exit code.
pub fn translate_outcome(loop_result: i32, core: &PackageManagerCore) -> i32 {
    if loop_result != 0 {
        return loop_result;
    }
    if core.finished_with_success() {
        return Status::Success.code();
    }
    match core.status() {
        status @ (Status::Success | Status::Canceled) => status.code(),
        _ => Status::Failure.code(),
    }
}

/// Binds a freshly built controller to `core` and runs it to completion.
pub fn run_session<C: Controller>(
    core: &mut PackageManagerCore,
    session: NormalSession,
    controller: &mut C,
    style: OutputStyle,
) -> Result<i32> {
    controller.set_manager_params(session.params);
    controller.set_control_script(session.control_script);
    controller.set_gui(GuiFlavor::for_core(core));

    let status = controller.init(core);
    if status != Status::Success {
        let err = SetupError::ControllerInit {
            status: status.code(),
        };
        print_error(style, &err.to_string());
        return Ok(status.code());
    }

    let loop_result = controller.exec(core)?;
    Ok(translate_outcome(loop_result, core))
}

/// Configures `core` from `tokens`, then builds a controller and runs it.
pub fn run_normal_session<C, F>(
    core: &mut PackageManagerCore,
    tokens: &[String],
    context: &NormalContext,
    make_controller: F,
) -> Result<i32>
where
    C: Controller,
    F: FnOnce(&RuntimeOptions) -> Result<C>,
{
    let session = match apply_arguments(tokens, core, context)? {
        ArgumentOutcome::Continue(session) => session,
        ArgumentOutcome::Exit(status) => return Ok(status.code()),
    };

    let mut controller = make_controller(&session.runtime)?;
    run_session(core, session, &mut controller, context.style)
}
