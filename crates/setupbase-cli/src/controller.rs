use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use setupbase_core::{
    MagicMarker, MaintenanceMode, PackageManagerCore, PayloadBody, PayloadContent,
    PayloadSettings, PerformedOperation, RuntimeOptions, Status,
};
use setupbase_installer::{
    maintenance_tool_file_name, perform_operation, undo_operation, write_maintenance_tool,
};
use setupbase_registry::UpdateChecker;

use crate::render::{
    print_error, print_status, render_component_line, OperationProgress, OutputStyle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiFlavor {
    Installer,
    Maintenance,
}

impl GuiFlavor {
    pub fn for_core(core: &PackageManagerCore) -> Self {
        if core.is_installer() {
            Self::Installer
        } else {
            Self::Maintenance
        }
    }
}

/// The interactive front end driving a Normal-mode run.
pub trait Controller {
    fn set_manager_params(&mut self, params: BTreeMap<String, String>);
    fn set_control_script(&mut self, script: Option<PathBuf>);
    fn set_gui(&mut self, flavor: GuiFlavor);
    /// Anything but `Success` aborts startup with that status.
    fn init(&mut self, core: &mut PackageManagerCore) -> Status;
    /// Runs the event loop; the returned value is the loop's own result code.
    fn exec(&mut self, core: &mut PackageManagerCore) -> Result<i32>;
}

#[derive(Debug, Clone)]
pub struct ConsoleContext {
    pub source_exe: PathBuf,
    pub backups_dir: PathBuf,
    pub runtime: RuntimeOptions,
    pub style: OutputStyle,
}

/// Headless controller: runs installation and maintenance flows on the console.
#[derive(Debug)]
pub struct ConsoleController {
    context: ConsoleContext,
    params: BTreeMap<String, String>,
    control_script: Option<PathBuf>,
    flavor: GuiFlavor,
}

impl ConsoleController {
    pub fn new(context: ConsoleContext) -> Self {
        Self {
            context,
            params: BTreeMap::new(),
            control_script: None,
            flavor: GuiFlavor::Installer,
        }
    }

    fn install(&self, core: &mut PackageManagerCore) {
        let style = self.context.style;
        let planned: Vec<PerformedOperation> = core
            .performed_operations()
            .iter()
            .map(|operation| substitute_variables(core, operation))
            .collect();

        print_status(style, "step", &format!("installing {}", product_label(core)));
        let progress = OperationProgress::start(style, "install", planned.len() as u64);
        let mut performed = Vec::with_capacity(planned.len());
        for mut operation in planned {
            if let Err(err) = perform_operation(&mut operation, &self.context.backups_dir) {
                progress.finish();
                print_error(
                    style,
                    &format!("operation {} failed: {err:#}", operation.name),
                );
                self.roll_back(&performed);
                core.set_status(Status::Failure);
                return;
            }
            performed.push(operation);
            progress.advance();
        }
        progress.finish();

        let target_dir = core
            .value("TargetDir")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        if let Some(target_dir) = target_dir {
            let tool = maintenance_tool_path(&target_dir);
            let payload = maintenance_payload(core, &performed);
            if let Err(err) = write_maintenance_tool(&self.context.source_exe, &tool, &payload) {
                print_error(style, &format!("{err:#}"));
                self.roll_back(&performed);
                core.set_status(Status::Failure);
                return;
            }
            core.set_maintenance_tool_written();
            print_status(
                style,
                "ok",
                &format!("maintenance tool written to {}", tool.display()),
            );
        }

        print_status(style, "ok", &format!("installed {}", product_label(core)));
        core.set_status(Status::Success);
    }

    fn roll_back(&self, performed: &[PerformedOperation]) {
        for operation in performed.iter().rev() {
            if let Err(err) = undo_operation(operation) {
                tracing::warn!(
                    operation = %operation.name,
                    error = %format!("{err:#}"),
                    "rollback step failed"
                );
            }
        }
    }

    fn uninstall(&self, core: &mut PackageManagerCore) {
        let style = self.context.style;
        let operations = core.performed_operations().to_vec();
        print_status(style, "step", &format!("uninstalling {}", product_label(core)));

        let progress = OperationProgress::start(style, "uninstall", operations.len() as u64);
        let mut failures = 0_usize;
        for operation in operations.iter().rev() {
            if let Err(err) = undo_operation(operation) {
                failures += 1;
                print_error(
                    style,
                    &format!("undo of {} failed: {err:#}", operation.name),
                );
            }
            progress.advance();
        }
        progress.finish();

        if failures == 0 {
            print_status(style, "ok", &format!("uninstalled {}", product_label(core)));
            core.set_status(Status::Success);
        } else {
            core.set_status(Status::Failure);
        }
    }

    fn check_updates(&self, core: &mut PackageManagerCore) {
        let checker = UpdateChecker::new(core.proxy().clone());
        match checker.check(&core.effective_repositories(), core.components()) {
            Ok(updates) if updates.is_empty() => {
                print_status(self.context.style, "ok", "no updates available");
                core.set_status(Status::Success);
            }
            Ok(updates) => {
                for update in updates {
                    println!("{update}");
                }
                core.set_status(Status::Success);
            }
            Err(err) => {
                print_error(self.context.style, &format!("{err:#}"));
                core.set_status(Status::Failure);
            }
        }
    }

    fn list_packages(&self, core: &mut PackageManagerCore) {
        let runtime = &self.context.runtime;
        for component in core.components() {
            if component.is_virtual && !runtime.virtual_components_visible {
                continue;
            }
            println!(
                "{}",
                render_component_line(
                    self.context.style,
                    component,
                    runtime.virtual_component_style
                )
            );
        }
        for repository in core.effective_repositories() {
            println!("repository: {repository}");
        }
        core.set_status(Status::Success);
    }
}

impl Controller for ConsoleController {
    fn set_manager_params(&mut self, params: BTreeMap<String, String>) {
        self.params = params;
    }

    fn set_control_script(&mut self, script: Option<PathBuf>) {
        self.control_script = script;
    }

    fn set_gui(&mut self, flavor: GuiFlavor) {
        self.flavor = flavor;
    }

    fn init(&mut self, _core: &mut PackageManagerCore) -> Status {
        if let Some(script) = &self.control_script {
            if let Err(err) = fs::read_to_string(script) {
                print_error(
                    self.context.style,
                    &format!("failed to read control script {}: {err}", script.display()),
                );
                return Status::Failure;
            }
            tracing::debug!(script = %script.display(), "control script loaded");
        }
        if !self.params.is_empty() {
            tracing::debug!(params = ?self.params, "manager params");
        }
        Status::Success
    }

    fn exec(&mut self, core: &mut PackageManagerCore) -> Result<i32> {
        core.set_status(Status::Running);
        match self.flavor {
            GuiFlavor::Installer => self.install(core),
            GuiFlavor::Maintenance => match core.maintenance_mode() {
                MaintenanceMode::Uninstall => self.uninstall(core),
                MaintenanceMode::Updater => self.check_updates(core),
                MaintenanceMode::PackageManager => self.list_packages(core),
            },
        }
        Ok(0)
    }
}

fn substitute_variables(
    core: &PackageManagerCore,
    operation: &PerformedOperation,
) -> PerformedOperation {
    let mut substituted = operation.clone();
    for argument in &mut substituted.arguments {
        *argument = core.replace_variables(argument);
    }
    substituted
}

fn product_label(core: &PackageManagerCore) -> String {
    match (core.value("ProductName"), core.value("ProductVersion")) {
        (Some(name), Some(version)) if !version.is_empty() => format!("{name} {version}"),
        (Some(name), _) if !name.is_empty() => name.to_string(),
        _ => "product".to_string(),
    }
}

/// Payload for the maintenance tool: the operations as performed, so that
/// uninstall can undo them with their recorded values.
fn maintenance_payload(
    core: &PackageManagerCore,
    performed: &[PerformedOperation],
) -> PayloadContent {
    let settings = PayloadSettings {
        name: core.value("ProductName").unwrap_or_default().to_string(),
        version: core.value("ProductVersion").unwrap_or_default().to_string(),
        target_dir: core.value("TargetDir").map(str::to_string),
        repositories: core.default_repositories().to_vec(),
    };
    PayloadContent::new(
        MagicMarker::Uninstaller,
        PayloadBody {
            settings,
            operations: performed.to_vec(),
            components: core.components().to_vec(),
        },
    )
}

fn maintenance_tool_path(target_dir: &Path) -> PathBuf {
    target_dir.join(maintenance_tool_file_name())
}
