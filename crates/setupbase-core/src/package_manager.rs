use std::collections::BTreeMap;

use crate::{
    InstalledComponent, MagicMarker, PayloadContent, PerformedOperation, ProxyMode, Status,
};

/// What a maintenance tool run is asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaintenanceMode {
    #[default]
    Uninstall,
    Updater,
    PackageManager,
}

/// Installer state bound to one payload.
#[derive(Debug, Clone)]
pub struct PackageManagerCore {
    magic_marker: MagicMarker,
    performed_operations: Vec<PerformedOperation>,
    components: Vec<InstalledComponent>,
    values: BTreeMap<String, String>,
    default_repositories: Vec<String>,
    temporary_repositories: Vec<String>,
    user_repositories: Vec<String>,
    maintenance_mode: MaintenanceMode,
    status: Status,
    maintenance_tool_written: bool,
    verbose: bool,
    proxy: ProxyMode,
}

impl PackageManagerCore {
    pub fn new(magic_marker: MagicMarker, performed_operations: Vec<PerformedOperation>) -> Self {
        Self {
            magic_marker,
            performed_operations,
            components: Vec::new(),
            values: BTreeMap::new(),
            default_repositories: Vec::new(),
            temporary_repositories: Vec::new(),
            user_repositories: Vec::new(),
            maintenance_mode: MaintenanceMode::Uninstall,
            status: Status::Unfinished,
            maintenance_tool_written: false,
            verbose: false,
            proxy: ProxyMode::None,
        }
    }

    /// Builds the core from a loaded payload, seeding configuration from its settings.
    pub fn from_payload(content: &PayloadContent) -> Self {
        let mut core = Self::new(
            content.magic_marker,
            content.performed_operations().to_vec(),
        );
        let settings = content.settings();
        core.set_value("ProductName", &settings.name);
        core.set_value("ProductVersion", &settings.version);
        if let Some(target_dir) = &settings.target_dir {
            core.set_value("TargetDir", target_dir);
        }
        core.default_repositories = settings.repositories.clone();
        core.components = content.components().to_vec();
        core
    }

    pub fn magic_marker(&self) -> MagicMarker {
        self.magic_marker
    }

    pub fn is_installer(&self) -> bool {
        self.magic_marker == MagicMarker::Installer
    }

    pub fn is_uninstaller(&self) -> bool {
        self.magic_marker == MagicMarker::Uninstaller
    }

    pub fn performed_operations(&self) -> &[PerformedOperation] {
        &self.performed_operations
    }

    pub fn components(&self) -> &[InstalledComponent] {
        &self.components
    }

    pub fn set_value(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_value(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Expands `@Key@` placeholders from the configuration values. Unknown keys are left as is.
    pub fn replace_variables(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('@') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('@') {
                Some(end) => {
                    let key = &after[..end];
                    match self.values.get(key) {
                        Some(value) if !key.is_empty() => {
                            out.push_str(value);
                            rest = &after[end + 1..];
                        }
                        _ => {
                            out.push('@');
                            rest = after;
                        }
                    }
                }
                None => {
                    out.push('@');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    pub fn maintenance_mode(&self) -> MaintenanceMode {
        self.maintenance_mode
    }

    pub fn set_updater(&mut self) {
        self.maintenance_mode = MaintenanceMode::Updater;
    }

    pub fn set_package_manager(&mut self) {
        self.maintenance_mode = MaintenanceMode::PackageManager;
    }

    /// Session-only repositories; nothing is fetched until a flow asks for them.
    pub fn set_temporary_repositories(&mut self, repositories: Vec<String>, replace: bool) {
        if replace {
            self.temporary_repositories.clear();
        }
        for repository in repositories {
            if !self.temporary_repositories.contains(&repository) {
                self.temporary_repositories.push(repository);
            }
        }
    }

    pub fn temporary_repositories(&self) -> &[String] {
        &self.temporary_repositories
    }

    pub fn add_user_repositories(&mut self, repositories: Vec<String>) {
        for repository in repositories {
            if !self.user_repositories.contains(&repository) {
                self.user_repositories.push(repository);
            }
        }
    }

    pub fn user_repositories(&self) -> &[String] {
        &self.user_repositories
    }

    pub fn default_repositories(&self) -> &[String] {
        &self.default_repositories
    }

    /// Repositories a flow should consult: temporary ones replace the defaults
    /// when present, user repositories always add to them.
    pub fn effective_repositories(&self) -> Vec<String> {
        let base = if self.temporary_repositories.is_empty() {
            &self.default_repositories
        } else {
            &self.temporary_repositories
        };
        let mut out = base.clone();
        for repository in &self.user_repositories {
            if !out.contains(repository) {
                out.push(repository.clone());
            }
        }
        out
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn set_maintenance_tool_written(&mut self) {
        self.maintenance_tool_written = true;
    }

    pub fn finished_with_success(&self) -> bool {
        self.status == Status::Success || self.maintenance_tool_written
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn proxy(&self) -> &ProxyMode {
        &self.proxy
    }

    pub fn set_proxy(&mut self, proxy: ProxyMode) {
        self.proxy = proxy;
    }
}
