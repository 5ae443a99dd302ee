use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use semver::Version;
use setupbase_core::{InstalledComponent, ProxyMode};

use crate::IndexFetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    pub name: String,
    pub installed: Version,
    pub available: Version,
}

impl fmt::Display for AvailableUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "update: {} {} -> {}",
            self.name, self.installed, self.available
        )
    }
}

/// Headless comparison of installed components against repository indexes.
#[derive(Debug, Clone)]
pub struct UpdateChecker {
    fetcher: IndexFetcher,
}

impl UpdateChecker {
    pub fn new(proxy: ProxyMode) -> Self {
        Self {
            fetcher: IndexFetcher::new(proxy),
        }
    }

    /// Any repository that cannot be read fails the whole check.
    pub fn check(
        &self,
        repositories: &[String],
        installed: &[InstalledComponent],
    ) -> Result<Vec<AvailableUpdate>> {
        let mut newest: BTreeMap<String, Version> = BTreeMap::new();
        for repository in repositories {
            let index = self
                .fetcher
                .fetch(repository)
                .with_context(|| format!("update check failed for repository {repository}"))?;
            for package in index.packages {
                match newest.get(&package.name) {
                    Some(current) if *current >= package.version => {}
                    _ => {
                        newest.insert(package.name, package.version);
                    }
                }
            }
        }

        let mut updates = Vec::new();
        for component in installed {
            let installed_version = match Version::parse(component.version.trim()) {
                Ok(version) => version,
                Err(err) => {
                    tracing::warn!(
                        component = %component.name,
                        version = %component.version,
                        error = %err,
                        "skipping component with unparseable version"
                    );
                    continue;
                }
            };
            if let Some(available) = newest.get(&component.name) {
                if *available > installed_version {
                    updates.push(AvailableUpdate {
                        name: component.name.clone(),
                        installed: installed_version,
                        available: available.clone(),
                    });
                }
            }
        }
        updates.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(updates)
    }
}
