use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use setupbase_core::ProxyMode;

pub const UPDATE_INDEX_FILE_NAME: &str = "Updates.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPackage {
    pub name: String,
    pub version: Version,
}

/// Contents of a repository's `Updates.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateIndex {
    #[serde(default, rename = "package")]
    pub packages: Vec<IndexedPackage>,
}

impl UpdateIndex {
    pub fn parse(content: &str) -> Result<Self> {
        let index: Self = toml::from_str(content).context("failed parsing update index")?;
        for package in &index.packages {
            if package.name.trim().is_empty() {
                bail!("update index contains a package with an empty name");
            }
        }
        Ok(index)
    }

    pub fn package(&self, name: &str) -> Option<&IndexedPackage> {
        self.packages
            .iter()
            .filter(|package| package.name == name)
            .max_by(|left, right| left.version.cmp(&right.version))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryLocation {
    Local(PathBuf),
    Remote(String),
}

impl RepositoryLocation {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("repository location must not be empty");
        }
        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(Self::Local(PathBuf::from(path)));
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(Self::Remote(raw.trim_end_matches('/').to_string()));
        }
        if let Some((scheme, _)) = raw.split_once("://") {
            bail!("unsupported repository scheme '{scheme}': {raw}");
        }
        Ok(Self::Local(PathBuf::from(raw)))
    }

    pub fn index_location(&self) -> String {
        match self {
            Self::Local(dir) => dir.join(UPDATE_INDEX_FILE_NAME).display().to_string(),
            Self::Remote(base) => format!("{base}/{UPDATE_INDEX_FILE_NAME}"),
        }
    }
}

/// Loads update indexes, going through the configured proxy for remote repositories.
#[derive(Debug, Clone)]
pub struct IndexFetcher {
    proxy: ProxyMode,
}

impl IndexFetcher {
    pub fn new(proxy: ProxyMode) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &ProxyMode {
        &self.proxy
    }

    pub fn fetch(&self, repository: &str) -> Result<UpdateIndex> {
        let location = RepositoryLocation::parse(repository)?;
        let content = match &location {
            RepositoryLocation::Local(dir) => {
                let path = dir.join(UPDATE_INDEX_FILE_NAME);
                fs::read_to_string(&path)
                    .with_context(|| format!("failed reading update index: {}", path.display()))?
            }
            RepositoryLocation::Remote(_) => self.fetch_remote(&location.index_location())?,
        };
        UpdateIndex::parse(&content)
            .with_context(|| format!("invalid update index: {}", location.index_location()))
    }

    fn fetch_remote(&self, url: &str) -> Result<String> {
        tracing::debug!(url, proxy = ?self.proxy, "fetching update index");
        self.client()?
            .get(url)
            .send()
            .with_context(|| format!("failed fetching update index {url}"))?
            .error_for_status()
            .with_context(|| format!("update index request failed for {url}"))?
            .text()
            .with_context(|| format!("failed reading update index body from {url}"))
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        let builder = reqwest::blocking::Client::builder();
        let builder = match &self.proxy {
            ProxyMode::None => builder.no_proxy(),
            ProxyMode::System => builder,
            ProxyMode::Manual(url) => builder.proxy(
                reqwest::Proxy::all(url.as_str())
                    .with_context(|| format!("invalid proxy url: {url}"))?,
            ),
        };
        builder.build().context("failed building http client")
    }
}
