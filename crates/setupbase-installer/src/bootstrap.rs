use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use setupbase_core::{
    decode_payload_trailer, encode_payload_trailer, payload_trailer_offset, PayloadContent,
    SetupError,
};

/// Overrides where the payload is read from.
pub const PAYLOAD_ENV: &str = "SETUPBASE_PAYLOAD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLocation {
    /// Appended to the executable image.
    Embedded(PathBuf),
    /// A standalone resource file.
    Resource(PathBuf),
}

impl PayloadLocation {
    pub fn path(&self) -> &Path {
        match self {
            Self::Embedded(path) | Self::Resource(path) => path,
        }
    }
}

pub fn locate_payload(current_exe: &Path, explicit: Option<PathBuf>) -> PayloadLocation {
    if let Some(path) = explicit {
        return PayloadLocation::Resource(path);
    }

    if cfg!(target_os = "macos") {
        // <bundle>/Contents/MacOS/<exe> -> <bundle>/Contents/Resources/installer.dat
        let contents = current_exe
            .parent()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."));
        return PayloadLocation::Resource(contents.join("Resources").join("installer.dat"));
    }

    PayloadLocation::Embedded(current_exe.to_path_buf())
}

pub fn load_payload(location: &PayloadLocation) -> Result<PayloadContent> {
    let path = location.path();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(SetupError::PayloadNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read installer payload: {}", path.display()));
        }
    };

    decode_payload_trailer(&bytes)
        .with_context(|| format!("failed to load installer payload: {}", path.display()))
}

/// Locates and loads the payload of the running binary. Any failure is fatal to startup.
pub fn bootstrap_payload() -> Result<PayloadContent> {
    let current_exe = std::env::current_exe().context("failed to resolve current executable")?;
    let explicit = std::env::var_os(PAYLOAD_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);
    let location = locate_payload(&current_exe, explicit);
    tracing::debug!(path = %location.path().display(), "loading installer payload");

    let content = load_payload(&location)?;
    tracing::debug!(
        marker = content.magic_marker.as_str(),
        operations = content.performed_operations().len(),
        components = content.components().len(),
        "installer payload loaded"
    );
    Ok(content)
}

pub fn maintenance_tool_file_name() -> &'static str {
    if cfg!(windows) {
        "maintenancetool.exe"
    } else {
        "maintenancetool"
    }
}

/// Writes a copy of `source_exe` with its payload replaced by `content`.
pub fn write_maintenance_tool(
    source_exe: &Path,
    destination: &Path,
    content: &PayloadContent,
) -> Result<()> {
    let image = fs::read(source_exe)
        .with_context(|| format!("failed to read executable: {}", source_exe.display()))?;
    let image_end = payload_trailer_offset(&image).unwrap_or(image.len());

    let mut out = image[..image_end].to_vec();
    out.extend(encode_payload_trailer(content)?);

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(destination, &out)
        .with_context(|| format!("failed to write maintenance tool: {}", destination.display()))?;
    copy_permissions(source_exe, destination)
}

pub(crate) fn copy_permissions(source: &Path, destination: &Path) -> Result<()> {
    let permissions = fs::metadata(source)
        .with_context(|| format!("failed to stat {}", source.display()))?
        .permissions();
    fs::set_permissions(destination, permissions)
        .with_context(|| format!("failed to set permissions on {}", destination.display()))
}
