mod error;
mod options;
mod package_manager;
mod payload;
mod status;

pub use error::SetupError;
pub use options::{ComponentStyle, ProxyMode, RuntimeOptions};
pub use package_manager::{MaintenanceMode, PackageManagerCore};
pub use payload::{
    decode_payload_trailer, encode_payload_trailer, payload_trailer_offset, InstalledComponent,
    MagicMarker, PayloadBody, PayloadContent, PayloadSettings, PerformedOperation, MAGIC_COOKIE,
};
pub use status::{ExitStatus, Status};

#[cfg(test)]
mod tests;
