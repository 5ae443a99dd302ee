use std::path::PathBuf;

use thiserror::Error;

/// Domain errors that the launcher reports verbatim before exiting with `Failure`.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("installer payload not found: {}", path.display())]
    PayloadNotFound { path: PathBuf },

    #[error("invalid installer payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("invalid server port: '{value}'")]
    InvalidServerPort { value: String },

    #[error("control script does not exist: {}", path.display())]
    MissingScript { path: PathBuf },

    #[error("no repository specified for {flag}")]
    EmptyRepositoryList { flag: String },

    #[error("--runoperation and --undooperation cannot be combined")]
    ConflictingOperationFlags,

    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("controller initialization failed with status {status}")]
    ControllerInit { status: i32 },
}

impl SetupError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }
}
