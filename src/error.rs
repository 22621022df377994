use crate::models::ServiceId;
use thiserror::Error;

/// Failures reading or writing the config file.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not determine the user config directory")]
    NoConfigDir,

    #[error("failed to replace config file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Failures of service store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no service at index {0}")]
    IndexOutOfRange(usize),

    #[error("unknown service {0}")]
    NotFound(ServiceId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
