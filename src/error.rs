use std::path::PathBuf;

use thiserror::Error;

/// The library's single error type. Every adapter, parser, search, and
/// export entry point returns `Result<T, Error>`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("invalid container in {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("unrecognized export format in {0}")]
    UnknownFormat(PathBuf),

    #[error("unsupported schema version {found} (max supported {supported})")]
    UnsupportedSchemaVersion { found: String, supported: u32 },

    #[error("conversation {id} failed validation: {reason}")]
    ValidationError { id: String, reason: String },

    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps library errors onto the exit codes the CLI is obligated to use
    /// (0 success is handled by the caller, not represented here).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound(_)
            | Error::PermissionDenied(_)
            | Error::ParseError { .. }
            | Error::UnknownFormat(_)
            | Error::UnsupportedSchemaVersion { .. }
            | Error::ValidationError { .. }
            | Error::Io(_) => 1,
            Error::InvalidQuery(_) => 2,
        }
    }

    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Error {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            _ => Error::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
