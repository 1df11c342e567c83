//! Error taxonomy shared by every request handler.
//!
//! Handlers return [`AppError`] upward; the browse dispatcher is the only
//! place that turns one into a response (see `presenter`).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum AppError {
    /// The request path normalises to somewhere outside the served root.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Access denied: {}", .0.display())]
    AccessDenied(PathBuf),

    /// Directory or file I/O failed after the path was resolved.
    #[error("Read error on {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Only raised when the artifact as a whole could not be produced.
    #[error("Archive build failure: {0}")]
    ArchiveBuildFailure(String),

    #[error("Render failure: {0}")]
    RenderFailure(#[from] RenderError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure reported by a template implementation.
#[derive(Error, Debug)]
#[error("template '{template}' failed: {message}")]
pub struct RenderError {
    pub template: &'static str,
    pub message: String,
}

impl AppError {
    /// Maps an I/O error raised while inspecting `path` onto the taxonomy.
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => AppError::NotFound(path),
            io::ErrorKind::PermissionDenied => AppError::AccessDenied(path),
            _ => AppError::ReadError { path, source: err },
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        AppError::ReadError {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking task failed: {}", err))
    }
}
