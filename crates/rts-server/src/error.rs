//! Error types for the server.

use std::path::{Path, PathBuf};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::lifecycle::ServerState;

/// Server lifecycle error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A listener could not be bound.
    #[error("Failed to bind {what} listener on {host}:{port}: {source}")]
    Bind {
        /// Which listener ("http" or "websocket").
        what: &'static str,
        /// Host the bind was attempted on.
        host: String,
        /// Port the bind was attempted on.
        port: u16,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Operation not allowed in the current lifecycle state.
    #[error("Cannot {operation} while server is {state:?}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// State the server was in.
        state: ServerState,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to turn a request path into file bytes.
///
/// Converted into a plain-text response at the HTTP boundary; never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Nothing exists at the joined path.
    #[error("File {} not found!", .0.display())]
    NotFound(PathBuf),

    /// The path exists but could not be read.
    #[error("Error getting the file: {source}.")]
    ReadFailure {
        /// Path that failed to read (after index resolution).
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl ResolveError {
    /// Filesystem path the request resolved to.
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path) | Self::ReadFailure { path, .. } => path,
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ReadFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
