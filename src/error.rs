//! Error types for rota-client.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a refresh episode.
///
/// Every request waiting on the same episode receives a clone of the same
/// value, so this type carries only owned, cloneable data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The episode started with no refresh credential in the token store.
    #[error("No refresh credential available")]
    NoRefreshCredential,

    /// The refresh call failed: network error, non-2xx status, or a 2xx
    /// response without a new access credential.
    #[error("Refresh call failed{}: {message}", status_suffix(.status))]
    RefreshCallFailed {
        /// HTTP status of the refresh response, if one was received.
        status: Option<u16>,
        /// Error description.
        message: String,
    },

    /// The token store could not be read or written during the episode.
    #[error("Credential storage failed during refresh: {0}")]
    Storage(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// The main error type for rota-client.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ───────────────────────────────────────────────────────
    /// The shared refresh episode failed.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// A request that was already replayed once was rejected again.
    #[error("Credential rejected after refresh ({status}): {message}")]
    RetryExhausted {
        /// HTTP status of the second rejection (401 or 403).
        status: u16,
        /// Response body of the second rejection.
        message: String,
    },

    // ── API ──────────────────────────────────────────────────────────────────
    /// API returned a non-success response.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// A header value could not be built.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // ── Storage ──────────────────────────────────────────────────────────────
    /// Storage I/O error.
    #[error("Storage I/O error at {path}: {message}")]
    StorageIo {
        /// Path that caused the error.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// Storage serialization error.
    #[error("Storage serialization error: {0}")]
    StorageSerialization(String),

    /// Keyring backend error.
    #[error("Keyring error: {0}")]
    Keyring(String),

    /// Generic storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    // ── Infrastructure ───────────────────────────────────────────────────────
    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request timeout.
    #[error("Request timed out")]
    Timeout,
}

impl Error {
    /// Returns true if this error means the session is gone and the user has
    /// to log in again.
    #[must_use]
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Error::Refresh(_))
    }

    /// Creates a storage I/O error.
    #[must_use]
    pub fn storage_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StorageIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Maps a transport error, separating timeouts from other failures.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }
}

/// Returns true for statuses that signal a rejected access credential.
#[must_use]
pub fn is_expiry_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Convenience type alias.
pub type Result<T> = std::result::Result<T, Error>;
