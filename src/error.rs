use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Every failure the uploader can surface.
///
/// The lifecycle manager absorbs the recoverable ones (`NoPortAvailable`,
/// `AuthorizationTimeout`, `CallbackServer`, a first `RefreshFailed`) by
/// falling back; everything that reaches `main` ends the process with a
/// non-zero exit code.
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "no valid token found at {} and --client-secret not provided ({reason})",
        path.display()
    )]
    MissingCredentials { path: PathBuf, reason: String },

    #[error("token file not found: {}", .0.display())]
    TokenNotFound(PathBuf),

    #[error("token path {} is a directory", .0.display())]
    TokenPathIsDirectory(PathBuf),

    #[error("unable to parse token file {}: {source}", path.display())]
    TokenParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "unable to read client secret file {}: {source}\nPlease provide a valid client secret file by using --client-secret",
        path.display()
    )]
    ClientSecretRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse client secret file {}: {reason}", path.display())]
    ClientSecretParse { path: PathBuf, reason: String },

    #[error("timed out after {}s waiting for authorization", .0.as_secs())]
    AuthorizationTimeout(Duration),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("no available port found in range {start}-{end}")]
    NoPortAvailable { start: u16, end: u16 },

    #[error("callback server error: {0}")]
    CallbackServer(String),

    #[error("unable to read authorization code: {0}")]
    ManualInput(String),

    #[error("unable to retrieve token from web: {0}")]
    TokenExchange(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("{operation} failed for '{target}': {reason}")]
    RemoteCallFailed {
        operation: &'static str,
        target: String,
        reason: String,
    },

    #[error("filename '{0}' does not match pattern '[service]_backup_[date]_...'")]
    PatternMismatch(String),

    #[error("invalid date pattern '{0}': expected at least one of yyyy, yy, MM, dd")]
    InvalidDatePattern(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn remote(operation: &'static str, target: impl Into<String>, reason: impl ToString) -> Self {
        Error::RemoteCallFailed {
            operation,
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
