//! Error types for the drive_fetch crate.

use thiserror::Error;

/// Errors that can occur when reading from Google Drive.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Access denied: {0}")]
    AccessError(String),

    #[error("Unsupported Google Apps type: {0}")]
    UnsupportedTypeError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error(
        "{resource} requires authentication: {reason}. \
         No authenticated session is available; authenticate with OAuth2 or a service account."
    )]
    NotAuthenticatedError {
        resource: &'static str,
        reason: String,
    },

    #[error("Public access failed: {public_error}. Authenticated access failed: {source}")]
    AllPathsFailed {
        public_error: String,
        #[source]
        source: Box<DriveError>,
    },

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for DriveError {
    fn from(err: reqwest::Error) -> Self {
        DriveError::NetworkError(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for DriveError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        DriveError::NetworkError("operation timed out".to_string())
    }
}

impl DriveError {
    /// Classify a non-success API status.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => DriveError::AuthenticationError(message),
            403 | 404 => DriveError::AccessError(message),
            _ => DriveError::ApiError { status, message },
        }
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
