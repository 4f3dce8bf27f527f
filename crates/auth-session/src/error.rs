//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
///
/// These never escape the [`SessionStore`](crate::SessionStore) operations;
/// the store converts them into user-facing messages on its state. They are
/// returned directly by the [`AuthBackend`](crate::AuthBackend) seam.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Backend rejected the credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Session expired and refresh failed
    #[error("Session expired")]
    SessionExpired,

    /// Session was invalidated server-side
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Backend answered with an unexpected status and no usable body
    #[error("Backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] session_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable
    /// - HTTP 5xx responses
    /// - Connection failures and timeouts
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Timeout => true,
            AuthError::Backend { status, .. } => *status >= 500,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() || e.is_request() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

impl From<session_config_and_utils::CoreError> for AuthError {
    fn from(e: session_config_and_utils::CoreError) -> Self {
        AuthError::Config(e.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
