//! Session error types.

use crate::request::ApiResponse;
use thiserror::Error;

/// Why a refresh-token exchange did not produce a new access token.
///
/// Cloned once per queued waiter, so it carries no non-`Clone` sources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token in storage
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// Server answered 2xx without an access token
    #[error("Refresh response did not contain an access token")]
    MissingAccessToken,

    /// Server rejected the exchange
    #[error("Refresh rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// Network failure talking to the refresh endpoint
    #[error("Refresh transport failure: {0}")]
    Transport(String),

    /// New tokens could not be written
    #[error("Failed to persist refreshed tokens: {0}")]
    Storage(String),

    /// The task driving the exchange went away before it settled
    #[error("Refresh abandoned before completion")]
    Abandoned,
}

/// Error returned by [`crate::ApiClient`].
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server answered with a non-2xx status
    #[error("HTTP {}", .0.status())]
    Status(ApiResponse),

    /// Session could not be repaired after an invalidation
    #[error("Session expired: {0}")]
    SessionExpired(RefreshError),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// HTTP status of the response, when the server answered at all.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            ApiError::Status(response) => Some(response.status()),
            ApiError::Http(e) => e.status(),
            _ => None,
        }
    }

    /// The server response carried by a status error.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            ApiError::Status(response) => Some(response),
            _ => None,
        }
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Two-factor verification attempted without a prior login
    #[error("No pending two-factor verification")]
    NoPendingVerification,

    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    CredentialsInvalid(String),

    /// Session expired and refresh failed
    #[error("Session expired")]
    SessionExpired,

    /// Token refresh error
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] session_storage::StorageError),

    /// API call error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - HTTP errors with 5xx status codes
    /// - Refresh transport failures
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) | AuthError::Api(ApiError::Http(e)) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            AuthError::Api(ApiError::Status(response)) => response.status().is_server_error(),
            AuthError::Refresh(RefreshError::Transport(_)) => true,
            AuthError::Refresh(RefreshError::Rejected { status }) => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
