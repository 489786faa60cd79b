//! Error types for b2c
//!
//! Failures are tagged once at the HTTP boundary (status, API code,
//! retry-after, transport timeout) so the retry layer never has to
//! re-inspect concrete error shapes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result type alias for b2c operations
pub type Result<T> = std::result::Result<T, Error>;

/// API error code returned with a 401 when the account token has expired
pub const ERR_CODE_EXPIRED_AUTH_TOKEN: &str = "expired_auth_token";
pub const ERR_CODE_BAD_AUTH_TOKEN: &str = "bad_auth_token";
pub const ERR_CODE_UNAUTHORIZED: &str = "unauthorized";
pub const ERR_CODE_BAD_REQUEST: &str = "bad_request";
pub const ERR_CODE_DOWNLOAD_CAP_EXCEEDED: &str = "download_cap_exceeded";
pub const ERR_CODE_NOT_FOUND: &str = "not_found";

/// Error body returned by the B2 API for any non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,

    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub message: String,

    /// Delay requested by the server through the `Retry-After` header
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl ErrorResponse {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn is_bad_request(&self) -> bool {
        self.status == 400
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }

    pub fn is_request_timeout(&self) -> bool {
        self.status == 408
    }

    pub fn is_too_many_requests(&self) -> bool {
        self.status == 429
    }

    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }

    /// 401 with `expired_auth_token`: a fresh token fixes it
    pub fn is_expired_auth(&self) -> bool {
        self.is_unauthorized() && self.code == ERR_CODE_EXPIRED_AUTH_TOKEN
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

/// Main error type for b2c operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Non-2xx response from the API
    #[error("API error {0}")]
    Api(#[from] ErrorResponse),

    /// Transport-level timeout (connect or read)
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Connection dropped while the request body was being sent
    #[error("Unexpected end of stream: {0}")]
    UnexpectedEof(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Retry budget spent; `source` is the last failure observed
    #[error("{operation}: gave up after {attempts} attempts: {source}")]
    AttemptsExceeded {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// No credentials configured and no token cached
    #[error("Authorization required: no credentials configured and no cached token")]
    MissingAuthorization,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// The API error body, if this is (or wraps) an API failure
    pub fn api_response(&self) -> Option<&ErrorResponse> {
        match self.root_cause() {
            Error::Api(resp) => Some(resp),
            _ => None,
        }
    }

    /// Strip `AttemptsExceeded` wrappers down to the underlying failure
    pub fn root_cause(&self) -> &Error {
        let mut err = self;
        while let Error::AttemptsExceeded { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_attempts_exceeded(&self) -> bool {
        matches!(self, Error::AttemptsExceeded { .. })
    }
}
