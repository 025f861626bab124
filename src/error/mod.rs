use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for UI service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Flat discriminant of [`ClientError`], used for exhaustive dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CircuitOpen,
    HalfOpenBudgetExceeded,
    Http,
    Transport,
    Decode,
    RetriesExhausted,
    GracefulDegradation,
    InvalidRequest,
}

/// Errors returned by the API client
#[derive(Error, Debug)]
pub enum ClientError {
    /// The breaker rejected the call without attempting it
    #[error("circuit breaker error: circuit breaker is open")]
    CircuitOpen,

    /// The breaker is on probation and its probe budget is used up
    #[error("circuit breaker error: circuit breaker is half-open, max calls exceeded")]
    HalfOpenBudgetExceeded,

    /// The API service answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// No response was received (connection refused, timeout, ...)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A success response carried a body that could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Every retry failed; `source` holds the last failure
    #[error("{operation} failed after {retries} retries: {source}")]
    RetriesExhausted {
        operation: String,
        retries: u32,
        source: Box<ClientError>,
    },

    /// A read operation fell back to an empty result
    #[error("graceful degradation for {operation}: {source}")]
    GracefulDegradation {
        operation: String,
        source: Box<ClientError>,
    },

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Whether a downstream status code is worth retrying.
///
/// Only 4xx other than 408 and 429 is final: the request itself was rejected
/// and will fail the same way again. Any other non-200 status is retried.
pub fn is_retryable_status(status: u16) -> bool {
    !(400..500).contains(&status) || matches!(status, 408 | 429)
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::CircuitOpen => ErrorKind::CircuitOpen,
            ClientError::HalfOpenBudgetExceeded => ErrorKind::HalfOpenBudgetExceeded,
            ClientError::Http { .. } => ErrorKind::Http,
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::Decode(_) => ErrorKind::Decode,
            ClientError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            ClientError::GracefulDegradation { .. } => ErrorKind::GracefulDegradation,
            ClientError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Classify a single attempt's failure for the retry loop
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http { status, .. } => is_retryable_status(*status),
            ClientError::Transport(_) | ClientError::Decode(_) => true,
            ClientError::CircuitOpen
            | ClientError::HalfOpenBudgetExceeded
            | ClientError::RetriesExhausted { .. }
            | ClientError::GracefulDegradation { .. }
            | ClientError::InvalidRequest(_) => false,
        }
    }

    /// True when the breaker refused the call and the API was never reached
    pub fn is_breaker_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::CircuitOpen | ClientError::HalfOpenBudgetExceeded
        )
    }

    pub fn is_degradation(&self) -> bool {
        matches!(self, ClientError::GracefulDegradation { .. })
    }

    /// Follow retry and degradation wrappers down to the original failure
    pub fn root_cause(&self) -> &ClientError {
        let mut current = self;
        loop {
            match current {
                ClientError::RetriesExhausted { source, .. }
                | ClientError::GracefulDegradation { source, .. } => current = source,
                other => return other,
            }
        }
    }

    /// Status code of the underlying HTTP failure, if there was one
    pub fn status_code(&self) -> Option<u16> {
        match self.root_cause() {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the API rejected the request itself (bad input, unknown item)
    pub fn is_client_error(&self) -> bool {
        self.status_code()
            .map(|status| (400..500).contains(&status) && !is_retryable_status(status))
            .unwrap_or(false)
    }

    /// Status the UI should answer with when this error reaches a handler
    pub fn http_status(&self) -> StatusCode {
        if self.is_degradation() {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        match self.root_cause() {
            ClientError::Http { status, .. } if self.is_client_error() => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            ClientError::Http { .. } => StatusCode::BAD_GATEWAY,
            ClientError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ClientError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            ClientError::CircuitOpen | ClientError::HalfOpenBudgetExceeded => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ClientError::Decode(_) => StatusCode::BAD_GATEWAY,
            ClientError::InvalidRequest(_)
            | ClientError::RetriesExhausted { .. }
            | ClientError::GracefulDegradation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// UI service error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("API service error: {0}")]
    Client(#[from] ClientError),
}

impl ServiceError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Client(e) => e.http_status(),
        }
    }

    fn is_degraded(&self) -> bool {
        match self {
            ServiceError::Client(e) => e.is_degradation() || e.is_breaker_rejection(),
            _ => false,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "degraded": self.is_degraded(),
        }));

        (status, body).into_response()
    }
}
