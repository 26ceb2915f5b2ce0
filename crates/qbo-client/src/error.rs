//! Error types for dispatch and the operation boundary

use serde_json::json;

/// Failure of a single HTTP round trip to the accounting API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No usable response: DNS, TLS, connect, timeout, or a body cut off
    /// after the status line.
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered with a non-200 status. `body` is the raw response
    /// text, not re-parsed.
    #[error("remote API returned {status}")]
    Remote { status: u16, body: String },

    /// HTTP 200 whose body is not JSON.
    #[error("invalid JSON payload: {message}")]
    InvalidPayload { message: String, body: String },
}

impl DispatchError {
    /// Label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Transport(_) => "transport",
            DispatchError::Remote { .. } => "remote",
            DispatchError::InvalidPayload { .. } => "invalid_payload",
        }
    }
}

/// Caller-visible error for every catalog operation.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Auth(#[from] intuit_auth::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl OperationError {
    /// HTTP status of the remote response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            OperationError::Dispatch(DispatchError::Remote { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Outcome label: the dispatch kind or the auth error label.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::Auth(e) => e.label(),
            OperationError::Dispatch(e) => e.kind(),
        }
    }

    /// Diagnostic detail: the raw remote body or the underlying message.
    pub fn details(&self) -> &str {
        match self {
            OperationError::Auth(e) => e.detail(),
            OperationError::Dispatch(DispatchError::Transport(msg)) => msg,
            OperationError::Dispatch(DispatchError::Remote { body, .. }) => body,
            OperationError::Dispatch(DispatchError::InvalidPayload { body, .. }) => body,
        }
    }

    /// The `{"error": ..., "details": ...}` value returned to callers.
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "error": self.to_string(),
            "details": self.details(),
        })
    }
}

/// A name outside the fixed entity or report vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {name}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
}

/// Result alias for catalog operations.
pub type Result<T> = std::result::Result<T, OperationError>;
