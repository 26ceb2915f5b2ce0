//! HTTP error responses
//!
//! Every failure leaves the gateway as `{"error": ..., "details": ...}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use qbo_client::{DispatchError, OperationError, UnknownName};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    UnknownName(#[from] UnknownName),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Operation(OperationError::Dispatch(DispatchError::Remote {
                status, ..
            })) => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            ApiError::Operation(OperationError::Dispatch(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Operation(OperationError::Auth(e)) => match e {
                intuit_auth::Error::RefreshDenied(_) | intuit_auth::Error::MissingCredential(_) => {
                    StatusCode::UNAUTHORIZED
                }
                intuit_auth::Error::StoreUnavailable(_)
                | intuit_auth::Error::StoreWriteError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::UnknownName(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Outcome label for `gateway_operations_total`.
    pub fn outcome(&self) -> &'static str {
        match self {
            ApiError::Operation(e) => e.kind(),
            ApiError::UnknownName(_) => "unknown_name",
            ApiError::BadRequest(_) => "bad_request",
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            ApiError::Operation(e) => e.to_payload(),
            ApiError::UnknownName(e) => json!({
                "error": e.to_string(),
                "details": format!("no {} named {:?}", e.kind, e.name),
            }),
            ApiError::BadRequest(msg) => json!({
                "error": "invalid request",
                "details": msg,
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.payload())).into_response()
    }
}
