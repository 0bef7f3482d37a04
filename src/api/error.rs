//! HTTP mapping of settlement errors.
//!
//! Validation messages are returned verbatim. Everything else gets a generic
//! message; the detail is logged under the request's correlation id.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::middleware::CorrelationId;
use crate::settlement::SettlementError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    code: &'static str,
    correlation_id: String,
}

/// Error response returned by route handlers
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
    pub correlation_id: String,
}

impl ApiError {
    pub fn from_settlement(err: SettlementError, correlation_id: &CorrelationId) -> Self {
        let (status, message) = match &err {
            SettlementError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            SettlementError::NotFound(_) => (StatusCode::NOT_FOUND, "Transaction not found".to_string()),
            SettlementError::InProgress => (
                StatusCode::CONFLICT,
                "Request is already being processed".to_string(),
            ),
            SettlementError::SubmissionFailure(_) => (
                StatusCode::BAD_GATEWAY,
                "Transaction could not be submitted".to_string(),
            ),
            SettlementError::MintFailure(_)
            | SettlementError::CompensationFailure(_)
            | SettlementError::Storage(_)
            | SettlementError::Ledger(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(
                target: "stakevault::api",
                correlation_id = %correlation_id.as_str(),
                code = err.error_code(),
                error = %err,
                "Request failed"
            );
        }

        Self {
            status,
            message,
            code: err.error_code(),
            correlation_id: correlation_id.as_str().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code,
            correlation_id: self.correlation_id,
        };
        (self.status, Json(body)).into_response()
    }
}
