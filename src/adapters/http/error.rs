//! HTTP mapping for domain errors.
//!
//! Every failed request answers with the status of its error category and a
//! JSON body:
//!
//! ```json
//! { "code": "forbidden:chat", "message": "...", "cause": "..." }
//! ```
//!
//! `cause` is omitted for database errors and whenever the error has none.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorKind, Surface};

/// Standard error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable `category:subject` code.
    pub code: String,
    /// Human-readable message for the code.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&DomainError> for ErrorResponse {
    fn from(err: &DomainError) -> Self {
        Self {
            code: err.code.to_string(),
            message: err.code.message().to_string(),
            cause: err.public_cause().map(String::from),
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        if self.code.surface == Surface::Database || self.code.kind == ErrorKind::Offline {
            tracing::error!(code = %self.code, cause = ?self.cause, "request failed");
        } else {
            tracing::debug!(code = %self.code, cause = ?self.cause, "request rejected");
        }

        let status = StatusCode::from_u16(self.code.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}
