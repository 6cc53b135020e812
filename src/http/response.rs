//! Error responses.
//!
//! # Design Decisions
//! - Every error body has the same shape: code, message, request id
//! - Violation messages are generic unless diagnostics are enabled
//! - The request id is echoed so clients can quote it in reports

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::policy::Violation;
use crate::rate_limit::X_REQUEST_ID;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    request_id: Option<String>,
}

/// An error returned to an API client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    request_id: Option<String>,
}

impl ApiError {
    /// 422 carrying the violation kind as its code.
    pub fn violation(violation: &Violation, expose_detail: bool, request_id: Option<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: violation.kind.as_str(),
            message: violation.public_message(expose_detail),
            request_id,
        }
    }

    pub fn unauthorized(request_id: Option<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "Missing or invalid API key".to_string(),
            request_id,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: self.message,
            request_id: self.request_id,
        };
        (self.status, Json(body)).into_response()
    }
}

/// The request id assigned at the edge, if any.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
