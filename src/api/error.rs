//! API Errors - Uniform response envelope
//!
//! Every endpoint answers `{"success": true, "data": ...}` or
//! `{"success": false, "error": "..."}` so clients branch on one field.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::ai::AiError;
use crate::store::StoreError;
use crate::visits::VisitError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

/// Success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

impl From<VisitError> for ApiError {
    fn from(e: VisitError) -> Self {
        let status = match &e {
            VisitError::MissingField(_) | VisitError::AlreadyCheckedIn => StatusCode::BAD_REQUEST,
            VisitError::PatientNotFound | VisitError::VisitNotFound => StatusCode::NOT_FOUND,
            VisitError::NotStaff
            | VisitError::NoHospital
            | VisitError::WrongHospital
            | VisitError::NotCheckedIn => StatusCode::FORBIDDEN,
            VisitError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        let status = match &e {
            AiError::EmptySymptoms => StatusCode::BAD_REQUEST,
            AiError::Forbidden => StatusCode::FORBIDDEN,
            AiError::Upstream(_) | AiError::Parse(_) | AiError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::NotFound(_, _) => Self::not_found(e.to_string()),
            StoreError::PreconditionFailed(_) => Self::bad_request(e.to_string()),
            StoreError::NotAnObject => Self::internal(e.to_string()),
        }
    }
}
