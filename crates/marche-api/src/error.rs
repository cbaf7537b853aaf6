//! API error handling
//!
//! Settlement failures keep their machine-readable code and retry hint on
//! the wire. Everything else the HTTP layer rejects on its own is a 400 or
//! a 401.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marche_settlement::SettlementError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable actor identity on the request
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Settlement(e) => e.code(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Settlement(e) => match e {
                SettlementError::InvalidAmount(_)
                | SettlementError::InvalidRate(_)
                | SettlementError::ResolutionNoteRequired => StatusCode::BAD_REQUEST,
                SettlementError::Unauthorized(_) => StatusCode::FORBIDDEN,
                SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
                SettlementError::DuplicateOrder(_)
                | SettlementError::IllegalTransition(_)
                | SettlementError::VersionConflict(_) => StatusCode::CONFLICT,
                SettlementError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Settlement(e) if e.is_retryable())
    }
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub msg: String,
    pub retryable: bool,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.error_code().to_string(),
            msg: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}
