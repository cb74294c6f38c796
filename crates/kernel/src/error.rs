//! Application error types.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::category::CategoryError;
use crate::entity::ServiceError;
use crate::sequence::SequenceError;
use crate::store::StoreError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

/// Failure body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidId(_) => AppError::BadRequest(err.to_string()),
            ServiceError::NotFound { .. } => AppError::NotFound(err.to_string()),
            ServiceError::Validation(message) => AppError::Validation(message),
            ServiceError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<SequenceError> for AppError {
    fn from(err: SequenceError) -> Self {
        match err {
            SequenceError::UnknownType(_) => AppError::BadRequest(err.to_string()),
            SequenceError::Exhausted { .. } => AppError::Internal(err.to_string()),
            SequenceError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<CategoryError> for AppError {
    fn from(err: CategoryError) -> Self {
        match err {
            CategoryError::Store(e) => AppError::Store(e),
            CategoryError::Tree(e) => AppError::Internal(e.to_string()),
        }
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
