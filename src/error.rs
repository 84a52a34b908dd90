use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::store::StoreError;
use crate::utils::{error_codes, error_to_api_response};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("{0}")]
    Ineligible(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("email already registered")]
    EmailExists,
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> i32 {
        match self {
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::InvalidTransition { .. } => error_codes::INVALID_TRANSITION,
            AppError::Ineligible(_) => error_codes::INELIGIBLE,
            AppError::Conflict(_) => error_codes::CONFLICT,
            AppError::Unauthorized(_) => error_codes::AUTH_FAILED,
            AppError::EmailExists => error_codes::USER_EXISTS,
            AppError::Storage(_) | AppError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::InvalidTransition { .. }
            | AppError::Ineligible(_)
            | AppError::EmailExists => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let msg = match &self {
            // 存储细节不对外暴露
            AppError::Storage(e) => {
                tracing::error!("storage error: {}", e);
                "internal server error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (self.status(), error_to_api_response::<()>(self.code(), msg)).into_response()
    }
}
