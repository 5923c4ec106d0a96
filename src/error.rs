//! Error types shared by the store, auth and HTTP layers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Standard API error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A required form field was empty or malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("{field} is invalid: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} does not exist")]
    NotFound(&'static str),

    #[error("Authorization required")]
    Unauthorized,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Deletion must be confirmed")]
    ConfirmationRequired,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::ConfirmationRequired
            | AppError::BadRequest(_)
            | AppError::Store(StoreError::InvalidCursor) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::Store(StoreError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            AppError::Unauthorized | AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the user. Store internals and the reason a sign-in
    /// failed are never exposed.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(AuthError::InvalidCredentials) | AppError::Auth(AuthError::Backend(_)) => {
                "Login failed. Please check your email and password.".to_string()
            }
            AppError::Auth(_) => "Invalid or expired token".to_string(),
            AppError::Store(StoreError::NotFound { .. }) => "Record does not exist".to_string(),
            AppError::Store(StoreError::Unavailable(_)) => "Store not available".to_string(),
            AppError::Store(StoreError::InvalidCursor) => "Invalid cursor".to_string(),
            AppError::Store(_) => "The request could not be completed. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let message = match &self {
            AppError::Validation(ValidationError::Invalid { reason, .. }) => {
                Some((*reason).to_string())
            }
            _ => None,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.user_message(),
                message,
            }),
        )
            .into_response()
    }
}
