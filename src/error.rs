use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::inventory::InventoryError;
use crate::storage::StoreError;

/// Errors surfaced to HTTP clients as `{"detail": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Le token est invalid ou expiré")]
    InvalidToken,

    #[error("Vous n'êtes pas autorisé á faire cette requete")]
    Forbidden,

    #[error("Identifiants non reconnu")]
    InvalidCredentials,

    #[error("{0}")]
    NotFound(String),

    #[error("Cette email existe deja")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    /// Request refused by an extractor before reaching the handler.
    #[error("{1}")]
    Rejected(StatusCode, String),

    #[error("Le serveur est occupé, réessayez")]
    Busy,

    #[error("Erreur interne du serveur")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidToken | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::EmailTaken => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rejected(status, _) => *status,
            ApiError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail(_) => ApiError::EmailTaken,
            StoreError::Contention => ApiError::Busy,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(e: InventoryError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Token(_) => ApiError::InvalidToken,
            AuthError::Signing(e) => ApiError::Internal(e.to_string()),
            AuthError::Hash(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // The cause of internal errors stays in the logs.
        if let ApiError::Internal(cause) = &self {
            error!(%cause, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
