//! # HTTP error mapping
//!
//! [`ApiError`] is the error type of every handler. It converts from
//! [`StoreError`] with `?` and renders as `{"error": "..."}`:
//!
//! | Error | Status |
//! |-------|--------|
//! | validation, invalid folder reference, cycle, bad request | 400 |
//! | not authenticated, wrong credentials | 401 |
//! | not found | 404 |
//! | username taken | 409 |
//! | storage / session / hashing failure | 500, generic body, detail logged |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(e) => match e {
                StoreError::Validation(_)
                | StoreError::InvalidReference { .. }
                | StoreError::Cycle { .. } => StatusCode::BAD_REQUEST,
                StoreError::NotFound { .. } | StoreError::VersionNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                StoreError::Conflict(_) => StatusCode::CONFLICT,
                StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tower_sessions::session::Error> for ApiError {
    fn from(e: tower_sessions::session::Error) -> Self {
        ApiError::Internal(format!("session error: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
