use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::promotion::PromotionStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid or missing API key")]
    Unauthorized,

    #[error("missing required field: {field}")]
    Validation { field: &'static str },

    #[error("unknown user: {user_id}")]
    UserNotFound { user_id: u64 },

    #[error("promotion request not found")]
    RequestNotFound,

    #[error("promotion request already processed (status: {status})")]
    AlreadyProcessed { status: PromotionStatus },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                "invalid or missing API key".to_string(),
            ),
            AppError::Validation { field } => (
                StatusCode::BAD_REQUEST,
                "missing_field",
                format!("missing required field: {}", field),
            ),
            AppError::UserNotFound { user_id } => (
                StatusCode::BAD_REQUEST,
                "user_not_found",
                format!("no Roblox user with id {}", user_id),
            ),
            AppError::RequestNotFound => (
                StatusCode::NOT_FOUND,
                "request_not_found",
                "promotion request not found".to_string(),
            ),
            AppError::AlreadyProcessed { status } => (
                StatusCode::CONFLICT,
                "already_processed",
                format!("promotion request already processed (status: {})", status),
            ),
            AppError::Upstream(e) => (StatusCode::BAD_GATEWAY, "upstream_failed", e.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "message": msg,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
