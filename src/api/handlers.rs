use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::promotion::{PromotionRequest, PromotionStatus};
use crate::notification::webhook::DecisionEvent;
use crate::workflow::{DirectPromotion, SubmitPromotion};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ApproveBody {
    pub approver_user_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    pub rejector_user_id: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub request_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub success: bool,
    pub pending_requests: Vec<PromotionRequest>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct DecisionResponse {
    pub success: bool,
    pub message: String,
    pub request: PromotionRequest,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub request: PromotionRequest,
}

#[derive(Serialize)]
pub struct DirectPromoteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /health — liveness probe
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// POST /submit_promotion — create a pending promotion request
pub async fn submit_promotion(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitPromotion>,
) -> Result<Json<SubmitResponse>, AppError> {
    let request = state.workflow.submit(body).await?;

    state.notifier.dispatch(
        &state.config.webhook_urls,
        state.config.webhook_secret.as_deref(),
        DecisionEvent::submitted(&request),
    );

    Ok(Json(SubmitResponse {
        success: true,
        request_id: request.id,
        message: "promotion request submitted for approval".into(),
    }))
}

/// GET /get_pending_promotions — list requests awaiting a decision
pub async fn get_pending_promotions(
    State(state): State<Arc<AppState>>,
) -> Json<PendingResponse> {
    let pending = state.workflow.pending().await;
    let count = pending.len();
    Json(PendingResponse {
        success: true,
        pending_requests: pending,
        count,
    })
}

/// POST /approve_promotion/:id — resolve a pending request by performing
/// the rank change. `success` reflects the external outcome; an upstream
/// failure lands the record in `failed`, not a transport error.
pub async fn approve_promotion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ApproveBody>>,
) -> Result<Json<DecisionResponse>, AppError> {
    let approver = body
        .and_then(|Json(b)| b.approver_user_id)
        .map(|id| id.to_string());

    let request = state.workflow.approve(&id, approver).await?;

    state.notifier.dispatch(
        &state.config.webhook_urls,
        state.config.webhook_secret.as_deref(),
        DecisionEvent::resolved(&request),
    );

    Ok(Json(DecisionResponse {
        success: request.status == PromotionStatus::Approved,
        message: request.result_message.clone().unwrap_or_default(),
        request,
    }))
}

/// POST /reject_promotion/:id — resolve a pending request without touching
/// the external authority.
pub async fn reject_promotion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<RejectBody>>,
) -> Result<Json<DecisionResponse>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let rejector = body.rejector_user_id.map(|id| id.to_string());

    let request = state.workflow.reject(&id, rejector, body.reason).await?;

    state.notifier.dispatch(
        &state.config.webhook_urls,
        state.config.webhook_secret.as_deref(),
        DecisionEvent::resolved(&request),
    );

    Ok(Json(DecisionResponse {
        success: true,
        message: "promotion request rejected".into(),
        request,
    }))
}

/// GET /get_request_status/:id — read one request
pub async fn get_request_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let request = state.workflow.request(&id).await?;
    Ok(Json(StatusResponse {
        success: true,
        request,
    }))
}

/// POST /direct_promote — perform a rank change immediately, bypassing the
/// approval workflow. Nothing is stored.
pub async fn direct_promote(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DirectPromotion>,
) -> Result<Json<DirectPromoteResponse>, AppError> {
    let outcome = state.workflow.direct_promote(body).await?;
    Ok(Json(DirectPromoteResponse {
        success: outcome.succeeded,
        message: outcome.message,
    }))
}
