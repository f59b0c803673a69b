use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::AppState;

pub mod handlers;

/// Build the promotion API router. Every route except `/health` sits behind
/// the shared-secret check.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/submit_promotion", post(handlers::submit_promotion))
        .route(
            "/get_pending_promotions",
            get(handlers::get_pending_promotions),
        )
        .route("/approve_promotion/:id", post(handlers::approve_promotion))
        .route("/reject_promotion/:id", post(handlers::reject_promotion))
        .route("/get_request_status/:id", get(handlers::get_request_status))
        .route("/direct_promote", post(handlers::direct_promote))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        // Liveness probe, outside the auth boundary.
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Middleware: validates the `X-API-Key` header against the configured
/// shared secret. Runs before any handler logic, so a bad key
/// short-circuits ahead of field validation.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(k) if k == state.config.api_key => Ok(next.run(req).await),
        Some(k) => {
            // SECURITY: Never log the expected key or the full provided key
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("rejected request with invalid API key (provided: '{}')", masked);
            Err(AppError::Unauthorized)
        }
        None => {
            tracing::warn!("rejected request with missing X-API-Key header");
            Err(AppError::Unauthorized)
        }
    }
}
