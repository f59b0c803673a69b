use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::promotion::{PromotionRequest, PromotionStatus};

// ── Decision Event Types ──────────────────────────────────────

/// A structured event payload sent to webhook endpoints whenever a
/// promotion request is submitted or resolved.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    /// Event type identifier, e.g. "promotion_submitted", "promotion_approved".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    pub request_id: String,
    pub target_user_id: u64,
    pub target_username: String,
    pub target_rank_id: u64,
    /// Event-specific details (requester, processor, outcome message).
    pub details: serde_json::Value,
}

impl DecisionEvent {
    pub fn submitted(request: &PromotionRequest) -> Self {
        Self {
            event_type: "promotion_submitted".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: request.id.clone(),
            target_user_id: request.target_user_id,
            target_username: request.target_username.clone(),
            target_rank_id: request.target_rank_id,
            details: serde_json::json!({
                "requester_user_id": request.requester_user_id,
                "requester_username": request.requester_username,
                "event": request.event,
            }),
        }
    }

    /// Event for a request that has reached a terminal status.
    pub fn resolved(request: &PromotionRequest) -> Self {
        let event_type = match request.status {
            PromotionStatus::Approved => "promotion_approved",
            PromotionStatus::Rejected => "promotion_rejected",
            // Pending never reaches here; map it with Failed rather than
            // panicking in a notification path.
            PromotionStatus::Failed | PromotionStatus::Pending => "promotion_failed",
        };
        Self {
            event_type: event_type.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: request.id.clone(),
            target_user_id: request.target_user_id,
            target_username: request.target_username.clone(),
            target_rank_id: request.target_rank_id,
            details: serde_json::json!({
                "processed_by": request.processed_by,
                "result_message": request.result_message,
            }),
        }
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    let result = mac.finalize();
    let bytes = result.into_bytes();
    format!("sha256={}", hex::encode(bytes))
}

// ── Webhook Notifier ──────────────────────────────────────────

/// Dispatches decision events to the configured moderation-channel URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-RankGate-Signature header)
/// - Up to 2 retries with back-off (1s → 5s)
///
/// Delivery is strictly fire-and-forget: a dead webhook endpoint never
/// affects the workflow state that triggered the event.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("RankGate-Webhook/1.0")
                .build()
                .expect("failed to build webhook HTTP client"),
        }
    }

    /// Send one event to a single URL with retry.
    ///
    /// If `signing_secret` is `Some`, the request body is signed with
    /// HMAC-SHA256 and the signature is sent in `X-RankGate-Signature`.
    /// Returns `Ok(())` if delivery succeeded on any attempt.
    pub async fn send(
        &self,
        url: &str,
        event: &DecisionEvent,
        signing_secret: Option<&str>,
    ) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("webhook serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let signature = signing_secret.map(|s| hmac_sha256_hex(s, &payload));

        let backoff_secs: &[u64] = &[0, 1, 5];

        for (attempt, &delay) in backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(
                    url,
                    attempt,
                    delay_secs = delay,
                    event_type = %event.event_type,
                    "retrying webhook delivery"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-rankgate-delivery-id", &delivery_id)
                .header("x-rankgate-event", &event.event_type);

            if let Some(ref sig) = signature {
                req = req.header("x-rankgate-signature", sig.as_str());
            }

            let result = req.body(payload.clone()).send().await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        "webhook delivered successfully"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "webhook delivery failed (non-2xx), will retry"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "webhook request error, will retry"
                    );
                }
            }
        }

        Err(anyhow::anyhow!(
            "webhook delivery failed after retries: {}",
            url
        ))
    }

    /// Dispatch an event to all configured webhook URLs (fire-and-forget).
    ///
    /// Each URL is attempted independently with retry; failures in one do
    /// not block others.
    pub fn dispatch(&self, urls: &[String], signing_secret: Option<&str>, event: DecisionEvent) {
        if urls.is_empty() {
            return;
        }

        let notifier = self.clone();
        let urls = urls.to_vec();
        let secret = signing_secret.map(String::from);

        tokio::spawn(async move {
            for url in &urls {
                if let Err(e) = notifier.send(url, &event, secret.as_deref()).await {
                    warn!(url, error = %e, "webhook dispatch ultimately failed");
                }
            }
        });
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────
