use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A promotion request moving through the approval workflow.
///
/// Username fields are snapshots resolved at submission time; they do not
/// track later renames on the Roblox side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub id: String,
    pub target_user_id: u64,
    pub target_username: String,
    pub target_rank_id: u64,
    pub requester_user_id: u64,
    pub requester_username: String,
    /// Free-form justification supplied by the moderation tool. Opaque here.
    pub event: String,
    pub status: PromotionStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub result_message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStatus {
    Pending,
    Approved,
    Rejected,
    Failed,
}

impl PromotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionStatus::Pending => "pending",
            PromotionStatus::Approved => "approved",
            PromotionStatus::Rejected => "rejected",
            PromotionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a rank-change call against the Roblox group API. Transient:
/// folded into a request's terminal fields, never stored itself.
#[derive(Debug, Clone)]
pub struct RankChangeOutcome {
    pub succeeded: bool,
    pub message: String,
}

impl RankChangeOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
        }
    }
}

/// Public profile data for a Roblox user, as returned by the users API.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
}
