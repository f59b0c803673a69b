//! Client for the Roblox users/groups/auth APIs.
//!
//! All knowledge of the Roblox authentication handshake lives here: mutating
//! group calls require a fresh anti-forgery token (`x-csrf-token`) obtained
//! via a throwaway authenticated call, attached alongside the long-lived
//! `.ROBLOSECURITY` session cookie. No other component may assume a token
//! stays valid; tokens are fetched immediately before each mutating call
//! and never cached.

pub mod client;

pub use client::{ApiBases, RobloxClient};

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::promotion::{RankChangeOutcome, UserProfile};

/// Boundary to the external group authority. The workflow only talks to
/// this trait, so tests can drive the state machine against stubs.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Look up a user's public profile. `Ok(None)` means the service reports
    /// no such user; `Err` means the lookup itself could not be completed.
    async fn fetch_user(&self, user_id: u64) -> Result<Option<UserProfile>, AppError>;

    /// The user's current numeric rank in `group_id`, or 0 if they hold no
    /// role there or the lookup fails. Advisory only.
    async fn fetch_rank(&self, user_id: u64, group_id: u64) -> u64;

    /// Obtain a fresh anti-forgery token, or `None` on any failure.
    async fn obtain_token(&self) -> Option<String>;

    /// Change `user_id`'s role in `group_id` to `rank_id`.
    async fn apply_rank(&self, user_id: u64, group_id: u64, rank_id: u64) -> RankChangeOutcome;
}
