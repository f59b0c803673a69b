use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::promotion::{PromotionRequest, PromotionStatus, RankChangeOutcome};
use crate::roblox::AuthorityClient;
use crate::store::{RequestStore, StoreError};

/// Submission payload. Fields are optional so validation can name exactly
/// which one is missing instead of bouncing the whole body.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitPromotion {
    pub target_user_id: Option<u64>,
    pub target_rank_id: Option<u64>,
    pub requester_user_id: Option<u64>,
    pub event: Option<String>,
}

/// Direct-promotion payload. Same field validation as submission, minus the
/// justification and the profile-resolution step.
#[derive(Debug, Default, Deserialize)]
pub struct DirectPromotion {
    pub target_user_id: Option<u64>,
    pub target_rank_id: Option<u64>,
    pub requester_user_id: Option<u64>,
}

/// The promotion request lifecycle.
///
/// Requests are created `pending` and leave that state exactly once, via
/// approve (→ `approved`/`failed`), or reject (→ `rejected`). Terminal
/// records are immutable and retained for audit until the process exits.
pub struct PromotionWorkflow {
    store: RequestStore,
    authority: Arc<dyn AuthorityClient>,
    group_id: u64,
    submit_seq: AtomicU64,
}

fn require<T>(field: &'static str, value: Option<T>) -> Result<T, AppError> {
    value.ok_or(AppError::Validation { field })
}

impl PromotionWorkflow {
    pub fn new(store: RequestStore, authority: Arc<dyn AuthorityClient>, group_id: u64) -> Self {
        Self {
            store,
            authority,
            group_id,
            submit_seq: AtomicU64::new(0),
        }
    }

    /// Wall-clock seconds alone can collide for rapid submissions of the
    /// same user/rank pair; the sequence keeps ids unique per process.
    fn next_request_id(&self, target: u64, rank: u64, at: DateTime<Utc>) -> String {
        let seq = self.submit_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}_{}", target, rank, at.timestamp(), seq)
    }

    /// Validate a submission, resolve both usernames, and store a `pending`
    /// request. Nothing touches the store until validation and both profile
    /// lookups have succeeded.
    pub async fn submit(&self, input: SubmitPromotion) -> Result<PromotionRequest, AppError> {
        let target_user_id = require("target_user_id", input.target_user_id)?;
        let target_rank_id = require("target_rank_id", input.target_rank_id)?;
        let requester_user_id = require("requester_user_id", input.requester_user_id)?;
        let event = require("event", input.event)?;

        let target = self
            .authority
            .fetch_user(target_user_id)
            .await?
            .ok_or(AppError::UserNotFound {
                user_id: target_user_id,
            })?;
        let requester = self
            .authority
            .fetch_user(requester_user_id)
            .await?
            .ok_or(AppError::UserNotFound {
                user_id: requester_user_id,
            })?;

        let now = Utc::now();
        let request = PromotionRequest {
            id: self.next_request_id(target_user_id, target_rank_id, now),
            target_user_id,
            target_username: target.name,
            target_rank_id,
            requester_user_id,
            requester_username: requester.name,
            event,
            status: PromotionStatus::Pending,
            created_at: now,
            processed_at: None,
            processed_by: None,
            result_message: None,
        };

        self.store
            .insert(request.clone())
            .map_err(|e| AppError::Internal(e.into()))?;

        tracing::info!(
            request_id = %request.id,
            target_user_id,
            target_rank_id,
            requester_user_id,
            "promotion request submitted"
        );
        Ok(request)
    }

    /// All requests currently awaiting a decision, in submission order.
    pub async fn pending(&self) -> Vec<PromotionRequest> {
        self.store.list_by_status(PromotionStatus::Pending).await
    }

    pub async fn request(&self, id: &str) -> Result<PromotionRequest, AppError> {
        self.store.get(id).await.ok_or(AppError::RequestNotFound)
    }

    /// Approve a pending request: perform the rank change, then record the
    /// outcome (`approved` on success, `failed` otherwise).
    ///
    /// The store claim is held across the external call, so a concurrent
    /// resolution of the same request waits and then observes the terminal
    /// status rather than a second `pending`.
    pub async fn approve(
        &self,
        request_id: &str,
        approver: Option<String>,
    ) -> Result<PromotionRequest, AppError> {
        let mut guard = self.store.claim(request_id).await.map_err(map_claim_err)?;
        if guard.status != PromotionStatus::Pending {
            return Err(AppError::AlreadyProcessed {
                status: guard.status,
            });
        }

        let outcome = self
            .authority
            .apply_rank(guard.target_user_id, self.group_id, guard.target_rank_id)
            .await;

        guard.status = if outcome.succeeded {
            PromotionStatus::Approved
        } else {
            PromotionStatus::Failed
        };
        guard.processed_at = Some(Utc::now());
        guard.processed_by = Some(approver.unwrap_or_else(|| "system".into()));
        guard.result_message = Some(outcome.message);

        tracing::info!(
            request_id,
            status = %guard.status,
            processed_by = guard.processed_by.as_deref().unwrap_or_default(),
            "promotion request resolved"
        );
        Ok(guard.clone())
    }

    /// Reject a pending request. Never calls the mutating external
    /// operation; rejection succeeds regardless of the authority's health.
    pub async fn reject(
        &self,
        request_id: &str,
        rejector: Option<String>,
        reason: Option<String>,
    ) -> Result<PromotionRequest, AppError> {
        let mut guard = self.store.claim(request_id).await.map_err(map_claim_err)?;
        if guard.status != PromotionStatus::Pending {
            return Err(AppError::AlreadyProcessed {
                status: guard.status,
            });
        }

        let rejector = rejector.unwrap_or_else(|| "system".into());
        let reason = reason.unwrap_or_else(|| "No reason provided".into());

        guard.status = PromotionStatus::Rejected;
        guard.processed_at = Some(Utc::now());
        guard.processed_by = Some(rejector.clone());
        guard.result_message = Some(format!("Rejected: {}", reason));

        tracing::info!(request_id, %rejector, %reason, "promotion request rejected");
        Ok(guard.clone())
    }

    /// Perform a rank change immediately, bypassing the approval workflow.
    /// No record is stored; the caller gets the raw outcome.
    pub async fn direct_promote(
        &self,
        input: DirectPromotion,
    ) -> Result<RankChangeOutcome, AppError> {
        let target_user_id = require("target_user_id", input.target_user_id)?;
        let target_rank_id = require("target_rank_id", input.target_rank_id)?;
        let requester_user_id = require("requester_user_id", input.requester_user_id)?;

        let outcome = self
            .authority
            .apply_rank(target_user_id, self.group_id, target_rank_id)
            .await;

        tracing::info!(
            target_user_id,
            target_rank_id,
            requester_user_id,
            succeeded = outcome.succeeded,
            "direct promotion attempted"
        );
        Ok(outcome)
    }
}

fn map_claim_err(e: StoreError) -> AppError {
    match e {
        StoreError::NotFound => AppError::RequestNotFound,
        other => AppError::Internal(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::models::promotion::UserProfile;

    /// Stub authority: a fixed user directory and a scripted rank-change
    /// outcome, counting mutating calls.
    struct StubAuthority {
        users: HashMap<u64, &'static str>,
        apply_succeeds: bool,
        apply_message: &'static str,
        apply_delay: Duration,
        apply_calls: AtomicUsize,
    }

    impl StubAuthority {
        fn new(apply_succeeds: bool) -> Self {
            let mut users = HashMap::new();
            users.insert(100, "builderman");
            users.insert(1, "mod_alice");
            Self {
                users,
                apply_succeeds,
                apply_message: if apply_succeeds {
                    "user rank changed successfully"
                } else {
                    "rank change rejected: 403 - Forbidden"
                },
                apply_delay: Duration::ZERO,
                apply_calls: AtomicUsize::new(0),
            }
        }

        fn apply_count(&self) -> usize {
            self.apply_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthorityClient for StubAuthority {
        async fn fetch_user(&self, user_id: u64) -> Result<Option<UserProfile>, AppError> {
            Ok(self.users.get(&user_id).map(|name| UserProfile {
                id: user_id,
                name: name.to_string(),
            }))
        }

        async fn fetch_rank(&self, _user_id: u64, _group_id: u64) -> u64 {
            0
        }

        async fn obtain_token(&self) -> Option<String> {
            Some("stub-token".into())
        }

        async fn apply_rank(
            &self,
            _user_id: u64,
            _group_id: u64,
            _rank_id: u64,
        ) -> RankChangeOutcome {
            self.apply_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.apply_delay).await;
            if self.apply_succeeds {
                RankChangeOutcome::success(self.apply_message)
            } else {
                RankChangeOutcome::failure(self.apply_message)
            }
        }
    }

    fn workflow_with(authority: Arc<StubAuthority>) -> PromotionWorkflow {
        PromotionWorkflow::new(RequestStore::new(), authority, 9000)
    }

    fn submission() -> SubmitPromotion {
        SubmitPromotion {
            target_user_id: Some(100),
            target_rank_id: Some(5),
            requester_user_id: Some(1),
            event: Some("promo".into()),
        }
    }

    #[tokio::test]
    async fn submit_creates_pending_request_with_resolved_usernames() {
        let wf = workflow_with(Arc::new(StubAuthority::new(true)));
        let req = wf.submit(submission()).await.unwrap();

        assert!(!req.id.is_empty());
        assert_eq!(req.status, PromotionStatus::Pending);
        assert_eq!(req.target_username, "builderman");
        assert_eq!(req.requester_username, "mod_alice");
        assert!(req.processed_at.is_none());
        assert!(req.processed_by.is_none());

        let pending = wf.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, req.id);
    }

    #[tokio::test]
    async fn submit_missing_field_names_it_and_leaves_store_unchanged() {
        let wf = workflow_with(Arc::new(StubAuthority::new(true)));

        let mut input = submission();
        input.target_rank_id = None;
        let err = wf.submit(input).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation {
                field: "target_rank_id"
            }
        ));
        assert!(wf.pending().await.is_empty());
    }

    #[tokio::test]
    async fn submit_unresolvable_user_creates_nothing() {
        let wf = workflow_with(Arc::new(StubAuthority::new(true)));

        let mut input = submission();
        input.target_user_id = Some(999);
        let err = wf.submit(input).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound { user_id: 999 }));
        assert!(wf.pending().await.is_empty());
    }

    #[tokio::test]
    async fn rapid_same_pair_submissions_get_distinct_ids() {
        let wf = workflow_with(Arc::new(StubAuthority::new(true)));
        let a = wf.submit(submission()).await.unwrap();
        let b = wf.submit(submission()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(wf.pending().await.len(), 2);
    }

    #[tokio::test]
    async fn approve_success_transitions_to_approved() {
        let wf = workflow_with(Arc::new(StubAuthority::new(true)));
        let req = wf.submit(submission()).await.unwrap();

        let resolved = wf.approve(&req.id, Some("42".into())).await.unwrap();
        assert_eq!(resolved.status, PromotionStatus::Approved);
        assert_eq!(resolved.processed_by.as_deref(), Some("42"));
        assert!(resolved.processed_at.is_some());
        assert_eq!(
            resolved.result_message.as_deref(),
            Some("user rank changed successfully")
        );
        assert!(wf.pending().await.is_empty());
    }

    #[tokio::test]
    async fn approve_upstream_failure_transitions_to_failed() {
        let wf = workflow_with(Arc::new(StubAuthority::new(false)));
        let req = wf.submit(submission()).await.unwrap();

        let resolved = wf.approve(&req.id, None).await.unwrap();
        assert_eq!(resolved.status, PromotionStatus::Failed);
        assert_eq!(resolved.processed_by.as_deref(), Some("system"));
        assert!(resolved
            .result_message
            .as_deref()
            .unwrap()
            .contains("403"));
    }

    #[tokio::test]
    async fn reject_never_calls_the_authority() {
        let authority = Arc::new(StubAuthority::new(false));
        let wf = workflow_with(authority.clone());
        let req = wf.submit(submission()).await.unwrap();

        let resolved = wf
            .reject(&req.id, Some("7".into()), Some("not earned yet".into()))
            .await
            .unwrap();
        assert_eq!(resolved.status, PromotionStatus::Rejected);
        assert_eq!(resolved.processed_by.as_deref(), Some("7"));
        assert_eq!(
            resolved.result_message.as_deref(),
            Some("Rejected: not earned yet")
        );
        assert_eq!(authority.apply_count(), 0);
    }

    #[tokio::test]
    async fn second_resolution_is_already_processed_and_record_is_unchanged() {
        let wf = workflow_with(Arc::new(StubAuthority::new(true)));
        let req = wf.submit(submission()).await.unwrap();

        let approved = wf.approve(&req.id, Some("42".into())).await.unwrap();

        let err = wf.reject(&req.id, None, None).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::AlreadyProcessed {
                status: PromotionStatus::Approved
            }
        ));
        let err = wf.approve(&req.id, Some("43".into())).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyProcessed { .. }));

        let stored = wf.request(&req.id).await.unwrap();
        assert_eq!(stored.processed_by, approved.processed_by);
        assert_eq!(stored.processed_at, approved.processed_at);
    }

    #[tokio::test]
    async fn resolving_unknown_id_is_not_found() {
        let wf = workflow_with(Arc::new(StubAuthority::new(true)));
        assert!(matches!(
            wf.approve("nope", None).await.unwrap_err(),
            AppError::RequestNotFound
        ));
        assert!(matches!(
            wf.reject("nope", None, None).await.unwrap_err(),
            AppError::RequestNotFound
        ));
    }

    #[tokio::test]
    async fn concurrent_resolutions_of_one_request_have_exactly_one_winner() {
        let mut authority = StubAuthority::new(true);
        // Long enough that the loser is queued while the winner is mid-call.
        authority.apply_delay = Duration::from_millis(50);
        let authority = Arc::new(authority);

        let wf = Arc::new(PromotionWorkflow::new(
            RequestStore::new(),
            authority.clone(),
            9000,
        ));
        let req = wf.submit(submission()).await.unwrap();

        let wf1 = wf.clone();
        let wf2 = wf.clone();
        let id1 = req.id.clone();
        let id2 = req.id.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { wf1.approve(&id1, Some("42".into())).await }),
            tokio::spawn(async move { wf2.reject(&id2, Some("7".into()), None).await }),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(
            a.is_ok() as u8 + b.is_ok() as u8,
            1,
            "exactly one resolution must win"
        );
        let loser_err = if a.is_err() {
            a.unwrap_err()
        } else {
            b.unwrap_err()
        };
        assert!(matches!(loser_err, AppError::AlreadyProcessed { .. }));

        // The mutating call ran at most once (zero if reject won the race).
        assert!(authority.apply_count() <= 1);
        let stored = wf.request(&req.id).await.unwrap();
        assert_ne!(stored.status, PromotionStatus::Pending);
    }

    #[tokio::test]
    async fn direct_promote_validates_but_stores_nothing() {
        let authority = Arc::new(StubAuthority::new(true));
        let wf = workflow_with(authority.clone());

        let missing = wf
            .direct_promote(DirectPromotion {
                target_user_id: Some(100),
                target_rank_id: None,
                requester_user_id: Some(1),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            missing,
            AppError::Validation {
                field: "target_rank_id"
            }
        ));
        assert_eq!(authority.apply_count(), 0);

        let outcome = wf
            .direct_promote(DirectPromotion {
                target_user_id: Some(100),
                target_rank_id: Some(5),
                requester_user_id: Some(1),
            })
            .await
            .unwrap();
        assert!(outcome.succeeded);
        assert_eq!(authority.apply_count(), 1);
        assert!(wf.pending().await.is_empty());
    }
}
