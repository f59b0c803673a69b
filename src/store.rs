use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::promotion::{PromotionRequest, PromotionStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request id already exists: {0}")]
    DuplicateId(String),

    #[error("request not found")]
    NotFound,
}

/// In-memory keyed store of promotion requests. Process-lifetime only:
/// state is lost on restart, which is an accepted limitation.
///
/// Each record sits behind its own async mutex. [`RequestStore::claim`]
/// hands out an owned guard, so a resolution can hold exclusive access to
/// one request across the external rank-change call while operations on
/// other requests proceed untouched.
pub struct RequestStore {
    entries: DashMap<String, Arc<Mutex<PromotionRequest>>>,
    /// Ids in insertion order, for stable status listings.
    order: std::sync::Mutex<Vec<String>>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            order: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Insert a new request. Duplicate ids are rejected, never overwritten.
    pub fn insert(&self, request: PromotionRequest) -> Result<(), StoreError> {
        let id = request.id.clone();
        match self.entries.entry(id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(request)));
                self.order
                    .lock()
                    .expect("order lock poisoned")
                    .push(id);
                Ok(())
            }
        }
    }

    /// Snapshot a single request by id.
    pub async fn get(&self, id: &str) -> Option<PromotionRequest> {
        let entry = self.entries.get(id).map(|e| e.value().clone())?;
        let guard = entry.lock().await;
        Some(guard.clone())
    }

    /// Snapshot every request currently in `status`, in submission order.
    pub async fn list_by_status(&self, status: PromotionStatus) -> Vec<PromotionRequest> {
        let ids = self
            .order
            .lock()
            .expect("order lock poisoned")
            .clone();

        let mut out = Vec::new();
        for id in ids {
            let entry = match self.entries.get(&id) {
                Some(e) => e.value().clone(),
                None => continue,
            };
            let guard = entry.lock().await;
            if guard.status == status {
                out.push(guard.clone());
            }
        }
        out
    }

    /// Take exclusive ownership of one request for update.
    ///
    /// Concurrent claims on the same id queue up behind the guard; the loser
    /// of a resolution race re-observes the record only after the winner has
    /// written its terminal status.
    pub async fn claim(
        &self,
        id: &str,
    ) -> Result<OwnedMutexGuard<PromotionRequest>, StoreError> {
        let entry = self
            .entries
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound)?;
        Ok(entry.lock_owned().await)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(id: &str, status: PromotionStatus) -> PromotionRequest {
        PromotionRequest {
            id: id.to_string(),
            target_user_id: 100,
            target_username: "builderman".into(),
            target_rank_id: 5,
            requester_user_id: 1,
            requester_username: "mod_alice".into(),
            event: "promo".into(),
            status,
            created_at: Utc::now(),
            processed_at: None,
            processed_by: None,
            result_message: None,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = RequestStore::new();
        store
            .insert(request("a", PromotionStatus::Pending))
            .unwrap();

        let got = store.get("a").await.unwrap();
        assert_eq!(got.id, "a");
        assert_eq!(got.status, PromotionStatus::Pending);
        assert!(store.get("b").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_not_overwritten() {
        let store = RequestStore::new();
        store
            .insert(request("a", PromotionStatus::Pending))
            .unwrap();

        let mut dup = request("a", PromotionStatus::Pending);
        dup.target_username = "impostor".into();
        let err = store.insert(dup).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(ref id) if id == "a"));

        // Original record survives intact.
        assert_eq!(store.get("a").await.unwrap().target_username, "builderman");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn list_by_status_preserves_insertion_order() {
        let store = RequestStore::new();
        store
            .insert(request("first", PromotionStatus::Pending))
            .unwrap();
        store
            .insert(request("second", PromotionStatus::Rejected))
            .unwrap();
        store
            .insert(request("third", PromotionStatus::Pending))
            .unwrap();

        let pending = store.list_by_status(PromotionStatus::Pending).await;
        let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "third"]);
    }

    #[tokio::test]
    async fn claim_unknown_id_is_not_found() {
        let store = RequestStore::new();
        assert!(matches!(
            store.claim("missing").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn claim_serializes_updates_per_id() {
        let store = Arc::new(RequestStore::new());
        store
            .insert(request("a", PromotionStatus::Pending))
            .unwrap();

        let mut guard = store.claim("a").await.unwrap();

        // A second claim must wait until the first guard is released.
        let store2 = store.clone();
        let waiter = tokio::spawn(async move {
            let guard = store2.claim("a").await.unwrap();
            guard.status
        });

        tokio::task::yield_now().await;
        guard.status = PromotionStatus::Approved;
        drop(guard);

        assert_eq!(waiter.await.unwrap(), PromotionStatus::Approved);
    }
}
