//! RankGate — promotion approval gateway for Roblox groups.
//!
//! Library crate so integration tests in `tests/` can build the router and
//! workflow against stubbed authority clients.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod notification;
pub mod roblox;
pub mod store;
pub mod workflow;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub workflow: workflow::PromotionWorkflow,
    pub notifier: notification::webhook::WebhookNotifier,
    pub config: config::Config,
}

impl AppState {
    pub fn new(
        config: config::Config,
        authority: Arc<dyn roblox::AuthorityClient>,
    ) -> Arc<Self> {
        let workflow = workflow::PromotionWorkflow::new(
            store::RequestStore::new(),
            authority,
            config.group_id,
        );
        Arc::new(Self {
            workflow,
            notifier: notification::webhook::WebhookNotifier::new(),
            config,
        })
    }
}
