use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::promotion::{RankChangeOutcome, UserProfile};
use crate::roblox::AuthorityClient;

/// Base URLs for the three Roblox API hosts. Injectable so tests can point
/// the client at a local mock server.
#[derive(Debug, Clone)]
pub struct ApiBases {
    pub users: String,
    pub groups: String,
    pub auth: String,
}

impl Default for ApiBases {
    fn default() -> Self {
        Self {
            users: "https://users.roblox.com".into(),
            groups: "https://groups.roblox.com".into(),
            auth: "https://auth.roblox.com".into(),
        }
    }
}

pub struct RobloxClient {
    http: reqwest::Client,
    cookie: String,
    bases: ApiBases,
}

impl RobloxClient {
    pub fn new(cookie: impl Into<String>) -> Self {
        Self::with_bases(cookie, ApiBases::default())
    }

    pub fn with_bases(cookie: impl Into<String>, bases: ApiBases) -> Self {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            cookie: cookie.into(),
            bases,
        }
    }

    fn session_cookie(&self) -> String {
        format!(".ROBLOSECURITY={}", self.cookie)
    }
}

// Response shapes for the group-roles listing.
#[derive(Deserialize)]
struct GroupRolesResponse {
    data: Vec<GroupMembership>,
}

#[derive(Deserialize)]
struct GroupMembership {
    group: GroupRef,
    role: RoleRef,
}

#[derive(Deserialize)]
struct GroupRef {
    id: u64,
}

#[derive(Deserialize)]
struct RoleRef {
    rank: u64,
}

#[async_trait]
impl AuthorityClient for RobloxClient {
    async fn fetch_user(&self, user_id: u64) -> Result<Option<UserProfile>, AppError> {
        let url = format!("{}/v1/users/{}", self.bases.users, user_id);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("user lookup failed: {}", e)))?;

        match resp.status() {
            StatusCode::OK => {
                let profile = resp
                    .json::<UserProfile>()
                    .await
                    .map_err(|e| AppError::Upstream(format!("user lookup returned bad body: {}", e)))?;
                Ok(Some(profile))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(AppError::Upstream(format!(
                    "user lookup returned {}: {}",
                    status.as_u16(),
                    body
                )))
            }
        }
    }

    async fn fetch_rank(&self, user_id: u64, group_id: u64) -> u64 {
        let url = format!("{}/v2/users/{}/groups/roles", self.bases.groups, user_id);
        let resp = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(user_id, group_id, "rank lookup failed: {}", e);
                return 0;
            }
        };

        if resp.status() != StatusCode::OK {
            tracing::warn!(user_id, group_id, status = %resp.status(), "rank lookup non-OK");
            return 0;
        }

        match resp.json::<GroupRolesResponse>().await {
            Ok(roles) => roles
                .data
                .into_iter()
                .find(|m| m.group.id == group_id)
                .map(|m| m.role.rank)
                .unwrap_or(0),
            Err(e) => {
                tracing::warn!(user_id, group_id, "rank lookup returned bad body: {}", e);
                0
            }
        }
    }

    async fn obtain_token(&self) -> Option<String> {
        // The logout endpoint rejects the call (403) but issues a fresh
        // anti-forgery token in its response headers either way.
        let url = format!("{}/v2/logout", self.bases.auth);
        match self
            .http
            .post(&url)
            .header(header::COOKIE, self.session_cookie())
            .send()
            .await
        {
            Ok(resp) => resp
                .headers()
                .get("x-csrf-token")
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            Err(e) => {
                tracing::error!("failed to obtain CSRF token: {}", e);
                None
            }
        }
    }

    async fn apply_rank(&self, user_id: u64, group_id: u64, rank_id: u64) -> RankChangeOutcome {
        let token = match self.obtain_token().await {
            Some(t) => t,
            None => return RankChangeOutcome::failure("failed to obtain CSRF token"),
        };

        let url = format!(
            "{}/v1/groups/{}/users/{}",
            self.bases.groups, group_id, user_id
        );
        let result = self
            .http
            .patch(&url)
            .header(header::COOKIE, self.session_cookie())
            .header("x-csrf-token", token)
            .json(&serde_json::json!({ "roleId": rank_id }))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status() == StatusCode::OK => {
                RankChangeOutcome::success("user rank changed successfully")
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                RankChangeOutcome::failure(format!(
                    "rank change rejected: {} - {}",
                    status.as_u16(),
                    body
                ))
            }
            Err(e) => RankChangeOutcome::failure(format!("rank change request failed: {}", e)),
        }
    }
}
