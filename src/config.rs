use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Long-lived `.ROBLOSECURITY` session cookie. Required.
    pub roblox_cookie: String,
    /// Shared secret checked against the `X-API-Key` header.
    pub api_key: String,
    /// The Roblox group whose ranks this instance manages.
    pub group_id: u64,
    /// Comma-separated list of webhook URLs notified on decision events.
    pub webhook_urls: Vec<String>,
    /// Optional signing secret for outgoing webhooks.
    pub webhook_secret: Option<String>,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    // The session cookie is the one credential we cannot serve without:
    // every mutating group call needs it for the CSRF handshake.
    let roblox_cookie = std::env::var("RANKGATE_ROBLOX_COOKIE")
        .or_else(|_| std::env::var("ROBLOX_COOKIE"))
        .map_err(|_| {
            anyhow::anyhow!(
                "RANKGATE_ROBLOX_COOKIE is not set. \
                 Supply the .ROBLOSECURITY session cookie before starting."
            )
        })?;

    let api_key =
        std::env::var("RANKGATE_API_KEY").unwrap_or_else(|_| "CHANGE_ME_SHARED_SECRET".into());

    if api_key == "CHANGE_ME_SHARED_SECRET" {
        let env_mode = std::env::var("RANKGATE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "RANKGATE_API_KEY is still the insecure placeholder. \
                 Set a proper shared secret before running in production."
            );
        }
        eprintln!("⚠️  RANKGATE_API_KEY is not set — using insecure placeholder. Set a shared secret for production.");
    }

    Ok(Config {
        port: std::env::var("RANKGATE_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        roblox_cookie,
        api_key,
        group_id: std::env::var("RANKGATE_GROUP_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9_429_240),
        webhook_urls: std::env::var("RANKGATE_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        webhook_secret: std::env::var("RANKGATE_WEBHOOK_SECRET").ok(),
    })
}
