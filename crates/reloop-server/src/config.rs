use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};

use reloop_api::policy::{AuthorizationPolicy, OrderParty, UserMutation};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub media_root: PathBuf,
    pub cors_origins: Vec<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub policy: AuthorizationPolicy,
    pub blacklist_purge_secs: u64,
}

impl Config {
    /// Read `RELOOP_*` variables from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("RELOOP_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("RELOOP_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            host: or("RELOOP_HOST", "0.0.0.0"),
            port: parse(&get, "RELOOP_PORT", 8000)?,
            db_path: or("RELOOP_DB_PATH", "reloop.db").into(),
            jwt_secret,
            access_ttl_secs: parse(&get, "RELOOP_ACCESS_TTL_SECS", 300)?,
            refresh_ttl_secs: parse(&get, "RELOOP_REFRESH_TTL_SECS", 86_400)?,
            media_root: or("RELOOP_MEDIA_ROOT", "./media").into(),
            cors_origins: get("RELOOP_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            openai_api_key: get("RELOOP_OPENAI_API_KEY").filter(|k| !k.is_empty()),
            openai_base_url: or("RELOOP_OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: or("RELOOP_OPENAI_MODEL", "gpt-4o-mini"),
            policy: AuthorizationPolicy {
                order_update: parse::<OrderParty>(&get, "RELOOP_ORDER_UPDATE_BY", OrderParty::Seller)?,
                order_delete: parse::<OrderParty>(&get, "RELOOP_ORDER_DELETE_BY", OrderParty::Buyer)?,
                user_mutation: parse::<UserMutation>(&get, "RELOOP_USER_MUTATION", UserMutation::Any)?,
            },
            blacklist_purge_secs: parse(&get, "RELOOP_BLACKLIST_PURGE_SECS", 3600)?,
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
