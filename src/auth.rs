//! Upstream credential resolution for the zai adapter.
//!
//! The configured bearer token identifies a browser-session account; the
//! upstream additionally wants the account's user id on every signed request.
//! The id is fetched once from `/api/v1/auths/` and cached per token with a
//! TTL. Lock discipline: many readers, rare writers, no lock held across an
//! await point.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::AppConfig;
use crate::error::GatewayError;

const USER_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Resolved upstream identity used to build and sign requests.
#[derive(Debug, Clone)]
pub struct UpstreamUser {
    pub id: String,
    pub token: String,
}

struct CachedUser {
    user: UpstreamUser,
    cached_at: Instant,
}

/// Per-token cache of upstream identities.
pub struct UserCache {
    cache: RwLock<FxHashMap<String, CachedUser>>,
}

impl UserCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Resolve the upstream user for the configured token, consulting the
    /// cache first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] when no token is configured or the
    /// upstream rejects it, [`GatewayError::Transport`] on connection failure.
    pub async fn get_user(
        &self,
        http: &reqwest::Client,
        config: &AppConfig,
    ) -> Result<UpstreamUser, GatewayError> {
        let token = config.upstream.token.as_str();
        if token.is_empty() {
            return Err(GatewayError::Auth("authentication token required".into()));
        }

        if let Some(user) = self.lookup_fresh(token) {
            return Ok(user);
        }

        let url = format!("{}/api/v1/auths/", config.upstream.origin());
        let mut request = http.get(&url).bearer_auth(token);
        for (name, value) in config.upstream_headers() {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::Transport(format!("fetch user info: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Auth(format!(
                "auth API returned status {status}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| GatewayError::Auth(format!("decode auth response: {err}")))?;

        let user_id = body
            .get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let user_name = body
            .get("name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let user = UpstreamUser {
            id: user_id.clone(),
            token: token.to_string(),
        };

        if !user_id.is_empty() {
            self.store(token, user.clone());
            tracing::info!(user_id = %user_id, name = %user_name, "user authenticated");
        }

        Ok(user)
    }

    fn lookup_fresh(&self, token: &str) -> Option<UpstreamUser> {
        let cache = self.cache.read();
        let cached = cache.get(token)?;
        if cached.cached_at.elapsed() < USER_CACHE_TTL {
            Some(cached.user.clone())
        } else {
            None
        }
    }

    fn store(&self, token: &str, user: UpstreamUser) {
        self.cache.write().insert(
            token.to_string(),
            CachedUser {
                user,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every cached identity.
    pub fn clear(&self) {
        self.cache.write().clear();
    }
}

impl Default for UserCache {
    fn default() -> Self {
        Self::new()
    }
}
