//! Bearer credential cache for the remote drive API.
//!
//! Tokens come from an OAuth2 client-credentials exchange. The most recent
//! token is kept together with its expiry and reused until it is within
//! [`REFRESH_MARGIN`] of expiring. Refreshes are serialized behind an async
//! mutex so concurrent requests do not hit the identity endpoint twice.

use super::object_storage::{StorageError, StorageResult};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Reacquire when the cached token expires within this window.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

/// Client-credentials identity used to obtain bearer tokens.
#[derive(Clone)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

pub struct AccessTokenCache {
    http: reqwest::Client,
    token_url: String,
    credentials: ClientCredentials,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenCache {
    /// `login_base_url` is the identity host, e.g. `https://login.microsoftonline.com`.
    pub fn new(http: reqwest::Client, login_base_url: &str, credentials: ClientCredentials) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            login_base_url.trim_end_matches('/'),
            credentials.tenant_id
        );
        Self {
            http,
            token_url,
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Return a bearer token, exchanging credentials when none is cached or
    /// the cached one is about to expire.
    pub async fn get_access_token(&self) -> StorageResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self) -> StorageResult<CachedToken> {
        debug!(url = %self.token_url, "requesting access token");
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let issued_at = Instant::now();
        let resp = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| StorageError::Credentials(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Credentials(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| StorageError::Credentials(format!("decoding token response: {}", e)))?;

        Ok(CachedToken {
            value: token.access_token,
            expires_at: issued_at + Duration::from_secs(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Form, Json, Router, extract::State, http::StatusCode, routing::post};
    use std::collections::HashMap;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Clone)]
    struct MockIdentity {
        calls: Arc<AtomicUsize>,
        expires_in: u64,
        fail: bool,
    }

    async fn issue(
        State(state): State<MockIdentity>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if state.fail || form.get("grant_type").map(String::as_str) != Some("client_credentials")
        {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let n = state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Json(serde_json::json!({
            "access_token": format!("token-{n}"),
            "expires_in": state.expires_in,
        })))
    }

    async fn start_identity(expires_in: u64, fail: bool) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = MockIdentity {
            calls: calls.clone(),
            expires_in,
            fail,
        };
        let app = Router::new()
            .route("/{tenant}/oauth2/v2.0/token", post(issue))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), calls)
    }

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            tenant_id: "tenant".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
        }
    }

    #[tokio::test]
    async fn long_lived_token_is_reused() {
        let (base, calls) = start_identity(3600, false).await;
        let cache = AccessTokenCache::new(reqwest::Client::new(), &base, credentials());

        assert_eq!(cache.get_access_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_access_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_inside_refresh_margin_is_replaced() {
        let (base, calls) = start_identity(30, false).await;
        let cache = AccessTokenCache::new(reqwest::Client::new(), &base, credentials());

        assert_eq!(cache.get_access_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_access_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_exchange_is_a_credentials_error() {
        let (base, _) = start_identity(3600, true).await;
        let cache = AccessTokenCache::new(reqwest::Client::new(), &base, credentials());

        let err = cache.get_access_token().await.unwrap_err();
        assert!(matches!(err, StorageError::Credentials(_)));
    }

    #[test]
    fn freshness_respects_margin() {
        let now = Instant::now();
        let token = CachedToken {
            value: "v".into(),
            expires_at: now + Duration::from_secs(61),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::from_secs(1)));
    }
}
