//! Service-to-service credentials from the identity provider.
//!
//! `CredentialCache` performs the OAuth2 client-credentials exchange against
//! `{issuer}/realms/{realm}/protocol/openid-connect/token` and reuses the
//! token until 60 seconds before it expires. The cache is guarded by an async
//! mutex held across the exchange, so concurrent callers on a miss wait for
//! the single in-flight request and reuse its token.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Tokens are treated as expired this long before their real expiry.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 300;

/// Longer advertised lifetimes are capped to this.
const MAX_EXPIRES_IN_SECS: u64 = 86_400;

/// Upper bound for one exchange round trip.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity provider unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },
    #[error("identity provider at {url} rejected token request: HTTP {status}")]
    Rejected { url: String, status: u16 },
    #[error("invalid token response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

/// Client-credentials settings for one identity-provider realm.
#[derive(Clone)]
pub struct ClientCredentials {
    pub issuer_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    /// Token endpoint for the configured realm.
    pub fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.issuer_url.trim_end_matches('/'),
            self.realm
        )
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("issuer_url", &self.issuer_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// A cached bearer token. Never leaves this module.
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - TimeDelta::seconds(TOKEN_SAFETY_MARGIN_SECS)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Shared, single-flight token cache.
pub struct CredentialCache {
    http: reqwest::Client,
    credentials: ClientCredentials,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
    exchanges: AtomicUsize,
}

impl CredentialCache {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self::with_client(credentials, reqwest::Client::new())
    }

    /// Build with a caller-supplied HTTP client (shared connection pool).
    pub fn with_client(credentials: ClientCredentials, http: reqwest::Client) -> Self {
        let token_url = credentials.token_url();
        Self {
            http,
            credentials,
            token_url,
            cached: Mutex::new(None),
            exchanges: AtomicUsize::new(0),
        }
    }

    /// Return a valid bearer token, exchanging credentials only on a miss.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            debug!("using cached token");
            return Ok(token.value.clone());
        }

        let token = self.exchange().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call performs a fresh exchange.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Number of upstream exchanges performed so far.
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::Relaxed)
    }

    async fn exchange(&self) -> Result<CachedToken, AuthError> {
        debug!(url = %self.token_url, "requesting new token");
        self.exchanges.fetch_add(1, Ordering::Relaxed);

        let requested_at = Utc::now();
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .timeout(EXCHANGE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.token_url, error = %e, "network error getting token");
                AuthError::Unreachable {
                    url: self.token_url.clone(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(url = %self.token_url, status = status.as_u16(), "token request failed");
            return Err(AuthError::Rejected {
                url: self.token_url.clone(),
                status: status.as_u16(),
            });
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| AuthError::InvalidResponse {
                    url: self.token_url.clone(),
                    message: e.to_string(),
                })?;

        let expires_in = body
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .min(MAX_EXPIRES_IN_SECS);
        info!(expires_in, "token acquired");

        Ok(CachedToken {
            value: body.access_token,
            expires_at: requested_at + TimeDelta::seconds(expires_in as i64),
        })
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("credentials", &self.credentials)
            .field("token_url", &self.token_url)
            .field("exchanges", &self.exchange_count())
            .finish_non_exhaustive()
    }
}
