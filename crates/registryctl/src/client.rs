//! HTTP client for the registry daemon.

use std::sync::Arc;

use registry_core::{AgentDescriptor, AuthError, CredentialCache, HealthResult};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("registry not reachable at {addr}\n  → start with: registryd\n  → or set REGISTRY_ADDR if using a different address")]
    ConnectionFailed { addr: String },

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("access denied")]
    Forbidden,

    #[error("unauthorized: check --user and REGISTRY_TOKEN or the identity provider settings")]
    Unauthorized,

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            let addr = e
                .url()
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            ClientError::ConnectionFailed { addr }
        } else if e.is_decode() {
            ClientError::InvalidResponse(e.to_string())
        } else {
            ClientError::HttpError {
                status: e.status().map_or(0, |s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }
}

/// How requests are authenticated to the daemon.
#[derive(Clone, Default)]
pub enum Credentials {
    #[default]
    None,
    /// Shared daemon token.
    Static(String),
    /// Client-credentials token from the identity provider.
    Provider(Arc<CredentialCache>),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Static(_) => f.write_str("Static(<redacted>)"),
            Self::Provider(cache) => f.debug_tuple("Provider").field(cache).finish(),
        }
    }
}

/// Caller identity forwarded as proxy headers.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user: String,
    pub groups: Vec<String>,
    /// Paths sent as X-Accessible-Agents. Empty sends nothing, which the
    /// daemon reads as no access.
    pub accessible_agents: Vec<String>,
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
pub struct ListAgentsResponse {
    pub agents: Vec<AgentDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverRequest<'a> {
    pub skills: &'a [String],
    pub tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DiscoveredAgent {
    #[serde(flatten)]
    pub agent: AgentDescriptor,
    pub relevance_score: f64,
    #[serde(default)]
    pub matched_skills: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverResponse {
    pub agents: Vec<DiscoveredAgent>,
}

#[derive(Debug, Serialize)]
pub struct SemanticRequest<'a> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SemanticAgent {
    #[serde(flatten)]
    pub agent: AgentDescriptor,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct SemanticResponse {
    pub agents: Vec<SemanticAgent>,
}

#[derive(Debug, Deserialize)]
pub struct HealthReport {
    pub agent_path: String,
    pub ping_url: String,
    #[serde(flatten)]
    pub result: HealthResult,
}

/// Error response from API.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP client for registryd.
#[derive(Debug)]
pub struct Client {
    base_url: String,
    identity: Identity,
    credentials: Credentials,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str, identity: Identity, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
            credentials,
            http: reqwest::Client::new(),
        }
    }

    /// Returns the daemon address (for error messages).
    pub fn addr(&self) -> &str {
        &self.base_url
    }

    /// URL for a catalog path plus an optional action suffix.
    fn agent_url(&self, path: &str, action: Option<&str>) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        let mut url = format!("{}/agents/{}", self.base_url, encoded.join("/"));
        if let Some(action) = action {
            url.push('/');
            url.push_str(action);
        }
        url
    }

    async fn headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();

        let token = match &self.credentials {
            Credentials::None => None,
            Credentials::Static(token) => Some(token.clone()),
            Credentials::Provider(cache) => Some(cache.get_token().await?),
        };
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::InvalidHeader("authorization"))?;
            headers.insert(AUTHORIZATION, value);
        }

        if !self.identity.user.is_empty() {
            let value = HeaderValue::from_str(&self.identity.user)
                .map_err(|_| ClientError::InvalidHeader("x-user"))?;
            headers.insert("x-user", value);
        }
        if !self.identity.groups.is_empty() {
            let value = HeaderValue::from_str(&self.identity.groups.join(","))
                .map_err(|_| ClientError::InvalidHeader("x-groups"))?;
            headers.insert("x-groups", value);
        }
        if !self.identity.accessible_agents.is_empty() {
            let value = HeaderValue::from_str(&self.identity.accessible_agents.join(","))
                .map_err(|_| ClientError::InvalidHeader("x-accessible-agents"))?;
            headers.insert("x-accessible-agents", value);
        }

        Ok(headers)
    }

    async fn handle_error(&self, response: reqwest::Response, path: &str) -> ClientError {
        let status = response.status().as_u16();

        match status {
            401 => return ClientError::Unauthorized,
            403 => return ClientError::Forbidden,
            404 => return ClientError::AgentNotFound(path.to_string()),
            _ => {}
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map_or_else(|_| "unknown error".to_string(), |e| e.error);

        ClientError::HttpError { status, message }
    }

    /// Check if the daemon answers /health.
    pub async fn check_health(&self) -> Result<bool, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.http.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// List visible agents.
    /// GET /agents
    pub async fn list_agents(
        &self,
        query: Option<&str>,
        enabled_only: bool,
    ) -> Result<Vec<AgentDescriptor>, ClientError> {
        let mut url = format!("{}/agents?enabled_only={}", self.base_url, enabled_only);
        if let Some(query) = query {
            url.push_str("&query=");
            url.push_str(&urlencoding::encode(query));
        }

        let response = self.http.get(&url).headers(self.headers().await?).send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response, "").await);
        }

        let body: ListAgentsResponse = response.json().await?;
        Ok(body.agents)
    }

    /// Fetch one agent.
    /// GET /agents/{path}
    pub async fn get_agent(&self, path: &str) -> Result<AgentDescriptor, ClientError> {
        let url = self.agent_url(path, None);
        let response = self.http.get(&url).headers(self.headers().await?).send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response, path).await);
        }
        Ok(response.json().await?)
    }

    /// Probe an agent through the daemon.
    /// POST /agents/{path}/health
    pub async fn check_agent_health(&self, path: &str) -> Result<HealthReport, ClientError> {
        let url = self.agent_url(path, Some("health"));
        let response = self.http.post(&url).headers(self.headers().await?).send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response, path).await);
        }
        Ok(response.json().await?)
    }

    /// Skill-based discovery.
    /// POST /agents/discover
    pub async fn discover(
        &self,
        skills: &[String],
        tags: &[String],
        max_results: Option<u32>,
    ) -> Result<Vec<DiscoveredAgent>, ClientError> {
        let url = format!("{}/agents/discover", self.base_url);
        let body = DiscoverRequest {
            skills,
            tags,
            max_results,
        };
        let response = self
            .http
            .post(&url)
            .headers(self.headers().await?)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response, "").await);
        }

        let body: DiscoverResponse = response.json().await?;
        Ok(body.agents)
    }

    /// Free-text discovery.
    /// POST /agents/discover/semantic
    pub async fn search(
        &self,
        query: &str,
        max_results: Option<u32>,
    ) -> Result<Vec<SemanticAgent>, ClientError> {
        let url = format!("{}/agents/discover/semantic", self.base_url);
        let body = SemanticRequest { query, max_results };
        let response = self
            .http
            .post(&url)
            .headers(self.headers().await?)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response, "").await);
        }

        let body: SemanticResponse = response.json().await?;
        Ok(body.agents)
    }

    /// Enable or disable an agent.
    /// POST /agents/{path}/toggle?enabled=
    pub async fn toggle_agent(&self, path: &str, enabled: bool) -> Result<(), ClientError> {
        let url = format!("{}?enabled={}", self.agent_url(path, Some("toggle")), enabled);
        let response = self.http.post(&url).headers(self.headers().await?).send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response, path).await);
        }
        Ok(())
    }

    /// Delete an agent.
    /// DELETE /agents/{path}
    pub async fn remove_agent(&self, path: &str) -> Result<(), ClientError> {
        let url = self.agent_url(path, None);
        let response = self
            .http
            .delete(&url)
            .headers(self.headers().await?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response, path).await);
        }
        Ok(())
    }
}
