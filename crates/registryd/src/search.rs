//! Vector-search collaborator and semantic discovery.
//!
//! The search service ranks catalog entries by embedding similarity. Its
//! results are only identifiers and scores: every hit is re-hydrated against
//! the live catalog and passed through the access filter again before it
//! reaches the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use registry_core::access::can_view;
use registry_core::discovery::validate_max_results;
use registry_core::{AgentDescriptor, CredentialCache, Principal, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// Entity type requested from the search service for agent discovery.
pub const AGENT_ENTITY_TYPE: &str = "a2a_agent";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("semantic search is not configured")]
    Disabled,
    #[error("search request failed: {0}")]
    Transport(String),
    #[error("search request timed out")]
    Timeout,
    #[error("search service returned {0}")]
    Status(u16),
    #[error("invalid search response: {0}")]
    InvalidResponse(String),
    #[error("search authentication failed: {0}")]
    Auth(#[from] registry_core::AuthError),
}

/// One ranked hit from the search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub relevance_score: f64,
}

/// Narrow interface to the vector-search collaborator.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Returns hits ordered by the collaborator's own ranking.
    async fn search(
        &self,
        query: &str,
        entity_types: &[&str],
        enabled_only: bool,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

/// Stand-in used when no search service is configured.
#[derive(Debug, Default)]
pub struct DisabledSearch;

#[async_trait]
impl VectorSearch for DisabledSearch {
    async fn search(
        &self,
        _query: &str,
        _entity_types: &[&str],
        _enabled_only: bool,
        _max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::Disabled)
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    entity_types: &'a [&'a str],
    enabled_only: bool,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// HTTP client for `{base_url}/api/search/semantic`.
#[derive(Debug)]
pub struct HttpVectorSearch {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    credentials: Option<Arc<CredentialCache>>,
}

impl HttpVectorSearch {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/api/search/semantic", base_url.trim_end_matches('/')),
            timeout,
            credentials: None,
        }
    }

    /// Attach a bearer token from `credentials` to every request.
    pub fn with_credentials(mut self, credentials: Arc<CredentialCache>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl VectorSearch for HttpVectorSearch {
    async fn search(
        &self,
        query: &str,
        entity_types: &[&str],
        enabled_only: bool,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let body = SearchRequest {
            query,
            entity_types,
            enabled_only,
            max_results,
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(credentials) = &self.credentials {
            let token = credentials.get_token().await?;
            request = request.bearer_auth(token);
        }

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(SearchError::Transport(e.to_string())),
            Err(_) => return Err(SearchError::Timeout),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        debug!(hits = parsed.results.len(), "semantic search returned");
        Ok(parsed.results)
    }
}

/// A visible descriptor with the collaborator's score.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub agent: AgentDescriptor,
    pub score: f64,
}

/// Why a semantic discovery did not produce results.
#[derive(Debug, Error)]
pub enum SemanticError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("semantic search unavailable: {0}")]
    Unavailable(#[from] SearchError),
}

/// Run a free-text discovery through `search` and authorize the results.
///
/// `catalog` is the live snapshot used for re-hydration. Hits whose path is
/// no longer in the catalog, that are disabled there, or that `principal` may
/// not see are dropped; the rest keep the collaborator's order.
pub async fn discover_semantic(
    search: &dyn VectorSearch,
    catalog: Vec<AgentDescriptor>,
    query: &str,
    max_results: u32,
    principal: &Principal,
) -> Result<Vec<SemanticMatch>, SemanticError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ValidationError::BlankQuery.into());
    }
    let limit = validate_max_results(max_results)?;

    let hits = search
        .search(query, &[AGENT_ENTITY_TYPE], true, limit)
        .await
        .inspect_err(|e| error!(error = %e, "semantic search failed"))?;

    let mut by_path: HashMap<String, AgentDescriptor> = catalog
        .into_iter()
        .map(|agent| (agent.path.clone(), agent))
        .collect();

    let matches: Vec<SemanticMatch> = hits
        .into_iter()
        .filter_map(|hit| {
            // The index may lag behind toggles made through this registry.
            let agent = by_path.remove(&hit.path).filter(|agent| agent.enabled)?;
            can_view(&agent, principal).then_some(SemanticMatch {
                agent,
                score: hit.relevance_score,
            })
        })
        .take(limit)
        .collect();

    Ok(matches)
}
