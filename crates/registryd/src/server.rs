//! HTTP surface for the agent registry.
//!
//! Every catalog read goes through the access filter before anything else
//! looks at it. Discovery handlers hand the filtered snapshot to the skill
//! matcher; semantic discovery re-filters whatever the search service returns.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use registry_core::access::{can_modify, can_view, retain_visible};
use registry_core::discovery::{self, SkillQuery};
use registry_core::paths::normalize_path;
use registry_core::{AgentDescriptor, HealthResult, Principal, Skill, TrustLevel, Visibility};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::health::HealthProbe;
use crate::principal::{check_auth, principal_from_headers};
use crate::search::{self, VectorSearch};
use crate::storage::Storage;

/// Shared state for HTTP handlers.
pub struct AppState {
    pub storage: Arc<Storage>,
    pub search: Arc<dyn VectorSearch>,
    pub probe: HealthProbe,
    pub auth_token: Option<String>,
    pub default_max_results: u32,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("probe", &self.probe)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("default_max_results", &self.default_max_results)
            .finish_non_exhaustive()
    }
}

type HandlerResult<T> = Result<T, RegistryError>;

/// Create the HTTP router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/agents", get(list_agents))
        .route("/agents/register", post(register_agent))
        .route("/agents/discover", post(discover_agents))
        .route("/agents/discover/semantic", post(discover_agents_semantic))
        // Wildcard paths cannot carry a suffix segment, so POST dispatches
        // `/toggle` and `/health` itself.
        .route(
            "/agents/{*path}",
            get(get_agent)
                .put(update_agent)
                .delete(delete_agent)
                .post(agent_action),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn start_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Bearer check followed by identity extraction.
fn authorize(state: &AppState, headers: &HeaderMap) -> HandlerResult<Principal> {
    check_auth(state.auth_token.as_deref(), headers)?;
    principal_from_headers(headers)
}

/// Load a descriptor the caller may see. Unknown is 404, invisible is 403.
async fn load_visible(
    state: &AppState,
    path: &str,
    principal: &Principal,
) -> HandlerResult<AgentDescriptor> {
    let agent = state
        .storage
        .get(path)
        .await?
        .ok_or_else(|| RegistryError::NotFound(path.to_string()))?;

    if !can_view(&agent, principal) {
        warn!(user = %principal.username, "view denied");
        return Err(RegistryError::Forbidden);
    }
    Ok(agent)
}

/// Load a descriptor the caller may change.
async fn load_modifiable(
    state: &AppState,
    path: &str,
    principal: &Principal,
) -> HandlerResult<AgentDescriptor> {
    let agent = state
        .storage
        .get(path)
        .await?
        .ok_or_else(|| RegistryError::NotFound(path.to_string()))?;

    if !can_modify(&agent, principal) {
        warn!(user = %principal.username, "modify denied");
        return Err(RegistryError::Forbidden);
    }
    Ok(agent)
}

// --- Request/Response types ---

/// Query parameters for GET /agents.
#[derive(Debug, Default, Deserialize)]
pub struct ListAgentsQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub enabled_only: bool,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListAgentsResponse {
    pub agents: Vec<AgentDescriptor>,
    pub total: usize,
}

/// Payload for POST /agents/register and PUT /agents/{path}.
#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    #[serde(default)]
    pub path: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub allowed_groups: Vec<String>,
    #[serde(default)]
    pub trust_level: Option<TrustLevel>,
}

impl AgentRequest {
    /// Reject payloads that no descriptor could be built from.
    fn validate(&self) -> HandlerResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::BadRequest("name is required".to_string()));
        }
        if self.url.trim().is_empty() {
            return Err(RegistryError::BadRequest("url is required".to_string()));
        }
        if self.visibility == Visibility::Unrecognized {
            return Err(RegistryError::BadRequest(
                "visibility must be public, private, or group-restricted".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(skill) = self.skills.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(RegistryError::BadRequest(format!(
                "duplicate skill id: {}",
                skill.id
            )));
        }
        Ok(())
    }

    fn into_descriptor(self, path: String, owner: &Principal) -> AgentDescriptor {
        // Only admins vouch for trust.
        let trust_level = if owner.is_admin {
            self.trust_level.unwrap_or_default()
        } else {
            TrustLevel::default()
        };

        AgentDescriptor {
            path,
            name: self.name.trim().to_string(),
            description: self.description,
            url: self.url.trim().to_string(),
            skills: self.skills,
            tags: self.tags,
            visibility: self.visibility,
            owner: owner.username.clone(),
            allowed_groups: self.allowed_groups,
            trust_level,
            num_stars: 0,
            enabled: true,
            registered_at: Utc::now(),
        }
    }
}

/// Query parameters for POST /agents/{path}/toggle.
#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Payload for POST /agents/discover.
#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DiscoveredAgent<'a> {
    #[serde(flatten)]
    pub agent: &'a AgentDescriptor,
    pub relevance_score: f64,
    pub matched_skills: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse<'a> {
    pub query: SkillQuery,
    pub agents: Vec<DiscoveredAgent<'a>>,
    pub total: usize,
}

/// Payload for POST /agents/discover/semantic.
#[derive(Debug, Deserialize)]
pub struct SemanticDiscoverRequest {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SemanticAgent {
    #[serde(flatten)]
    pub agent: AgentDescriptor,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct SemanticDiscoverResponse {
    pub query: String,
    pub agents: Vec<SemanticAgent>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub agent_path: String,
    pub ping_url: String,
    #[serde(flatten)]
    pub result: HealthResult,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub path: String,
    pub enabled: bool,
}

// --- Handlers ---

/// GET /health - Daemon liveness.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /agents - Access-filtered catalog listing.
async fn list_agents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListAgentsQuery>,
) -> HandlerResult<impl IntoResponse> {
    let principal = authorize(&state, &headers)?;

    let visibility = params.visibility.as_deref().map(Visibility::parse);
    let needle = params
        .query
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    let agents: Vec<AgentDescriptor> = retain_visible(state.storage.get_all().await?, &principal)
        .into_iter()
        .filter(|a| !params.enabled_only || a.enabled)
        .filter(|a| visibility.map_or(true, |v| a.visibility == v))
        .filter(|a| {
            needle
                .as_deref()
                .map_or(true, |n| a.searchable_text().contains(n))
        })
        .collect();

    let total = agents.len();
    Ok(Json(ListAgentsResponse { agents, total }))
}

/// GET /agents/{path} - One descriptor.
async fn get_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_path): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    let principal = authorize(&state, &headers)?;
    let path = normalize_path(Some(&raw_path), None)?;

    let agent = load_visible(&state, &path, &principal).await?;
    Ok(Json(agent))
}

/// POST /agents/register - Register a new descriptor owned by the caller.
async fn register_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AgentRequest>,
) -> HandlerResult<impl IntoResponse> {
    let principal = authorize(&state, &headers)?;
    req.validate()?;

    let path = normalize_path(req.path.as_deref(), Some(&req.name))?;
    let agent = req.into_descriptor(path, &principal);
    state.storage.save(&agent).await?;

    info!(path = %agent.path, owner = %agent.owner, "agent registered");
    Ok((StatusCode::CREATED, Json(agent)))
}

/// PUT /agents/{path} - Replace editable fields.
async fn update_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_path): Path<String>,
    Json(req): Json<AgentRequest>,
) -> HandlerResult<impl IntoResponse> {
    let principal = authorize(&state, &headers)?;
    let path = normalize_path(Some(&raw_path), None)?;
    req.validate()?;

    let existing = load_modifiable(&state, &path, &principal).await?;
    let mut changes = req.into_descriptor(path.clone(), &principal);
    if !principal.is_admin {
        changes.trust_level = existing.trust_level;
    }

    let updated = state.storage.update(&path, &changes).await?;
    info!(path = %path, "agent updated");
    Ok(Json(updated))
}

/// DELETE /agents/{path} - Remove a descriptor.
async fn delete_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_path): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    let principal = authorize(&state, &headers)?;
    let path = normalize_path(Some(&raw_path), None)?;

    load_modifiable(&state, &path, &principal).await?;
    state.storage.remove(&path).await?;

    info!(path = %path, "agent removed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /agents/{path}/toggle and POST /agents/{path}/health.
async fn agent_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_path): Path<String>,
    Query(params): Query<ActionQuery>,
) -> HandlerResult<Response> {
    if let Some(target) = raw_path.strip_suffix("/toggle") {
        let enabled = params.enabled.ok_or_else(|| {
            RegistryError::BadRequest("enabled query parameter is required".to_string())
        })?;
        return toggle_agent(&state, &headers, target, enabled)
            .await
            .map(IntoResponse::into_response);
    }
    if let Some(target) = raw_path.strip_suffix("/health") {
        return check_agent_health(&state, &headers, target)
            .await
            .map(IntoResponse::into_response);
    }
    Err(RegistryError::NotFound(raw_path))
}

async fn toggle_agent(
    state: &AppState,
    headers: &HeaderMap,
    raw_path: &str,
    enabled: bool,
) -> HandlerResult<Json<ToggleResponse>> {
    let principal = authorize(state, headers)?;
    let path = normalize_path(Some(raw_path), None)?;

    load_modifiable(state, &path, &principal).await?;
    state.storage.toggle(&path, enabled).await?;

    info!(path = %path, enabled, "agent toggled");
    Ok(Json(ToggleResponse { path, enabled }))
}

async fn check_agent_health(
    state: &AppState,
    headers: &HeaderMap,
    raw_path: &str,
) -> HandlerResult<Json<HealthCheckResponse>> {
    let principal = authorize(state, headers)?;
    let path = normalize_path(Some(raw_path), None)?;

    let agent = load_visible(state, &path, &principal).await?;
    if !agent.enabled {
        return Err(RegistryError::Precondition(format!(
            "agent is disabled: {path}"
        )));
    }

    let result = state.probe.probe(&agent, None).await;
    Ok(Json(HealthCheckResponse {
        agent_path: agent.path.clone(),
        ping_url: HealthProbe::ping_url(&agent),
        result,
    }))
}

/// POST /agents/discover - Skill-based discovery over the visible catalog.
async fn discover_agents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DiscoverRequest>,
) -> HandlerResult<Response> {
    let principal = authorize(&state, &headers)?;

    let query = SkillQuery {
        skills: req.skills,
        tags: req.tags,
        max_results: req.max_results.unwrap_or(state.default_max_results),
    };

    let visible = retain_visible(state.storage.get_all().await?, &principal);
    let ranked = discovery::discover(&visible, &query)?;

    let agents: Vec<DiscoveredAgent<'_>> = ranked
        .into_iter()
        .map(|scored| DiscoveredAgent {
            agent: scored.agent,
            relevance_score: scored.relevance,
            matched_skills: scored.matched_skills,
        })
        .collect();
    let total = agents.len();

    info!(user = %principal.username, total, "skill discovery");
    Ok(Json(DiscoverResponse {
        query,
        agents,
        total,
    })
    .into_response())
}

/// POST /agents/discover/semantic - Free-text discovery via vector search.
async fn discover_agents_semantic(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SemanticDiscoverRequest>,
) -> HandlerResult<impl IntoResponse> {
    let principal = authorize(&state, &headers)?;
    let max_results = req.max_results.unwrap_or(state.default_max_results);

    let catalog = state.storage.get_all().await?;
    let matches = search::discover_semantic(
        state.search.as_ref(),
        catalog,
        &req.query,
        max_results,
        &principal,
    )
    .await?;

    let agents: Vec<SemanticAgent> = matches
        .into_iter()
        .map(|m| SemanticAgent {
            agent: m.agent,
            score: m.score,
        })
        .collect();
    let total = agents.len();

    info!(user = %principal.username, total, "semantic discovery");
    Ok(Json(SemanticDiscoverResponse {
        query: req.query,
        agents,
        total,
    }))
}
