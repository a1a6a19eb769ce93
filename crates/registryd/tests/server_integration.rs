//! Integration tests for the registry HTTP surface.
//!
//! Covers registration and management, access filtering on reads, skill and
//! semantic discovery, and agent health checks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use registryd::health::HealthProbe;
use registryd::search::{DisabledSearch, SearchError, SearchHit, VectorSearch};
use registryd::server::{create_router, AppState};
use registryd::storage::Storage;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct StaticSearch {
    hits: Vec<SearchHit>,
}

#[async_trait]
impl VectorSearch for StaticSearch {
    async fn search(
        &self,
        _query: &str,
        _entity_types: &[&str],
        _enabled_only: bool,
        _max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        Ok(self.hits.clone())
    }
}

async fn create_test_app_with(
    search: Arc<dyn VectorSearch>,
    auth_token: Option<String>,
) -> (axum::Router, Arc<AppState>, TempDir) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");
    let storage = Storage::new(&db_path).await.unwrap();
    storage.migrate_embedded().await.unwrap();

    let state = Arc::new(AppState {
        storage: Arc::new(storage),
        search,
        probe: HealthProbe::new(Duration::from_secs(2)),
        auth_token,
        default_max_results: 10,
    });

    let router = create_router(Arc::clone(&state));
    (router, state, dir)
}

async fn create_test_app() -> (axum::Router, Arc<AppState>, TempDir) {
    create_test_app_with(Arc::new(DisabledSearch), None).await
}

async fn body_to_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder
            .header("x-user", user)
            .header("x-accessible-agents", "all");
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn register(app: &axum::Router, owner: &str, body: Value) -> Value {
    let response = send(app, request("POST", "/agents/register", Some(owner), Some(&body))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_to_json(response).await
}

fn flight_agent() -> Value {
    json!({
        "name": "Flight Booking",
        "url": "http://flights.local:9000/",
        "description": "Books and cancels flights",
        "skills": [
            {"id": "book_flight", "name": "Book Flight"},
            {"id": "cancel_booking", "name": "Cancel Booking"}
        ],
        "tags": ["travel"]
    })
}

// --- Health & auth ---

#[tokio::test]
async fn health_check_returns_ok() {
    let (app, _, _dir) = create_test_app().await;

    let response = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_json(response).await["status"], "ok");
}

#[tokio::test]
async fn missing_user_header_is_unauthorized() {
    let (app, _, _dir) = create_test_app().await;

    let response = send(&app, request("GET", "/agents", None, None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn configured_token_is_enforced() {
    let (app, _, _dir) = create_test_app_with(Arc::new(DisabledSearch), Some("t0k".to_string())).await;

    let response = send(&app, request("GET", "/agents", Some("bob"), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/agents")
        .header("x-user", "bob")
        .header("x-accessible-agents", "all")
        .header("authorization", "Bearer t0k")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// --- Registration & management ---

#[tokio::test]
async fn register_derives_path_and_assigns_owner() {
    let (app, _, _dir) = create_test_app().await;

    let json = register(&app, "alice", flight_agent()).await;

    assert_eq!(json["path"], "/flight-booking");
    assert_eq!(json["owner"], "alice");
    assert_eq!(json["enabled"], true);
    assert_eq!(json["num_stars"], 0);
    assert_eq!(json["trust_level"], "unverified");
}

#[tokio::test]
async fn register_duplicate_path_conflicts() {
    let (app, _, _dir) = create_test_app().await;
    register(&app, "alice", flight_agent()).await;

    let response = send(
        &app,
        request("POST", "/agents/register", Some("bob"), Some(&flight_agent())),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_to_json(response).await["error"].is_string());
}

#[tokio::test]
async fn register_rejects_unknown_visibility() {
    let (app, _, _dir) = create_test_app().await;
    let mut body = flight_agent();
    body["visibility"] = json!("internal");

    let response = send(&app, request("POST", "/agents/register", Some("alice"), Some(&body))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_round_trips_skills_tags_and_visibility() {
    let (app, _, _dir) = create_test_app().await;
    let mut body = flight_agent();
    body["path"] = json!("flights/");
    body["visibility"] = json!("group-restricted");
    body["allowed_groups"] = json!(["travel-team"]);
    register(&app, "alice", body.clone()).await;

    let req = Request::builder()
        .uri("/agents/flights")
        .header("x-user", "alice")
        .header("x-accessible-agents", "all")
        .header("x-groups", "travel-team")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, req).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response).await;
    assert_eq!(json["path"], "/flights");
    assert_eq!(json["visibility"], "group-restricted");
    assert_eq!(json["tags"], body["tags"]);
    assert_eq!(json["skills"][0]["id"], "book_flight");
    assert_eq!(json["skills"][1]["name"], "Cancel Booking");
}

#[tokio::test]
async fn owner_outside_group_cannot_read_group_restricted_agent() {
    let (app, _, _dir) = create_test_app().await;
    let mut body = flight_agent();
    body["visibility"] = json!("group-restricted");
    body["allowed_groups"] = json!(["travel-team"]);
    register(&app, "alice", body).await;

    let response = send(&app, request("GET", "/agents/flight-booking", Some("alice"), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, request("GET", "/agents", Some("alice"), None)).await;
    assert_eq!(body_to_json(response).await["total"], 0);
}

#[tokio::test]
async fn missing_scope_header_hides_everything_from_non_admins() {
    let (app, _, _dir) = create_test_app().await;
    register(&app, "alice", flight_agent()).await;

    let req = Request::builder()
        .uri("/agents")
        .header("x-user", "bob")
        .body(Body::empty())
        .unwrap();
    let json = body_to_json(send(&app, req).await).await;
    assert_eq!(json["total"], 0);

    let req = Request::builder()
        .uri("/agents")
        .header("x-user", "root")
        .header("x-is-admin", "true")
        .body(Body::empty())
        .unwrap();
    let json = body_to_json(send(&app, req).await).await;
    assert_eq!(json["total"], 1);
}

#[tokio::test]
async fn get_unknown_is_404_and_invisible_is_403() {
    let (app, _, _dir) = create_test_app().await;
    let mut body = flight_agent();
    body["visibility"] = json!("private");
    register(&app, "alice", body).await;

    let response = send(&app, request("GET", "/agents/missing", Some("bob"), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, request("GET", "/agents/flight-booking", Some("bob"), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_to_json(response).await["error"], "access denied");
}

#[tokio::test]
async fn update_requires_owner_and_keeps_owner() {
    let (app, _, _dir) = create_test_app().await;
    register(&app, "alice", flight_agent()).await;

    let mut changes = flight_agent();
    changes["description"] = json!("Now with seat selection");

    let response = send(
        &app,
        request("PUT", "/agents/flight-booking", Some("bob"), Some(&changes)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        request("PUT", "/agents/flight-booking", Some("alice"), Some(&changes)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response).await;
    assert_eq!(json["description"], "Now with seat selection");
    assert_eq!(json["owner"], "alice");
}

#[tokio::test]
async fn toggle_and_delete_lifecycle() {
    let (app, _, _dir) = create_test_app().await;
    register(&app, "alice", flight_agent()).await;

    let response = send(
        &app,
        request("POST", "/agents/flight-booking/toggle?enabled=false", Some("alice"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_json(response).await["enabled"], false);

    let response = send(&app, request("GET", "/agents?enabled_only=true", Some("alice"), None)).await;
    assert_eq!(body_to_json(response).await["total"], 0);

    let response = send(
        &app,
        request("POST", "/agents/flight-booking/toggle", Some("alice"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, request("DELETE", "/agents/flight-booking", Some("bob"), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, request("DELETE", "/agents/flight-booking", Some("alice"), None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, request("GET", "/agents/flight-booking", Some("alice"), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Listing ---

#[tokio::test]
async fn list_applies_access_filter_and_query() {
    let (app, _, _dir) = create_test_app().await;
    register(&app, "alice", flight_agent()).await;
    register(
        &app,
        "alice",
        json!({"name": "Alice Notes", "url": "http://notes.local", "visibility": "private"}),
    )
    .await;
    register(
        &app,
        "carol",
        json!({
            "name": "Payroll",
            "url": "http://payroll.local",
            "visibility": "group-restricted",
            "allowed_groups": ["finance"]
        }),
    )
    .await;

    let response = send(&app, request("GET", "/agents", Some("bob"), None)).await;
    let json = body_to_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["agents"][0]["path"], "/flight-booking");

    let req = Request::builder()
        .uri("/agents")
        .header("x-user", "bob")
        .header("x-accessible-agents", "all")
        .header("x-groups", "finance")
        .body(Body::empty())
        .unwrap();
    let json = body_to_json(send(&app, req).await).await;
    assert_eq!(json["total"], 2);

    let req = Request::builder()
        .uri("/agents")
        .header("x-user", "root")
        .header("x-is-admin", "true")
        .body(Body::empty())
        .unwrap();
    let json = body_to_json(send(&app, req).await).await;
    assert_eq!(json["total"], 3);

    let response = send(&app, request("GET", "/agents?query=CANCEL", Some("alice"), None)).await;
    let json = body_to_json(response).await;
    assert_eq!(json["total"], 1);

    let response = send(
        &app,
        request("GET", "/agents?visibility=private", Some("alice"), None),
    )
    .await;
    let json = body_to_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["agents"][0]["path"], "/alice-notes");
}

#[tokio::test]
async fn accessible_agents_header_scopes_listing() {
    let (app, _, _dir) = create_test_app().await;
    register(&app, "alice", flight_agent()).await;
    register(&app, "alice", json!({"name": "Hotels", "url": "http://hotels.local"})).await;

    let req = Request::builder()
        .uri("/agents")
        .header("x-user", "bob")
        .header("x-accessible-agents", "/hotels")
        .body(Body::empty())
        .unwrap();
    let json = body_to_json(send(&app, req).await).await;

    assert_eq!(json["total"], 1);
    assert_eq!(json["agents"][0]["path"], "/hotels");
}

// --- Discovery ---

#[tokio::test]
async fn discover_by_skill_scores_and_filters() {
    let (app, _, _dir) = create_test_app().await;
    register(&app, "alice", flight_agent()).await;
    register(
        &app,
        "alice",
        json!({
            "name": "Hidden Flights",
            "url": "http://hidden.local",
            "visibility": "private",
            "skills": [{"id": "book_flight", "name": "Book Flight"}]
        }),
    )
    .await;

    let body = json!({"skills": ["book_flight"], "tags": ["travel"]});
    let response = send(&app, request("POST", "/agents/discover", Some("bob"), Some(&body))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["agents"][0]["path"], "/flight-booking");
    // 0.6 * 1 + 0.2 * 1 + 0.2 * 0
    assert_eq!(json["agents"][0]["relevance_score"], 0.8);
    assert_eq!(json["agents"][0]["matched_skills"], json!(["book_flight"]));
    assert_eq!(json["query"]["max_results"], 10);
}

#[tokio::test]
async fn discover_rejects_empty_skills_and_bad_limits() {
    let (app, _, _dir) = create_test_app().await;

    let body = json!({"skills": []});
    let response = send(&app, request("POST", "/agents/discover", Some("bob"), Some(&body))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json!({"skills": ["x"], "max_results": 500});
    let response = send(&app, request("POST", "/agents/discover", Some("bob"), Some(&body))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn semantic_discovery_without_search_is_unavailable() {
    let (app, _, _dir) = create_test_app().await;

    let body = json!({"query": "book a flight"});
    let response = send(
        &app,
        request("POST", "/agents/discover/semantic", Some("bob"), Some(&body)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_to_json(response).await["error"], "semantic search failed");
}

#[tokio::test]
async fn semantic_discovery_blank_query_is_bad_request() {
    let (app, _, _dir) = create_test_app().await;

    let body = json!({"query": "  "});
    let response = send(
        &app,
        request("POST", "/agents/discover/semantic", Some("bob"), Some(&body)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn semantic_discovery_refilters_hits() {
    let search = Arc::new(StaticSearch {
        hits: vec![
            SearchHit {
                path: "/secret".to_string(),
                relevance_score: 0.95,
            },
            SearchHit {
                path: "/flight-booking".to_string(),
                relevance_score: 0.81,
            },
            SearchHit {
                path: "/deleted".to_string(),
                relevance_score: 0.5,
            },
        ],
    });
    let (app, _, _dir) = create_test_app_with(search, None).await;
    register(&app, "alice", flight_agent()).await;
    register(
        &app,
        "alice",
        json!({"name": "Secret", "url": "http://secret.local", "visibility": "private"}),
    )
    .await;

    let body = json!({"query": "book a flight", "max_results": 5});
    let response = send(
        &app,
        request("POST", "/agents/discover/semantic", Some("bob"), Some(&body)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["agents"][0]["path"], "/flight-booking");
    assert_eq!(json["agents"][0]["score"], 0.81);
}

#[tokio::test]
async fn semantic_discovery_skips_agents_disabled_since_indexing() {
    let search = Arc::new(StaticSearch {
        hits: vec![SearchHit {
            path: "/flight-booking".to_string(),
            relevance_score: 0.9,
        }],
    });
    let (app, _, _dir) = create_test_app_with(search, None).await;
    register(&app, "alice", flight_agent()).await;
    send(
        &app,
        request("POST", "/agents/flight-booking/toggle?enabled=false", Some("alice"), None),
    )
    .await;

    let body = json!({"query": "book a flight"});
    let response = send(
        &app,
        request("POST", "/agents/discover/semantic", Some("bob"), Some(&body)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_json(response).await["total"], 0);
}

// --- Agent health ---

async fn spawn_ping_server() -> String {
    let app = axum::Router::new().route("/ping", axum::routing::get(|| async { "pong" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn health_probe_reports_live_agent() {
    let (app, _, _dir) = create_test_app().await;
    let url = spawn_ping_server().await;
    register(&app, "alice", json!({"name": "Pinger", "url": &url})).await;

    let response = send(&app, request("POST", "/agents/pinger/health", Some("bob"), None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response).await;
    assert_eq!(json["agent_path"], "/pinger");
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["status_code"], 200);
    assert_eq!(json["ping_url"], format!("{}ping", url));
}

#[tokio::test]
async fn health_probe_of_disabled_agent_is_rejected() {
    let (app, _, _dir) = create_test_app().await;
    register(&app, "alice", json!({"name": "Pinger", "url": "http://127.0.0.1:9"})).await;
    send(
        &app,
        request("POST", "/agents/pinger/toggle?enabled=false", Some("alice"), None),
    )
    .await;

    let response = send(&app, request("POST", "/agents/pinger/health", Some("alice"), None)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_agent_action_is_not_found() {
    let (app, _, _dir) = create_test_app().await;

    let response = send(&app, request("POST", "/agents/pinger/restart", Some("alice"), None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
