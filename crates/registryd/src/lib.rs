//! registryd - agent registry daemon
//!
//! Library components for the daemon process. Services are built once from a
//! validated [`Config`] and injected into the HTTP state; nothing here is a
//! process-wide singleton.

pub mod error;
pub mod health;
pub mod principal;
pub mod search;
pub mod server;
pub mod storage;

use std::sync::Arc;

use health::HealthProbe;
use registry_core::{Config, CredentialCache};
use search::{DisabledSearch, HttpVectorSearch, VectorSearch};
use server::AppState;
use storage::Storage;
use tracing::info;

/// Daemon state.
#[derive(Debug)]
pub struct Daemon {
    config: Config,
    state: Arc<AppState>,
}

impl Daemon {
    /// Create a new daemon from a validated configuration.
    pub async fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let storage = Storage::new(&config.db_path).await?;
        storage.migrate_embedded().await?;

        let credentials = config
            .client_credentials()
            .map(|creds| Arc::new(CredentialCache::new(creds)));

        let search = build_search(&config, credentials);

        let state = Arc::new(AppState {
            storage: Arc::new(storage),
            search,
            probe: HealthProbe::new(config.health_check_timeout()),
            auth_token: config.auth_token.clone(),
            default_max_results: config.default_max_results,
        });

        Ok(Self { config, state })
    }

    /// Shared handler state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Serve the HTTP API until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("registryd starting on port {}", self.config.port);
        info!("database: {}", self.config.db_path.display());
        if self.config.auth_token.is_some() {
            info!("auth token: enabled");
        }

        server::start_server(Arc::clone(&self.state), self.config.port).await
    }
}

/// Pick the vector-search collaborator for this configuration.
fn build_search(config: &Config, credentials: Option<Arc<CredentialCache>>) -> Arc<dyn VectorSearch> {
    let Some(url) = config.search_url.as_deref() else {
        info!("semantic search: disabled");
        return Arc::new(DisabledSearch);
    };

    let timeout = std::time::Duration::from_secs(config.search_timeout_sec.max(1));
    let mut client = HttpVectorSearch::new(url, timeout);
    if let Some(credentials) = credentials {
        client = client.with_credentials(credentials);
    }
    info!("semantic search: {}", client.endpoint());
    Arc::new(client)
}
