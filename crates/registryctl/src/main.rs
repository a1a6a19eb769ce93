//! registryctl - discovery client for registryd
//!
//! Lets an operator or a peer agent find, inspect, and manage registered
//! agents through the daemon's HTTP API.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod client;
mod render;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use client::{Client, ClientError, Credentials, Identity};
use registry_core::{ClientCredentials, CredentialCache};

/// CLI client for the registryd agent registry.
#[derive(Parser)]
#[command(name = "registryctl")]
#[command(about = "Discover and manage agents registered with registryd")]
#[command(version)]
struct Cli {
    /// Daemon address (default: http://127.0.0.1:7860)
    #[arg(long, global = true, env = "REGISTRY_ADDR")]
    addr: Option<String>,

    /// Shared auth token for the daemon API
    #[arg(long, global = true, env = "REGISTRY_TOKEN")]
    token: Option<String>,

    /// Identity sent as X-User
    #[arg(long, global = true, env = "REGISTRY_USER", default_value = "registryctl")]
    user: String,

    /// Groups sent as X-Groups
    #[arg(long = "group", global = true, value_delimiter = ',')]
    groups: Vec<String>,

    /// Agent paths sent as X-Accessible-Agents (`all` for no restriction)
    #[arg(
        long = "accessible-agents",
        global = true,
        env = "REGISTRY_ACCESSIBLE_AGENTS",
        value_delimiter = ',',
        default_value = "all"
    )]
    accessible_agents: Vec<String>,

    /// Identity provider base URL
    #[arg(long, global = true, env = "REGISTRY_IDP_URL")]
    idp_url: Option<String>,

    /// Identity provider realm
    #[arg(long, global = true, env = "REGISTRY_IDP_REALM", default_value = "mcp-gateway")]
    realm: String,

    /// Client id for the client-credentials exchange
    #[arg(long, global = true, env = "REGISTRY_CLIENT_ID")]
    client_id: Option<String>,

    /// Client secret for the client-credentials exchange
    #[arg(long, global = true, env = "REGISTRY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List visible agents
    List {
        /// Free-text filter over name, description, tags, and skills
        #[arg(long)]
        query: Option<String>,

        /// Show only enabled agents
        #[arg(long)]
        enabled_only: bool,
    },

    /// Show one agent
    Get {
        /// Agent path
        path: String,
    },

    /// Probe an agent's /ping endpoint through the daemon
    Health {
        /// Agent path
        path: String,
    },

    /// Find agents by skill
    Discover {
        /// Required skill id or name (repeatable)
        #[arg(long = "skill", required = true)]
        skills: Vec<String>,

        /// Optional tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Maximum results (1-100)
        #[arg(long)]
        max_results: Option<u32>,
    },

    /// Find agents by free-text query
    Search {
        /// Query text
        query: String,

        /// Maximum results (1-100)
        #[arg(long)]
        max_results: Option<u32>,
    },

    /// Enable or disable an agent
    Toggle {
        /// Agent path
        path: String,

        /// Enable the agent
        #[arg(long, conflicts_with = "disabled", required_unless_present = "disabled")]
        enabled: bool,

        /// Disable the agent
        #[arg(long)]
        disabled: bool,
    },

    /// Remove an agent
    Remove {
        /// Agent path
        path: String,
    },
}

impl Cli {
    fn credentials(&self) -> Result<Credentials, String> {
        match (&self.idp_url, &self.client_id, &self.client_secret) {
            (Some(idp_url), Some(client_id), Some(client_secret)) => {
                let cache = CredentialCache::new(ClientCredentials {
                    issuer_url: idp_url.clone(),
                    realm: self.realm.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                });
                Ok(Credentials::Provider(Arc::new(cache)))
            }
            (None, None, None) => Ok(self
                .token
                .clone()
                .map_or(Credentials::None, Credentials::Static)),
            _ => Err(
                "--idp-url, --client-id, and --client-secret must be given together".to_string(),
            ),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let credentials = match cli.credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    let addr = cli
        .addr
        .clone()
        .unwrap_or_else(|| "http://127.0.0.1:7860".to_string());
    let identity = Identity {
        user: cli.user.clone(),
        groups: cli.groups.clone(),
        accessible_agents: cli.accessible_agents.clone(),
    };
    let client = Client::new(&addr, identity, credentials);

    match client.check_health().await {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("error: registry at {} is not healthy", client.addr());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }

    let result = match cli.command {
        Command::List {
            query,
            enabled_only,
        } => run_list(&client, query.as_deref(), enabled_only).await,
        Command::Get { path } => run_get(&client, &path).await,
        Command::Health { path } => run_health(&client, &path).await,
        Command::Discover {
            skills,
            tags,
            max_results,
        } => run_discover(&client, &skills, &tags, max_results).await,
        Command::Search { query, max_results } => run_search(&client, &query, max_results).await,
        Command::Toggle {
            path,
            enabled,
            disabled,
        } => run_toggle(&client, &path, enabled && !disabled).await,
        Command::Remove { path } => run_remove(&client, &path).await,
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run_list(client: &Client, query: Option<&str>, enabled_only: bool) -> Result<(), ClientError> {
    let agents = client.list_agents(query, enabled_only).await?;
    render::print_agent_list(&agents);
    Ok(())
}

async fn run_get(client: &Client, path: &str) -> Result<(), ClientError> {
    let agent = client.get_agent(path).await?;
    render::print_agent_details(&agent);
    Ok(())
}

async fn run_health(client: &Client, path: &str) -> Result<(), ClientError> {
    let report = client.check_agent_health(path).await?;
    render::print_health(&report);
    Ok(())
}

async fn run_discover(
    client: &Client,
    skills: &[String],
    tags: &[String],
    max_results: Option<u32>,
) -> Result<(), ClientError> {
    let agents = client.discover(skills, tags, max_results).await?;
    render::print_discovered(&agents);
    Ok(())
}

async fn run_search(client: &Client, query: &str, max_results: Option<u32>) -> Result<(), ClientError> {
    let agents = client.search(query, max_results).await?;
    render::print_semantic(&agents);
    Ok(())
}

async fn run_toggle(client: &Client, path: &str, enabled: bool) -> Result<(), ClientError> {
    client.toggle_agent(path, enabled).await?;
    println!("{} {}", if enabled { "Enabled" } else { "Disabled" }, path);
    Ok(())
}

async fn run_remove(client: &Client, path: &str) -> Result<(), ClientError> {
    client.remove_agent(path).await?;
    println!("Removed {}", path);
    Ok(())
}
