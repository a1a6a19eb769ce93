//! registryd - agent registry daemon
//!
//! Main entry point for the daemon binary.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;

use clap::Parser;
use registry_core::Config;
use registryd::Daemon;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "registryd", about = "Agent registry and discovery daemon", version)]
struct Cli {
    /// Config file (key=value)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Vector-search service base URL
    #[arg(long)]
    search_url: Option<String>,

    /// Default agent probe timeout in seconds
    #[arg(long)]
    health_check_timeout: Option<u64>,
}

impl Cli {
    /// Defaults, then environment, then config file, then flags.
    fn load_config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = Config::default();
        config.apply_env();
        if let Some(path) = &self.config {
            config.load_file(path)?;
        }

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(db_path) = &self.db_path {
            config.db_path.clone_from(db_path);
        }
        if let Some(url) = &self.search_url {
            config.search_url = Some(url.clone());
        }
        if let Some(secs) = self.health_check_timeout {
            config.health_check_timeout_sec = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    runtime.block_on(async {
        let daemon = match Daemon::new(config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("failed to initialize daemon: {}", e);
                std::process::exit(1);
            }
        };

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

            tokio::select! {
                result = daemon.run() => {
                    if let Err(e) = result {
                        error!("daemon error: {}", e);
                        std::process::exit(1);
                    }
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT, shutting down");
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = daemon.run() => {
                    if let Err(e) = result {
                        error!("daemon error: {}", e);
                        std::process::exit(1);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT, shutting down");
                }
            }
        }
    });
}
