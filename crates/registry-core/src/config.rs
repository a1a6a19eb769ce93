//! Configuration for the registry daemon and its clients.
//!
//! Plain `key=value` file, `#` comments, optional quotes.
//! Precedence: CLI flags > `--config` file > environment > defaults.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::credentials::ClientCredentials;
use crate::discovery::{DEFAULT_MAX_RESULTS, MAX_RESULTS_LIMIT};

/// Environment variable for the daemon API bearer token.
pub const ENV_AUTH_TOKEN: &str = "REGISTRYD_AUTH_TOKEN";
/// Environment variable for the machine-to-machine client id.
pub const ENV_CLIENT_ID: &str = "REGISTRY_CLIENT_ID";
/// Environment variable for the machine-to-machine client secret.
pub const ENV_CLIENT_SECRET: &str = "REGISTRY_CLIENT_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Registry configuration.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    // Server
    pub port: u16,
    pub db_path: PathBuf,
    /// Shared bearer token required on every API request when set.
    pub auth_token: Option<String>,

    // Health probes
    /// Default probe timeout. Values below 1 are raised to 1.
    pub health_check_timeout_sec: u64,

    // Vector search collaborator
    pub search_url: Option<String>,
    pub search_timeout_sec: u64,

    // Discovery
    pub default_max_results: u32,

    // Identity provider (client-credentials exchange)
    pub idp_url: Option<String>,
    pub idp_realm: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7860,
            db_path: dirs::data_local_dir()
                .map_or_else(|| PathBuf::from("registryd.db"), |d| d.join("registryd/registryd.db")),
            auth_token: None,
            health_check_timeout_sec: 5,
            search_url: None,
            search_timeout_sec: 10,
            default_max_results: DEFAULT_MAX_RESULTS,
            idp_url: None,
            idp_realm: "mcp-gateway".to_string(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("auth_token", &redact(&self.auth_token))
            .field("health_check_timeout_sec", &self.health_check_timeout_sec)
            .field("search_url", &self.search_url)
            .field("search_timeout_sec", &self.search_timeout_sec)
            .field("default_max_results", &self.default_max_results)
            .field("idp_url", &self.idp_url)
            .field("idp_realm", &self.idp_realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .finish()
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Fill unset secrets from the environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(token) = non_empty(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(id) = non_empty(ENV_CLIENT_ID) {
            self.client_id = Some(id);
        }
        if let Some(secret) = non_empty(ENV_CLIENT_SECRET) {
            self.client_secret = Some(secret);
        }
    }

    /// Parse config content (key=value format).
    fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            // Skip empty lines and comments
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());
        match key {
            "port" => self.port = Self::parse_int(key, value)?,
            "db_path" => self.db_path = PathBuf::from(value),
            "auth_token" => self.auth_token = optional(value),
            "health_check_timeout_sec" => {
                self.health_check_timeout_sec = Self::parse_int(key, value)?;
            }
            "search_url" => self.search_url = optional(value),
            "search_timeout_sec" => self.search_timeout_sec = Self::parse_int(key, value)?,
            "default_max_results" => self.default_max_results = Self::parse_int(key, value)?,
            "idp_url" => self.idp_url = optional(value),
            "idp_realm" => self.idp_realm = value.to_string(),
            "client_id" => self.client_id = optional(value),
            "client_secret" => self.client_secret = optional(value),
            _ => {
                // Warn but don't fail for unknown keys
                tracing::warn!(key, "unknown config key");
            }
        }
        Ok(())
    }

    fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Reject inconsistent settings before anything is constructed from them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_RESULTS_LIMIT).contains(&self.default_max_results) {
            return Err(ConfigError::Invalid(format!(
                "default_max_results must be between 1 and {MAX_RESULTS_LIMIT}, got {}",
                self.default_max_results
            )));
        }

        let idp_fields = [
            self.idp_url.is_some(),
            self.client_id.is_some(),
            self.client_secret.is_some(),
        ];
        if idp_fields.iter().any(|s| *s) && !idp_fields.iter().all(|s| *s) {
            return Err(ConfigError::Invalid(
                "idp_url, client_id, and client_secret must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective probe timeout in seconds (never below 1).
    pub fn health_check_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.health_check_timeout_sec.max(1))
    }

    /// Client credentials, when the identity provider is configured.
    pub fn client_credentials(&self) -> Option<ClientCredentials> {
        Some(ClientCredentials {
            issuer_url: self.idp_url.clone()?,
            realm: self.idp_realm.clone(),
            client_id: self.client_id.clone()?,
            client_secret: self.client_secret.clone()?,
        })
    }
}

/// Optional dependency for resolving user directories.
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
    }
}
