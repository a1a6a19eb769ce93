//! SQLite catalog store for the registry daemon.
//!
//! Each call reads or writes a consistent snapshot; callers treat the result
//! of `get_all` as immutable for the duration of one filter/score pass.

use std::path::Path;

use chrono::{DateTime, Utc};
use registry_core::{AgentDescriptor, Skill, TrustLevel, Visibility};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use thiserror::Error;
use tracing::warn;

/// Explicit column list for agents table queries.
const AGENTS_COLUMNS: &str = "path, name, description, url, skills_json, tags_json, \
    visibility, owner, allowed_groups_json, trust_level, num_stars, enabled, registered_at";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("agent already exists: {0}")]
    AgentExists(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Catalog store backed by SQLite.
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    /// Create a new storage instance with the given database path.
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "failed to create database directory");
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        // Enable WAL mode
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Run embedded migrations.
    pub async fn migrate_embedded(&self) -> Result<()> {
        let migrations = [include_str!("../../../migrations/0001_init.sql")];

        for migration_sql in migrations {
            // Remove comment lines before splitting.
            let cleaned: String = migration_sql
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");

            for statement in cleaned.split(';') {
                let trimmed = statement.trim();
                if !trimmed.is_empty() {
                    sqlx::query(trimmed).execute(&self.pool).await?;
                }
            }
        }
        Ok(())
    }

    /// Insert a new descriptor. Fails if the path is already registered.
    pub async fn save(&self, agent: &AgentDescriptor) -> Result<()> {
        let query = format!(
            "INSERT INTO agents ({AGENTS_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        );
        let result = sqlx::query(&query)
            .bind(&agent.path)
            .bind(&agent.name)
            .bind(&agent.description)
            .bind(&agent.url)
            .bind(serde_json::to_string(&agent.skills)?)
            .bind(serde_json::to_string(&agent.tags)?)
            .bind(agent.visibility.as_str())
            .bind(&agent.owner)
            .bind(serde_json::to_string(&agent.allowed_groups)?)
            .bind(agent.trust_level.as_str())
            .bind(i64::from(agent.num_stars))
            .bind(agent.enabled)
            .bind(agent.registered_at.timestamp_millis())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::AgentExists(agent.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a descriptor by path.
    pub async fn get(&self, path: &str) -> Result<Option<AgentDescriptor>> {
        let query = format!("SELECT {AGENTS_COLUMNS} FROM agents WHERE path = ?1");
        let row = sqlx::query_as::<_, AgentRow>(&query)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AgentRow::into_descriptor).transpose()
    }

    /// All descriptors in registration order.
    pub async fn get_all(&self) -> Result<Vec<AgentDescriptor>> {
        let query = format!("SELECT {AGENTS_COLUMNS} FROM agents ORDER BY registered_at ASC, path ASC");
        let rows = sqlx::query_as::<_, AgentRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AgentRow::into_descriptor).collect()
    }

    /// Replace the editable fields of an existing descriptor.
    ///
    /// `owner`, `registered_at`, `enabled`, and `num_stars` are kept from the
    /// stored record. Returns the updated descriptor.
    pub async fn update(&self, path: &str, agent: &AgentDescriptor) -> Result<AgentDescriptor> {
        let result = sqlx::query(
            "UPDATE agents SET name = ?1, description = ?2, url = ?3, skills_json = ?4, \
             tags_json = ?5, visibility = ?6, allowed_groups_json = ?7, trust_level = ?8 \
             WHERE path = ?9",
        )
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.url)
        .bind(serde_json::to_string(&agent.skills)?)
        .bind(serde_json::to_string(&agent.tags)?)
        .bind(agent.visibility.as_str())
        .bind(serde_json::to_string(&agent.allowed_groups)?)
        .bind(agent.trust_level.as_str())
        .bind(path)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::AgentNotFound(path.to_string()));
        }

        self.get(path)
            .await?
            .ok_or_else(|| StorageError::AgentNotFound(path.to_string()))
    }

    /// Enable or disable a descriptor.
    pub async fn toggle(&self, path: &str, enabled: bool) -> Result<()> {
        let result = sqlx::query("UPDATE agents SET enabled = ?1 WHERE path = ?2")
            .bind(enabled)
            .bind(path)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::AgentNotFound(path.to_string()));
        }
        Ok(())
    }

    /// Delete a descriptor.
    pub async fn remove(&self, path: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM agents WHERE path = ?1")
            .bind(path)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::AgentNotFound(path.to_string()));
        }
        Ok(())
    }
}

// --- Row types for SQLx ---

#[derive(sqlx::FromRow)]
struct AgentRow {
    path: String,
    name: String,
    description: String,
    url: String,
    skills_json: String,
    tags_json: String,
    visibility: String,
    owner: String,
    allowed_groups_json: String,
    trust_level: String,
    num_stars: i64,
    enabled: bool,
    registered_at: i64,
}

impl AgentRow {
    fn into_descriptor(self) -> Result<AgentDescriptor> {
        let skills: Vec<Skill> = serde_json::from_str(&self.skills_json)?;
        let tags: Vec<String> = serde_json::from_str(&self.tags_json)?;
        let allowed_groups: Vec<String> = serde_json::from_str(&self.allowed_groups_json)?;

        Ok(AgentDescriptor {
            path: self.path,
            name: self.name,
            description: self.description,
            url: self.url,
            skills,
            tags,
            visibility: Visibility::parse(&self.visibility),
            owner: self.owner,
            allowed_groups,
            trust_level: TrustLevel::parse(&self.trust_level),
            num_stars: u32::try_from(self.num_stars).unwrap_or(0),
            enabled: self.enabled,
            registered_at: DateTime::<Utc>::from_timestamp_millis(self.registered_at)
                .unwrap_or_default(),
        })
    }
}
