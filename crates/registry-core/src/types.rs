//! Core types for the agent registry.
//!
//! Descriptors, principals, and probe results shared by the daemon and the CLI.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Enumerations ---

/// Access tier of a catalog entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    GroupRestricted,
    /// Any value this registry does not know. Never visible to non-admins.
    #[serde(other)]
    Unrecognized,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::GroupRestricted => "group-restricted",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Parse a stored or user-supplied value. Unknown values map to `Unrecognized`.
    pub fn parse(value: &str) -> Self {
        match value {
            "public" => Self::Public,
            "private" => Self::Private,
            "group-restricted" => Self::GroupRestricted,
            _ => Self::Unrecognized,
        }
    }
}

/// Coarse reputation tier. Boosts discovery ranking; never gates access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Community,
    Verified,
    Trusted,
    /// Also the reading of any unknown tier.
    #[default]
    #[serde(other)]
    Unverified,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Community => "community",
            Self::Verified => "verified",
            Self::Trusted => "trusted",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "community" => Self::Community,
            "verified" => Self::Verified,
            "trusted" => Self::Trusted,
            _ => Self::Unverified,
        }
    }

    /// Ranking boost in [0, 1] used by skill discovery.
    pub fn boost(&self) -> f64 {
        match self {
            Self::Unverified => 0.0,
            Self::Community => 0.2,
            Self::Verified => 0.5,
            Self::Trusted => 1.0,
        }
    }
}

// --- Catalog entries ---

/// A capability an agent claims to support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Catalog entry describing one registered agent.
///
/// `path` is the catalog key. `registered_at` is assigned once by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub path: String,
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
    pub owner: String,
    #[serde(default)]
    pub allowed_groups: Vec<String>,
    #[serde(default)]
    pub trust_level: TrustLevel,
    #[serde(default)]
    pub num_stars: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub registered_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl AgentDescriptor {
    /// Lowercased union of every skill id and name.
    pub fn skill_keys(&self) -> HashSet<String> {
        self.skills
            .iter()
            .flat_map(|s| [s.id.to_lowercase(), s.name.to_lowercase()])
            .collect()
    }

    /// Lowercased tag set.
    pub fn tag_keys(&self) -> HashSet<String> {
        self.tags.iter().map(|t| t.to_lowercase()).collect()
    }

    /// Text searched by the catalog listing's free-text filter.
    pub fn searchable_text(&self) -> String {
        let skills: Vec<&str> = self.skills.iter().map(|s| s.name.as_str()).collect();
        format!(
            "{} {} {} {}",
            self.name,
            self.description,
            self.tags.join(" "),
            skills.join(" ")
        )
        .to_lowercase()
    }
}

// --- Principals ---

/// Paths a principal is scoped to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AccessiblePaths {
    /// The `all` sentinel.
    #[default]
    All,
    Only(HashSet<String>),
}

impl AccessiblePaths {
    /// Build from a raw list where the literal `all` means no restriction.
    pub fn from_list<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: HashSet<String> = entries.into_iter().map(Into::into).collect();
        if paths.contains("all") {
            Self::All
        } else {
            Self::Only(paths)
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(paths) => paths.contains(path),
        }
    }
}

/// The caller a request is evaluated for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub is_admin: bool,
    pub groups: HashSet<String>,
    pub accessible_paths: AccessiblePaths,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(username)
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_accessible_paths(mut self, paths: AccessiblePaths) -> Self {
        self.accessible_paths = paths;
        self
    }
}

// --- Health probes ---

/// Outcome of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Result of a single probe. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub status: HealthStatus,
    pub status_code: Option<u16>,
    pub detail: Option<String>,
    pub response_time_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
}
