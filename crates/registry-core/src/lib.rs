pub mod access;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod paths;
pub mod types;

pub use config::Config;
pub use credentials::{AuthError, ClientCredentials, CredentialCache};
pub use discovery::{ScoredAgent, SkillQuery, ValidationError};
pub use types::*;
