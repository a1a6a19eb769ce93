//! Request-level error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use registry_core::{AuthError, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::search::{SearchError, SemanticError};
use crate::storage::StorageError;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    BadRequest(String),
    /// Deliberately carries no descriptor detail.
    #[error("access denied")]
    Forbidden,
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("agent already registered: {0}")]
    Conflict(String),
    #[error("credential acquisition failed: {0}")]
    Auth(#[from] AuthError),
    #[error("semantic search unavailable: {0}")]
    SearchUnavailable(#[from] SearchError),
    #[error("{0}")]
    Precondition(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) | Self::BadRequest(_) | Self::Precondition(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Auth(_) => StatusCode::BAD_GATEWAY,
            Self::SearchUnavailable(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text returned to the client. Upstream and storage failures are logged
    /// in full but answered with a fixed message.
    pub fn client_message(&self) -> String {
        match self {
            Self::Auth(_) => "credential acquisition failed".to_string(),
            Self::SearchUnavailable(_) => "semantic search failed".to_string(),
            Self::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AgentNotFound(path) => Self::NotFound(path),
            StorageError::AgentExists(path) => Self::Conflict(path),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<SemanticError> for RegistryError {
    fn from(err: SemanticError) -> Self {
        match err {
            SemanticError::Validation(e) => Self::Validation(e),
            SemanticError::Unavailable(SearchError::Auth(e)) => Self::Auth(e),
            SemanticError::Unavailable(e) => Self::SearchUnavailable(e),
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() || status == StatusCode::BAD_GATEWAY {
            error!(error = %self, "request failed");
        } else if status == StatusCode::FORBIDDEN {
            warn!("request denied");
        }

        let body = ErrorResponse {
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}
