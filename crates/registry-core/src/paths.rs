//! Catalog path normalization.

use crate::discovery::ValidationError;

/// Normalize a catalog path, deriving it from `name` when absent.
///
/// Derived paths are lowercased with spaces replaced by hyphens. Every path
/// gets a leading `/` and loses trailing slashes (except the root itself).
pub fn normalize_path(path: Option<&str>, name: Option<&str>) -> Result<String, ValidationError> {
    let raw = match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => p.to_string(),
        None => {
            let name = name.map(str::trim).filter(|n| !n.is_empty()).ok_or_else(|| {
                ValidationError::InvalidPath(
                    "path is required when no agent name is given".to_string(),
                )
            })?;
            name.to_lowercase().replace(' ', "-")
        }
    };

    let mut normalized = if raw.starts_with('/') {
        raw
    } else {
        format!("/{raw}")
    };

    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    Ok(normalized)
}
