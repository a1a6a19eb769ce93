//! Caller identity from proxy-supplied headers.
//!
//! The daemon runs behind an authenticating proxy that forwards the verified
//! identity as headers. `X-User` is mandatory; everything else defaults to
//! the least privileged reading. A missing `X-Accessible-Agents` scopes the
//! caller to no paths at all; an unscoped caller is sent `all`.

use std::collections::HashSet;

use axum::http::{header, HeaderMap};
use registry_core::{AccessiblePaths, Principal};

use crate::error::RegistryError;

pub const USER_HEADER: &str = "x-user";
pub const GROUPS_HEADER: &str = "x-groups";
pub const ADMIN_HEADER: &str = "x-is-admin";
pub const ACCESSIBLE_AGENTS_HEADER: &str = "x-accessible-agents";

/// Validate the shared bearer token if one is configured.
pub fn check_auth(expected: Option<&str>, headers: &HeaderMap) -> Result<(), RegistryError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s));

    match provided {
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(RegistryError::Unauthorized("invalid auth token".to_string())),
        None => Err(RegistryError::Unauthorized("missing auth token".to_string())),
    }
}

/// Build the request principal from identity headers.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, RegistryError> {
    let username = header_str(headers, USER_HEADER)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| RegistryError::Unauthorized("missing user identity".to_string()))?;

    let is_admin = header_str(headers, ADMIN_HEADER)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    let groups = header_str(headers, GROUPS_HEADER)
        .map(split_list)
        .unwrap_or_default();

    let accessible_paths = header_str(headers, ACCESSIBLE_AGENTS_HEADER)
        .map_or_else(|| AccessiblePaths::Only(HashSet::new()), |value| {
            AccessiblePaths::from_list(split_list(value))
        });

    let mut principal = Principal::new(username)
        .with_groups(groups)
        .with_accessible_paths(accessible_paths);
    principal.is_admin = is_admin;
    Ok(principal)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
