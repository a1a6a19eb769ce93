//! Catalog access control.
//!
//! Decides which descriptors a principal may see. Rules are evaluated in a
//! fixed order and the first one that applies decides:
//! 1. Admins see everything.
//! 2. A principal scoped to specific paths sees nothing outside them.
//! 3. Public entries are visible.
//! 4. Private entries are visible to their owner only.
//! 5. Group-restricted entries are visible to members of an allowed group.
//! 6. Anything else is hidden.

use crate::types::{AgentDescriptor, Principal, Visibility};

/// Returns the descriptors `principal` may see, in input order.
pub fn filter_visible<'a>(
    descriptors: &'a [AgentDescriptor],
    principal: &Principal,
) -> Vec<&'a AgentDescriptor> {
    descriptors
        .iter()
        .filter(|d| can_view(d, principal))
        .collect()
}

/// Owned variant of [`filter_visible`] for callers that hold their own snapshot.
pub fn retain_visible(descriptors: Vec<AgentDescriptor>, principal: &Principal) -> Vec<AgentDescriptor> {
    descriptors
        .into_iter()
        .filter(|d| can_view(d, principal))
        .collect()
}

/// Whether a single descriptor is visible to `principal`.
pub fn can_view(descriptor: &AgentDescriptor, principal: &Principal) -> bool {
    if principal.is_admin {
        return true;
    }

    if !principal.accessible_paths.contains(&descriptor.path) {
        return false;
    }

    match descriptor.visibility {
        Visibility::Public => true,
        Visibility::Private => descriptor.owner == principal.username,
        Visibility::GroupRestricted => descriptor
            .allowed_groups
            .iter()
            .any(|g| principal.groups.contains(g)),
        Visibility::Unrecognized => false,
    }
}

/// Whether `principal` may update, toggle, or delete `descriptor`.
///
/// Only the registering owner and admins may mutate an entry.
pub fn can_modify(descriptor: &AgentDescriptor, principal: &Principal) -> bool {
    principal.is_admin || descriptor.owner == principal.username
}
