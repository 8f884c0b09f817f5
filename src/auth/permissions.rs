//! Role model and capability aggregation.
//!
//! Roles are provided eagerly by the [`RoleStore`](crate::store::RoleStore)
//! collaborator; aggregation is a pure set union with no lazy loading.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A named role granting a set of abilities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub abilities: BTreeSet<String>,
}

impl Role {
    #[must_use]
    pub fn new(name: impl Into<String>, abilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            abilities: abilities.into_iter().map(Into::into).collect(),
        }
    }
}

/// Merges role ability sets into one deduplicated capability set.
pub struct PermissionAggregator;

impl PermissionAggregator {
    /// Union of all abilities across roles. Order-independent; an empty
    /// role list yields an empty set.
    #[must_use]
    pub fn aggregate(roles: &[Role]) -> BTreeSet<String> {
        roles
            .iter()
            .flat_map(|role| role.abilities.iter().cloned())
            .collect()
    }
}
