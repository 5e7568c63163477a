//! Principal: the authenticated caller of a tree operation
//!
//! Every mutating call receives the principal explicitly. Nothing in the crate
//! reads ambient session state.

use super::tree_node::GroupId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of an authenticated user
pub type PrincipalId = i64;

/// Coarse permissions relevant to the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    /// Implies every other permission
    Administrator,
    /// Insert, move, remove and alias placements
    EditTree,
    /// Lock and unlock nodes
    ManageLocks,
    /// Change login/group gating
    ManageAccess,
}

/// Authenticated caller with group memberships and permissions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: PrincipalId,
    #[serde(default)]
    pub groups: BTreeSet<GroupId>,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl Principal {
    pub fn new(id: PrincipalId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Unauthenticated visitor (no groups, no permissions)
    pub fn anonymous() -> Self {
        Self::new(0)
    }

    /// Principal holding the administrator permission
    pub fn administrator(id: PrincipalId) -> Self {
        Self::new(id).with_permission(Permission::Administrator)
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.groups.extend(groups);
        self
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Administrator) || self.permissions.contains(&permission)
    }
}
