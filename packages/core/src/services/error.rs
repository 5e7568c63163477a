//! Service Layer Error Types
//!
//! This module defines error types for tree operations, covering business rule
//! violations on top of validation and database failures.

use crate::db::DatabaseError;
use crate::models::{ContentId, Permission, PrincipalId, TreeId, ValidationError};
use thiserror::Error;

/// Tree operation errors
///
/// Every failed mutation returns one of these and leaves the tree unchanged.
#[derive(Error, Debug)]
pub enum TreeServiceError {
    /// Node not found by ID
    #[error("Tree node not found: {tree_id}")]
    NodeNotFound { tree_id: TreeId },

    /// Content item unknown to the content store
    #[error("Content item not found: {content_id}")]
    ContentNotFound { content_id: ContentId },

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// Parent would exceed its content item's child bound
    #[error("Node {parent_id} cannot hold more than {max_children} children")]
    CapacityExceeded { parent_id: TreeId, max_children: usize },

    /// Same content already placed under the parent
    #[error("Content {content_id} is already placed under node {parent_id}")]
    DuplicatePlacement {
        parent_id: TreeId,
        content_id: ContentId,
    },

    /// Every batch item was skipped as a duplicate
    #[error("All {count} batch items are already placed under node {parent_id}")]
    AllItemsSkipped { parent_id: TreeId, count: usize },

    /// Unlock refused because descendants hold locks
    #[error("Node {tree_id} has {locked_children} locked children and cannot be unlocked")]
    LockConflict { tree_id: TreeId, locked_children: i64 },

    /// Structural change on a locked node
    #[error("Node {tree_id} is locked")]
    NodeLocked { tree_id: TreeId },

    /// Principal lacks the permission for the operation
    #[error("Principal {principal_id} lacks permission {permission:?}")]
    PermissionDenied {
        principal_id: PrincipalId,
        permission: Permission,
    },

    /// Pre-mutation hook refused or altered the mutation illegally
    #[error("Mutation rejected by hook: {0}")]
    HookRejected(String),

    /// Move source no longer matches the node's location
    #[error("Node {tree_id} is under {actual_parent_id}, not {expected_parent_id}")]
    StaleLocation {
        tree_id: TreeId,
        expected_parent_id: TreeId,
        actual_parent_id: TreeId,
    },

    /// Parent chain is broken or cyclic
    #[error("Parent chain of node {tree_id} is corrupt")]
    CorruptHierarchy { tree_id: TreeId },

    /// External collaborator failed
    #[error("Collaborator failed: {0}")]
    Collaborator(String),

    /// Transaction could not be committed
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },
}

impl TreeServiceError {
    /// Create a node not found error
    pub fn node_not_found(tree_id: TreeId) -> Self {
        Self::NodeNotFound { tree_id }
    }

    /// Create a content not found error
    pub fn content_not_found(content_id: ContentId) -> Self {
        Self::ContentNotFound { content_id }
    }

    /// Create a capacity exceeded error
    pub fn capacity_exceeded(parent_id: TreeId, max_children: usize) -> Self {
        Self::CapacityExceeded {
            parent_id,
            max_children,
        }
    }

    /// Create a duplicate placement error
    pub fn duplicate_placement(parent_id: TreeId, content_id: ContentId) -> Self {
        Self::DuplicatePlacement {
            parent_id,
            content_id,
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(principal_id: PrincipalId, permission: Permission) -> Self {
        Self::PermissionDenied {
            principal_id,
            permission,
        }
    }

    /// Create a hook rejection error
    pub fn hook_rejected(msg: impl Into<String>) -> Self {
        Self::HookRejected(msg.into())
    }

    /// Create a collaborator error
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Create a transaction failed error
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    /// Whether the error was caused by caller input rather than the tree state
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_message_includes_bound() {
        let err = TreeServiceError::capacity_exceeded(4, 2);
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_validation_conversion() {
        let err: TreeServiceError = ValidationError::EmptyBatch.into();
        assert!(err.is_validation());
    }
}
