//! Tree Node Data Structures
//!
//! This module defines the `TreeNode` struct: one placement of an external content
//! item (a page) inside the site hierarchy.
//!
//! # Architecture
//!
//! - **Placement, not content**: a node only references content by `content_id`;
//!   the same content may be placed at several locations
//! - **Contiguous ordering**: `index` is a zero-based sibling position under `parent_id`
//! - **Aliases**: a node with `shortcut_target` set presents another node's content
//! - **Derived counts**: `num_children` is computed on read and never persisted
//!
//! # Examples
//!
//! ```rust
//! use sitetree_core::models::{parse_tree_id, ROOT_PARENT_ID};
//!
//! assert_eq!(parse_tree_id("42").unwrap(), 42);
//! assert!(parse_tree_id("forty-two").is_err());
//! assert_eq!(ROOT_PARENT_ID, 0);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Identifier of a tree placement
pub type TreeId = i64;

/// Identifier of an external content item
pub type ContentId = i64;

/// Identifier of an access group
pub type GroupId = i64;

/// Parent reference of top-level nodes (sentinel, never a stored node)
pub const ROOT_PARENT_ID: TreeId = 0;

/// Validation errors for tree operations
///
/// Raised before any write happens; the caller receives them unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': expected a positive integer")]
    InvalidId(String),

    #[error("Invalid sibling index {index}: must be between 0 and {max}")]
    InvalidIndex { index: i64, max: i64 },

    #[error("Batch is empty")]
    EmptyBatch,

    #[error("Malformed batch input: {0}")]
    MalformedBatch(String),

    #[error("Node {tree_id} cannot be moved below itself or one of its descendants ({new_parent_id})")]
    CycleWouldForm { tree_id: TreeId, new_parent_id: TreeId },

    #[error("Shortcut target {target_id} is itself a shortcut")]
    ShortcutChain { target_id: TreeId },

    #[error("Node {parent_id} is a shortcut and cannot hold children")]
    ParentIsShortcut { parent_id: TreeId },

    #[error("A root node already exists ({existing_root})")]
    RootAlreadyExists { existing_root: TreeId },
}

/// One placement of a content item in the site tree
///
/// # Fields
///
/// - `tree_id`: Unique identifier, stable for the node's lifetime
/// - `parent_id`: Owning node, or [`ROOT_PARENT_ID`] for top-level nodes
/// - `content_id`: External content item presented by this node
/// - `index`: Zero-based position among siblings
/// - `locked`: Structural protection flag (propagates upward)
/// - `shortcut_target`: Canonical node when this node is an alias
/// - `login_required` / `required_groups`: Access gating, inherited at creation
/// - `num_children`: Number of direct children, computed on read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub tree_id: TreeId,
    pub parent_id: TreeId,
    pub content_id: ContentId,
    pub index: i64,
    pub locked: bool,
    pub shortcut_target: Option<TreeId>,
    pub login_required: bool,
    #[serde(default)]
    pub required_groups: BTreeSet<GroupId>,
    #[serde(default)]
    pub num_children: i64,
}

impl TreeNode {
    /// Whether this node is an alias for another node
    pub fn is_shortcut(&self) -> bool {
        self.shortcut_target.is_some()
    }

    /// Whether this node sits directly under the virtual site root
    pub fn is_top_level(&self) -> bool {
        self.parent_id == ROOT_PARENT_ID
    }
}

/// Parse a tree or content identifier from caller input
///
/// Identifiers are positive integers; `0` is reserved for the root sentinel and
/// is rejected here. Use [`parse_parent_id`] where the sentinel is meaningful.
pub fn parse_tree_id(raw: &str) -> Result<TreeId, ValidationError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidId(raw.to_string())),
    }
}

/// Parse a parent identifier, accepting the root sentinel `0`
pub fn parse_parent_id(raw: &str) -> Result<TreeId, ValidationError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id >= 0 => Ok(id),
        _ => Err(ValidationError::InvalidId(raw.to_string())),
    }
}

/// Parse a comma separated identifier list (batch input)
///
/// Empty segments and non-numeric entries make the whole batch malformed.
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    raw.split(',')
        .map(|segment| {
            parse_tree_id(segment).map_err(|_| {
                ValidationError::MalformedBatch(format!(
                    "'{}' is not a valid identifier in '{}'",
                    segment.trim(),
                    raw
                ))
            })
        })
        .collect()
}

/// Ensure an identifier is a real node id (positive)
pub(crate) fn ensure_node_id(id: TreeId) -> Result<(), ValidationError> {
    if id > 0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidId(id.to_string()))
    }
}

/// Ensure an identifier is a valid parent reference (positive or root sentinel)
pub(crate) fn ensure_parent_id(id: TreeId) -> Result<(), ValidationError> {
    if id >= ROOT_PARENT_ID {
        Ok(())
    } else {
        Err(ValidationError::InvalidId(id.to_string()))
    }
}
