//! Mutation descriptions and outcomes
//!
//! Every structural change is described by a [`Mutation`] value. Hooks receive it
//! before the transaction starts and may rewrite it; the coordinator executes
//! whatever comes back and reports a [`MutationOutcome`].

use super::tree_node::{ContentId, GroupId, TreeId, TreeNode};
use super::principal::PrincipalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Discriminant of a mutation, used for logging and hook dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Insert,
    Move,
    Remove,
    CreateShortcut,
    Lock,
    Unlock,
    SetAccess,
    Repair,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Insert => "insert",
            MutationKind::Move => "move",
            MutationKind::Remove => "remove",
            MutationKind::CreateShortcut => "create_shortcut",
            MutationKind::Lock => "lock",
            MutationKind::Unlock => "unlock",
            MutationKind::SetAccess => "set_access",
            MutationKind::Repair => "repair",
        }
    }
}

/// A node to relocate, together with where the caller believes it lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItem {
    pub tree_id: TreeId,
    pub old_parent_id: TreeId,
    /// Informational; the normalized position is authoritative
    #[serde(default)]
    pub old_index: Option<i64>,
}

impl MoveItem {
    pub fn new(tree_id: TreeId, old_parent_id: TreeId) -> Self {
        Self {
            tree_id,
            old_parent_id,
            old_index: None,
        }
    }
}

/// A requested structural change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Mutation {
    /// Place content items under `parent_id` starting at `index`
    ///
    /// With `batch = false` a duplicate placement is a conflict; with
    /// `batch = true` duplicates are skipped.
    #[serde(rename_all = "camelCase")]
    Insert {
        content_ids: Vec<ContentId>,
        parent_id: TreeId,
        index: i64,
        batch: bool,
    },

    #[serde(rename_all = "camelCase")]
    Move {
        items: Vec<MoveItem>,
        new_parent_id: TreeId,
        new_index: i64,
        batch: bool,
    },

    #[serde(rename_all = "camelCase")]
    Remove { tree_ids: Vec<TreeId> },

    #[serde(rename_all = "camelCase")]
    CreateShortcut {
        target_id: TreeId,
        content_id: ContentId,
        parent_id: TreeId,
        index: i64,
    },

    #[serde(rename_all = "camelCase")]
    Lock { tree_id: TreeId },

    #[serde(rename_all = "camelCase")]
    Unlock { tree_id: TreeId },

    #[serde(rename_all = "camelCase")]
    SetAccess {
        tree_id: TreeId,
        required_groups: BTreeSet<GroupId>,
    },

    Repair,
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Insert { .. } => MutationKind::Insert,
            Mutation::Move { .. } => MutationKind::Move,
            Mutation::Remove { .. } => MutationKind::Remove,
            Mutation::CreateShortcut { .. } => MutationKind::CreateShortcut,
            Mutation::Lock { .. } => MutationKind::Lock,
            Mutation::Unlock { .. } => MutationKind::Unlock,
            Mutation::SetAccess { .. } => MutationKind::SetAccess,
            Mutation::Repair => MutationKind::Repair,
        }
    }
}

/// Result of an insert operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertReport {
    pub nodes: Vec<TreeNode>,
    /// Content ids skipped as duplicates (batch inserts only)
    pub skipped: Vec<ContentId>,
}

/// Result of a move operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveReport {
    pub moved: Vec<TreeId>,
    /// Items skipped because their content already lives under the new parent
    pub skipped: Vec<TreeId>,
    /// Children of every parent touched by the move, after the move
    pub children: BTreeMap<TreeId, Vec<TreeNode>>,
}

/// Result of a remove operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReport {
    pub removed: Vec<TreeId>,
    /// Descendants and dangling shortcuts deleted by orphan reclamation
    pub reclaimed: usize,
}

/// Result of a repair pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub reclaimed: usize,
    pub normalized_parents: usize,
}

/// What a committed mutation changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum MutationOutcome {
    Inserted(InsertReport),
    Moved(MoveReport),
    Removed(RemoveReport),
    #[serde(rename_all = "camelCase")]
    Locked { changed: Vec<TreeId> },
    #[serde(rename_all = "camelCase")]
    Unlocked { tree_id: TreeId },
    AccessChanged(TreeNode),
    Repaired(RepairReport),
}

/// A committed mutation, handed to the notifier and event subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub mutation: Mutation,
    pub outcome: MutationOutcome,
    pub principal_id: PrincipalId,
    pub committed_at: DateTime<Utc>,
}
