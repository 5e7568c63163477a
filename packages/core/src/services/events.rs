//! Tree Events
//!
//! Events announced on a `tokio::sync::broadcast` channel after a mutation
//! commits. Subscribers (live views, search indexers) receive them without
//! coupling to the mutation code.

use crate::models::{MutationOutcome, MutationRecord, TreeId, TreeNode};
use serde::Serialize;

/// Committed structural change
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeEvent {
    #[serde(rename_all = "camelCase")]
    NodesInserted { nodes: Vec<TreeNode> },

    #[serde(rename_all = "camelCase")]
    NodesMoved {
        moved: Vec<TreeId>,
        touched_parents: Vec<TreeId>,
    },

    #[serde(rename_all = "camelCase")]
    NodesRemoved { removed: Vec<TreeId>, reclaimed: usize },

    #[serde(rename_all = "camelCase")]
    LockChanged { tree_ids: Vec<TreeId>, locked: bool },

    #[serde(rename_all = "camelCase")]
    AccessChanged { node: TreeNode },

    #[serde(rename_all = "camelCase")]
    TreeRepaired {
        reclaimed: usize,
        normalized_parents: usize,
    },
}

impl TreeEvent {
    pub fn event_type(&self) -> &str {
        match self {
            TreeEvent::NodesInserted { .. } => "tree:inserted",
            TreeEvent::NodesMoved { .. } => "tree:moved",
            TreeEvent::NodesRemoved { .. } => "tree:removed",
            TreeEvent::LockChanged { .. } => "tree:lock-changed",
            TreeEvent::AccessChanged { .. } => "tree:access-changed",
            TreeEvent::TreeRepaired { .. } => "tree:repaired",
        }
    }

    pub fn from_record(record: &MutationRecord) -> Self {
        match &record.outcome {
            MutationOutcome::Inserted(report) => TreeEvent::NodesInserted {
                nodes: report.nodes.clone(),
            },
            MutationOutcome::Moved(report) => TreeEvent::NodesMoved {
                moved: report.moved.clone(),
                touched_parents: report.children.keys().copied().collect(),
            },
            MutationOutcome::Removed(report) => TreeEvent::NodesRemoved {
                removed: report.removed.clone(),
                reclaimed: report.reclaimed,
            },
            MutationOutcome::Locked { changed } => TreeEvent::LockChanged {
                tree_ids: changed.clone(),
                locked: true,
            },
            MutationOutcome::Unlocked { tree_id } => TreeEvent::LockChanged {
                tree_ids: vec![*tree_id],
                locked: false,
            },
            MutationOutcome::AccessChanged(node) => TreeEvent::AccessChanged { node: node.clone() },
            MutationOutcome::Repaired(report) => TreeEvent::TreeRepaired {
                reclaimed: report.reclaimed,
                normalized_parents: report.normalized_parents,
            },
        }
    }
}
