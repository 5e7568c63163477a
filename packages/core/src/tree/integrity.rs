//! Read-only integrity audit of the whole tree
//!
//! Loads every node once and checks the structural rules the mutation paths
//! maintain. Used by the audit tool and by tests after arbitrary operation
//! sequences.

use crate::db::TreeStore;
use crate::models::{TreeId, TreeNode, ROOT_PARENT_ID};
use crate::services::{ContentStore, TreeServiceError};
use libsql::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub node_count: usize,
    /// Number of nodes directly under the virtual root
    pub root_count: usize,
    /// Parents whose children are not indexed `0..n-1`
    pub index_gaps: Vec<TreeId>,
    /// Nodes whose non-zero parent does not exist
    pub dangling_parents: Vec<TreeId>,
    /// Shortcuts with a missing target or a shortcut target
    pub invalid_shortcuts: Vec<TreeId>,
    /// Locked nodes below an unlocked parent
    pub lock_violations: Vec<TreeId>,
    /// Parents holding more children than their content allows
    pub capacity_violations: Vec<TreeId>,
    /// More than one top-level node while a single root is required
    pub single_root_violated: bool,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.index_gaps.is_empty()
            && self.dangling_parents.is_empty()
            && self.invalid_shortcuts.is_empty()
            && self.lock_violations.is_empty()
            && self.capacity_violations.is_empty()
            && !self.single_root_violated
    }
}

pub struct IntegrityAuditor {
    content: Arc<dyn ContentStore>,
    single_root: bool,
}

impl IntegrityAuditor {
    pub fn new(content: Arc<dyn ContentStore>, single_root: bool) -> Self {
        Self {
            content,
            single_root,
        }
    }

    pub async fn audit(&self, conn: &Connection) -> Result<IntegrityReport, TreeServiceError> {
        let nodes = TreeStore::get_all_nodes(conn).await?;
        let by_id: HashMap<TreeId, &TreeNode> = nodes.iter().map(|n| (n.tree_id, n)).collect();

        let mut siblings: BTreeMap<TreeId, Vec<i64>> = BTreeMap::new();
        for node in &nodes {
            siblings.entry(node.parent_id).or_default().push(node.index);
        }

        let mut report = IntegrityReport {
            node_count: nodes.len(),
            root_count: siblings.get(&ROOT_PARENT_ID).map_or(0, Vec::len),
            ..IntegrityReport::default()
        };

        for (parent_id, indices) in &mut siblings {
            indices.sort_unstable();
            let contiguous = indices.iter().enumerate().all(|(i, index)| *index == i as i64);
            if !contiguous {
                report.index_gaps.push(*parent_id);
            }
        }

        for node in &nodes {
            let parent = by_id.get(&node.parent_id);

            if node.parent_id != ROOT_PARENT_ID && parent.is_none() {
                report.dangling_parents.push(node.tree_id);
            }

            if let Some(target_id) = node.shortcut_target {
                let valid = by_id
                    .get(&target_id)
                    .is_some_and(|target| !target.is_shortcut());
                if !valid {
                    report.invalid_shortcuts.push(node.tree_id);
                }
            }

            if node.locked {
                if let Some(parent) = parent {
                    if !parent.locked {
                        report.lock_violations.push(node.tree_id);
                    }
                }
            }

            if node.num_children > 0 {
                if let Some(item) = self.content.get_content_item(node.content_id).await? {
                    if let Some(max_children) = item.capacity() {
                        if node.num_children as usize > max_children {
                            report.capacity_violations.push(node.tree_id);
                        }
                    }
                }
            }
        }

        report.single_root_violated = self.single_root && report.root_count > 1;

        if !report.is_clean() {
            warn!(
                "Integrity audit found problems: {} index gaps, {} dangling parents, {} invalid shortcuts, {} lock violations, {} capacity violations",
                report.index_gaps.len(),
                report.dangling_parents.len(),
                report.invalid_shortcuts.len(),
                report.lock_violations.len(),
                report.capacity_violations.len()
            );
        }

        Ok(report)
    }
}
