//! Orphan reclamation
//!
//! Deleting a node leaves its descendants pointing at a parent that no longer
//! exists, and shortcuts pointing at a target that no longer exists. Reclamation
//! removes them pass by pass (one tree level per pass) until a pass deletes
//! nothing.

use crate::db::{DatabaseError, TreeStore};
use crate::models::TreeId;
use libsql::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclaimReport {
    /// Node rows deleted
    pub removed: usize,
    /// Passes that deleted at least one row
    pub passes: usize,
    /// Surviving parents that lost a shortcut child and need compaction
    pub touched_parents: BTreeSet<TreeId>,
}

pub struct OrphanReclaimer;

impl OrphanReclaimer {
    pub async fn reclaim(conn: &Connection) -> Result<ReclaimReport, DatabaseError> {
        let mut report = ReclaimReport::default();

        loop {
            let mut removed = TreeStore::delete_orphans(conn).await? as usize;

            for (tree_id, parent_id) in TreeStore::find_dangling_shortcuts(conn).await? {
                removed += TreeStore::delete_node(conn, tree_id).await? as usize;
                report.touched_parents.insert(parent_id);
            }

            if removed == 0 {
                break;
            }

            report.passes += 1;
            report.removed += removed;
            debug!("Reclaim pass {} removed {} nodes", report.passes, removed);
        }

        let groups = TreeStore::delete_orphan_groups(conn).await?;

        // Parents deleted in a later pass need no compaction
        let mut surviving = BTreeSet::new();
        for parent_id in std::mem::take(&mut report.touched_parents) {
            if parent_id == 0 || TreeStore::node_exists(conn, parent_id).await? {
                surviving.insert(parent_id);
            }
        }
        report.touched_parents = surviving;

        if report.removed > 0 {
            warn!(
                "Reclaimed {} orphaned nodes in {} passes ({} group rows)",
                report.removed, report.passes, groups
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewTreeNode;
    use crate::tree::test_support::{create_test_db, place};

    #[tokio::test]
    async fn test_reclaim_removes_whole_subtree() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let keep = place(&conn, 0, 1, 0).await;
        let a = place(&conn, 0, 2, 1).await;
        let b = place(&conn, a, 3, 0).await;
        let c = place(&conn, b, 4, 0).await;
        place(&conn, c, 5, 0).await;

        TreeStore::delete_node(&conn, a).await.unwrap();
        let report = OrphanReclaimer::reclaim(&conn).await.unwrap();

        assert_eq!(report.removed, 3);
        assert!(report.passes >= 1);
        let remaining: Vec<_> = TreeStore::get_all_nodes(&conn)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.tree_id)
            .collect();
        assert_eq!(remaining, vec![keep]);
    }

    #[tokio::test]
    async fn test_reclaim_removes_dangling_shortcuts() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let holder = place(&conn, 0, 1, 0).await;
        let target = place(&conn, 0, 2, 1).await;
        TreeStore::insert_node(
            &conn,
            &NewTreeNode {
                parent_id: holder,
                content_id: 2,
                index: 0,
                shortcut_target: Some(target),
                login_required: false,
                required_groups: BTreeSet::new(),
            },
        )
        .await
        .unwrap();

        TreeStore::delete_node(&conn, target).await.unwrap();
        let report = OrphanReclaimer::reclaim(&conn).await.unwrap();

        assert_eq!(report.removed, 1);
        assert!(report.touched_parents.contains(&holder));
        assert!(TreeStore::get_children(&conn, holder).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_on_clean_tree_is_noop() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();
        place(&conn, 0, 1, 0).await;

        let report = OrphanReclaimer::reclaim(&conn).await.unwrap();
        assert_eq!(report, ReclaimReport::default());
    }
}
