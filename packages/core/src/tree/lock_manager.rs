//! Structural locks
//!
//! Locking marks a node and every ancestor, so a lock anywhere in a subtree is
//! visible at each containing level. Unlocking goes one node at a time from the
//! bottom up: a node with a locked child stays locked.

use crate::db::TreeStore;
use crate::models::TreeId;
use crate::services::TreeServiceError;
use crate::tree::path_resolver::walk_ancestors;
use libsql::Connection;
use tracing::debug;

pub struct LockManager {
    max_hops: usize,
}

impl LockManager {
    pub fn new(max_hops: usize) -> Self {
        Self { max_hops }
    }

    /// Lock `tree_id` and its ancestors; returns the nodes that changed
    pub async fn lock(
        &self,
        conn: &Connection,
        tree_id: TreeId,
    ) -> Result<Vec<TreeId>, TreeServiceError> {
        if !TreeStore::node_exists(conn, tree_id).await? {
            return Err(TreeServiceError::node_not_found(tree_id));
        }

        let chain = walk_ancestors(conn, tree_id, self.max_hops)
            .await?
            .ok_or(TreeServiceError::CorruptHierarchy { tree_id })?;

        let mut changed = Vec::new();
        for node_id in chain {
            let node = TreeStore::get_node(conn, node_id)
                .await?
                .ok_or_else(|| TreeServiceError::node_not_found(node_id))?;
            if !node.locked {
                TreeStore::set_locked(conn, node_id, true).await?;
                changed.push(node_id);
            }
        }

        debug!("Locked node {} ({} nodes changed)", tree_id, changed.len());
        Ok(changed)
    }

    /// Unlock `tree_id` alone; refused while any direct child is locked
    pub async fn unlock(&self, conn: &Connection, tree_id: TreeId) -> Result<(), TreeServiceError> {
        if !TreeStore::node_exists(conn, tree_id).await? {
            return Err(TreeServiceError::node_not_found(tree_id));
        }

        let locked_children = TreeStore::count_locked_children(conn, tree_id).await?;
        if locked_children > 0 {
            return Err(TreeServiceError::LockConflict {
                tree_id,
                locked_children,
            });
        }

        TreeStore::set_locked(conn, tree_id, false).await?;
        debug!("Unlocked node {}", tree_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_support::{create_test_db, place};

    async fn is_locked(conn: &Connection, tree_id: TreeId) -> bool {
        TreeStore::get_node(conn, tree_id).await.unwrap().unwrap().locked
    }

    #[tokio::test]
    async fn test_lock_propagates_upward() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();
        let locks = LockManager::new(1000);

        let a = place(&conn, 0, 1, 0).await;
        let b = place(&conn, a, 2, 0).await;
        let c = place(&conn, b, 3, 0).await;
        let sibling = place(&conn, a, 4, 1).await;

        let changed = locks.lock(&conn, c).await.unwrap();
        assert_eq!(changed, vec![c, b, a]);
        assert!(is_locked(&conn, a).await);
        assert!(!is_locked(&conn, sibling).await);

        // Already locked ancestors are left alone
        let changed = locks.lock(&conn, sibling).await.unwrap();
        assert_eq!(changed, vec![sibling]);
    }

    #[tokio::test]
    async fn test_unlock_guard() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();
        let locks = LockManager::new(1000);

        let a = place(&conn, 0, 1, 0).await;
        let b = place(&conn, a, 2, 0).await;
        locks.lock(&conn, b).await.unwrap();

        assert!(matches!(
            locks.unlock(&conn, a).await,
            Err(TreeServiceError::LockConflict { locked_children: 1, .. })
        ));
        assert!(is_locked(&conn, a).await);
        assert!(is_locked(&conn, b).await);

        locks.unlock(&conn, b).await.unwrap();
        locks.unlock(&conn, a).await.unwrap();
        assert!(!is_locked(&conn, a).await);
        assert!(!is_locked(&conn, b).await);
    }

    #[tokio::test]
    async fn test_lock_missing_node() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();

        assert!(matches!(
            LockManager::new(1000).lock(&conn, 55).await,
            Err(TreeServiceError::NodeNotFound { tree_id: 55 })
        ));
    }
}
