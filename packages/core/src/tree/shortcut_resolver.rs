//! Alias (shortcut) resolution
//!
//! A shortcut node points at a canonical node through `shortcut_target`. Chains
//! are rejected when a shortcut is created; if one shows up anyway (corrupt
//! data), resolution fails fast instead of following it.

use crate::db::TreeStore;
use crate::models::{TreeId, TreeNode, ValidationError};
use crate::services::TreeServiceError;
use libsql::Connection;
use tracing::warn;

pub struct ShortcutResolver;

impl ShortcutResolver {
    /// Canonical node presented by `node`
    ///
    /// Non-shortcut nodes resolve to themselves. Returns `None` (and logs) when
    /// the target is missing or is itself a shortcut.
    pub async fn resolve(
        conn: &Connection,
        node: TreeNode,
    ) -> Result<Option<TreeNode>, TreeServiceError> {
        let Some(target_id) = node.shortcut_target else {
            return Ok(Some(node));
        };

        match TreeStore::get_node(conn, target_id).await? {
            None => {
                warn!(
                    "Shortcut {} points at missing node {}",
                    node.tree_id, target_id
                );
                Ok(None)
            }
            Some(target) if target.is_shortcut() => {
                warn!(
                    "Shortcut {} points at another shortcut {}; refusing to follow chain",
                    node.tree_id, target_id
                );
                Ok(None)
            }
            Some(target) => Ok(Some(target)),
        }
    }

    /// Resolve by id; `None` when the node itself does not exist
    pub async fn resolve_id(
        conn: &Connection,
        tree_id: TreeId,
    ) -> Result<Option<TreeNode>, TreeServiceError> {
        match TreeStore::get_node(conn, tree_id).await? {
            Some(node) => Self::resolve(conn, node).await,
            None => Ok(None),
        }
    }

    /// Check that `target_id` may receive a new shortcut
    pub async fn validate_target(
        conn: &Connection,
        target_id: TreeId,
    ) -> Result<TreeNode, TreeServiceError> {
        let target = TreeStore::get_node(conn, target_id)
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(target_id))?;

        if target.is_shortcut() {
            return Err(ValidationError::ShortcutChain { target_id }.into());
        }

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewTreeNode;
    use crate::tree::test_support::{create_test_db, place};
    use std::collections::BTreeSet;

    async fn place_shortcut(conn: &Connection, parent_id: TreeId, target: TreeId) -> TreeId {
        TreeStore::insert_node(
            conn,
            &NewTreeNode {
                parent_id,
                content_id: 99,
                index: 0,
                shortcut_target: Some(target),
                login_required: false,
                required_groups: BTreeSet::new(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_follows_one_hop() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let target = place(&conn, 0, 1, 0).await;
        let alias = place_shortcut(&conn, 0, target).await;

        let resolved = ShortcutResolver::resolve_id(&conn, alias).await.unwrap().unwrap();
        assert_eq!(resolved.tree_id, target);

        let plain = ShortcutResolver::resolve_id(&conn, target).await.unwrap().unwrap();
        assert_eq!(plain.tree_id, target);
    }

    #[tokio::test]
    async fn test_resolve_fails_fast_on_chain_and_missing_target() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let target = place(&conn, 0, 1, 0).await;
        let first = place_shortcut(&conn, 0, target).await;
        let chained = place_shortcut(&conn, 0, first).await;
        let dangling = place_shortcut(&conn, 0, 12345).await;

        assert!(ShortcutResolver::resolve_id(&conn, chained).await.unwrap().is_none());
        assert!(ShortcutResolver::resolve_id(&conn, dangling).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validate_target_rejects_shortcut() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let target = place(&conn, 0, 1, 0).await;
        let alias = place_shortcut(&conn, 0, target).await;

        assert!(ShortcutResolver::validate_target(&conn, target).await.is_ok());
        assert!(matches!(
            ShortcutResolver::validate_target(&conn, alias).await,
            Err(TreeServiceError::ValidationFailed(ValidationError::ShortcutChain { .. }))
        ));
        assert!(matches!(
            ShortcutResolver::validate_target(&conn, 777).await,
            Err(TreeServiceError::NodeNotFound { tree_id: 777 })
        ));
    }
}
