//! Access gating of tree nodes
//!
//! A node is either public or login-gated with a set of groups. New nodes inherit
//! the gate of their parent at creation. Later changes to a node's gate are not
//! pushed down to existing descendants.

use crate::db::TreeStore;
use crate::models::{ContentId, ContentTypeId, GroupId, TreeId, TreeNode, ROOT_PARENT_ID};
use crate::services::{ContentStore, TreeServiceError};
use libsql::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Access settings a new child receives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritedAccess {
    pub login_required: bool,
    pub required_groups: BTreeSet<GroupId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessDecision {
    Granted,
    Denied,
}

impl AccessDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

pub struct AccessController {
    content: Arc<dyn ContentStore>,
    login_gate_content_type: Option<ContentTypeId>,
}

impl AccessController {
    pub fn new(content: Arc<dyn ContentStore>, login_gate_content_type: Option<ContentTypeId>) -> Self {
        Self {
            content,
            login_gate_content_type,
        }
    }

    /// Gate for a node presenting `content_id` about to be placed under `parent_id`
    ///
    /// The child inherits the parent's login flag and groups (children of the
    /// virtual root start public), unless its own content is of the login gate
    /// type, which always requires login.
    pub async fn compute_inherited_access(
        &self,
        conn: &Connection,
        parent_id: TreeId,
        content_id: ContentId,
    ) -> Result<InheritedAccess, TreeServiceError> {
        let mut access = if parent_id == ROOT_PARENT_ID {
            InheritedAccess::default()
        } else {
            let parent = TreeStore::get_node(conn, parent_id)
                .await?
                .ok_or_else(|| TreeServiceError::node_not_found(parent_id))?;
            InheritedAccess {
                login_required: parent.login_required,
                required_groups: parent.required_groups,
            }
        };

        if let Some(gate_type) = self.login_gate_content_type {
            let child_type = self
                .content
                .get_content_item(content_id)
                .await?
                .map(|item| item.content_type_id);
            if child_type == Some(gate_type) {
                access.login_required = true;
            }
        }

        Ok(access)
    }

    /// Replace the groups of one node; login is required iff groups are present
    ///
    /// Descendants keep their current gate.
    pub async fn set_access(
        conn: &Connection,
        tree_id: TreeId,
        required_groups: &BTreeSet<GroupId>,
    ) -> Result<TreeNode, TreeServiceError> {
        if !TreeStore::node_exists(conn, tree_id).await? {
            return Err(TreeServiceError::node_not_found(tree_id));
        }

        TreeStore::replace_groups(conn, tree_id, required_groups).await?;
        TreeStore::set_login_required(conn, tree_id, !required_groups.is_empty()).await?;
        debug!(
            "Set access of node {} to groups {:?}",
            tree_id, required_groups
        );

        TreeStore::get_node(conn, tree_id)
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(tree_id))
    }

    /// Whether a user holding `user_groups` may open `node`
    pub fn check_access(node: &TreeNode, user_groups: &BTreeSet<GroupId>) -> AccessDecision {
        if !node.login_required || !node.required_groups.is_disjoint(user_groups) {
            AccessDecision::Granted
        } else {
            AccessDecision::Denied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewTreeNode;
    use crate::models::ContentItem;
    use crate::services::InMemoryContentStore;
    use crate::tree::test_support::{create_test_db, place};

    fn groups(ids: &[GroupId]) -> BTreeSet<GroupId> {
        ids.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_children_inherit_parent_gate() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();
        let store = Arc::new(InMemoryContentStore::with_items([ContentItem::new(1, "a", 1)]));
        let access = AccessController::new(store, None);

        let parent = TreeStore::insert_node(
            &conn,
            &NewTreeNode {
                parent_id: 0,
                content_id: 1,
                index: 0,
                shortcut_target: None,
                login_required: true,
                required_groups: groups(&[4]),
            },
        )
        .await
        .unwrap();

        let inherited = access.compute_inherited_access(&conn, parent, 1).await.unwrap();
        assert!(inherited.login_required);
        assert_eq!(inherited.required_groups, groups(&[4]));

        let top = access.compute_inherited_access(&conn, 0, 1).await.unwrap();
        assert_eq!(top, InheritedAccess::default());
    }

    #[tokio::test]
    async fn test_login_gate_content_type_forces_login() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();
        let store = Arc::new(InMemoryContentStore::with_items([
            ContentItem::new(1, "about", 1),
            ContentItem::new(2, "members", 9),
        ]));
        let access = AccessController::new(store, Some(9));

        // A gate page is gated wherever it lands, top level included
        let top = access.compute_inherited_access(&conn, 0, 2).await.unwrap();
        assert!(top.login_required);
        assert!(top.required_groups.is_empty());

        let public = place(&conn, 0, 1, 0).await;
        let nested = access.compute_inherited_access(&conn, public, 2).await.unwrap();
        assert!(nested.login_required);

        // Ordinary content under a public page stays public
        let plain = access.compute_inherited_access(&conn, public, 1).await.unwrap();
        assert!(!plain.login_required);
    }

    #[tokio::test]
    async fn test_cleared_gate_page_does_not_gate_new_children() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();
        let store = Arc::new(InMemoryContentStore::with_items([
            ContentItem::new(1, "page", 1),
            ContentItem::new(2, "members", 9),
        ]));
        let access = AccessController::new(store, Some(9));

        let gate = TreeStore::insert_node(
            &conn,
            &NewTreeNode {
                parent_id: 0,
                content_id: 2,
                index: 0,
                shortcut_target: None,
                login_required: true,
                required_groups: BTreeSet::new(),
            },
        )
        .await
        .unwrap();
        AccessController::set_access(&conn, gate, &BTreeSet::new()).await.unwrap();

        let child = access.compute_inherited_access(&conn, gate, 1).await.unwrap();
        assert!(!child.login_required);
    }

    #[tokio::test]
    async fn test_set_access_toggles_login_without_cascade() {
        let (db, _temp) = create_test_db().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let parent = place(&conn, 0, 1, 0).await;
        let child = place(&conn, parent, 2, 0).await;

        let updated = AccessController::set_access(&conn, parent, &groups(&[1, 2])).await.unwrap();
        assert!(updated.login_required);
        assert_eq!(updated.required_groups, groups(&[1, 2]));

        let child_node = TreeStore::get_node(&conn, child).await.unwrap().unwrap();
        assert!(!child_node.login_required);

        let cleared = AccessController::set_access(&conn, parent, &BTreeSet::new()).await.unwrap();
        assert!(!cleared.login_required);
    }

    #[test]
    fn test_check_access() {
        let mut node = TreeNode {
            tree_id: 1,
            parent_id: 0,
            content_id: 1,
            index: 0,
            locked: false,
            shortcut_target: None,
            login_required: false,
            required_groups: BTreeSet::new(),
            num_children: 0,
        };
        assert_eq!(AccessController::check_access(&node, &groups(&[])), AccessDecision::Granted);

        node.login_required = true;
        node.required_groups = groups(&[3]);
        assert_eq!(AccessController::check_access(&node, &groups(&[1])), AccessDecision::Denied);
        assert!(AccessController::check_access(&node, &groups(&[1, 3])).is_granted());
    }
}
