//! TreeStore - SQL statements for tree rows
//!
//! Every function takes a `&libsql::Connection` so that it runs inside whatever
//! transaction the caller opened. A `libsql::Transaction` dereferences to a
//! connection, so `&tx` can be passed directly.
//!
//! # Row Format
//!
//! Node queries select, in order:
//! - tree_id (INTEGER)
//! - parent_id (INTEGER)
//! - content_id (INTEGER)
//! - sort_index (INTEGER)
//! - locked (INTEGER 0/1)
//! - shortcut_target (INTEGER, nullable)
//! - login_required (INTEGER 0/1)
//! - num_children (INTEGER, computed by subquery)

use crate::db::DatabaseError;
use crate::models::{ContentId, GroupId, TreeId, TreeNode};
use libsql::{Connection, Row, Rows};
use std::collections::BTreeSet;

const NODE_COLUMNS: &str = "n.tree_id, n.parent_id, n.content_id, n.sort_index, n.locked, \
     n.shortcut_target, n.login_required, \
     (SELECT COUNT(*) FROM tree_nodes c WHERE c.parent_id = n.tree_id) AS num_children";

/// Exclusion value meaning "exclude nothing"; tree ids start at 1
const NO_EXCLUSION: TreeId = 0;

/// Fields of a node about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTreeNode {
    pub parent_id: TreeId,
    pub content_id: ContentId,
    pub index: i64,
    pub shortcut_target: Option<TreeId>,
    pub login_required: bool,
    pub required_groups: BTreeSet<GroupId>,
}

fn sql_error(action: &'static str) -> impl FnOnce(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::sql_execution(format!("Failed to {}: {}", action, e))
}

/// Stateless collection of tree SQL operations
pub struct TreeStore;

impl TreeStore {
    /// Convert a libsql row to a `TreeNode` (groups are loaded separately)
    fn row_to_node(row: &Row) -> Result<TreeNode, DatabaseError> {
        let tree_id: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::row_decode("tree_id", e))?;
        let parent_id: i64 = row
            .get(1)
            .map_err(|e| DatabaseError::row_decode("parent_id", e))?;
        let content_id: i64 = row
            .get(2)
            .map_err(|e| DatabaseError::row_decode("content_id", e))?;
        let index: i64 = row
            .get(3)
            .map_err(|e| DatabaseError::row_decode("sort_index", e))?;
        let locked: i64 = row
            .get(4)
            .map_err(|e| DatabaseError::row_decode("locked", e))?;
        let shortcut_target: Option<i64> = row
            .get(5)
            .map_err(|e| DatabaseError::row_decode("shortcut_target", e))?;
        let login_required: i64 = row
            .get(6)
            .map_err(|e| DatabaseError::row_decode("login_required", e))?;
        let num_children: i64 = row
            .get(7)
            .map_err(|e| DatabaseError::row_decode("num_children", e))?;

        Ok(TreeNode {
            tree_id,
            parent_id,
            content_id,
            index,
            locked: locked != 0,
            shortcut_target,
            login_required: login_required != 0,
            required_groups: BTreeSet::new(),
            num_children,
        })
    }

    async fn collect_nodes(conn: &Connection, mut rows: Rows) -> Result<Vec<TreeNode>, DatabaseError> {
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_error("fetch node row"))? {
            nodes.push(Self::row_to_node(&row)?);
        }

        for node in &mut nodes {
            node.required_groups = Self::get_groups(conn, node.tree_id).await?;
        }

        Ok(nodes)
    }

    async fn collect_ids(mut rows: Rows) -> Result<Vec<i64>, DatabaseError> {
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_error("fetch id row"))? {
            ids.push(row.get::<i64>(0).map_err(|e| DatabaseError::row_decode("id", e))?);
        }
        Ok(ids)
    }

    async fn query_count(
        conn: &Connection,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = conn.query(sql, params).await.map_err(sql_error("count rows"))?;
        match rows.next().await.map_err(sql_error("fetch count"))? {
            Some(row) => row.get::<i64>(0).map_err(|e| DatabaseError::row_decode("count", e)),
            None => Ok(0),
        }
    }

    //
    // READS
    //

    /// Fetch one node with its required groups
    pub async fn get_node(conn: &Connection, tree_id: TreeId) -> Result<Option<TreeNode>, DatabaseError> {
        let rows = conn
            .query(
                &format!("SELECT {} FROM tree_nodes n WHERE n.tree_id = ?", NODE_COLUMNS),
                [tree_id],
            )
            .await
            .map_err(sql_error("query node"))?;

        Ok(Self::collect_nodes(conn, rows).await?.into_iter().next())
    }

    /// Parent reference of a node without loading the full row
    pub async fn get_parent_id(conn: &Connection, tree_id: TreeId) -> Result<Option<TreeId>, DatabaseError> {
        let rows = conn
            .query("SELECT parent_id FROM tree_nodes WHERE tree_id = ?", [tree_id])
            .await
            .map_err(sql_error("query parent id"))?;

        Ok(Self::collect_ids(rows).await?.into_iter().next())
    }

    /// `(parent_id, content_id)` of a node, the minimum needed for upward walks
    pub async fn get_link(
        conn: &Connection,
        tree_id: TreeId,
    ) -> Result<Option<(TreeId, ContentId)>, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT parent_id, content_id FROM tree_nodes WHERE tree_id = ?",
                [tree_id],
            )
            .await
            .map_err(sql_error("query node link"))?;

        match rows.next().await.map_err(sql_error("fetch node link"))? {
            Some(row) => {
                let parent_id: i64 = row.get(0).map_err(|e| DatabaseError::row_decode("parent_id", e))?;
                let content_id: i64 = row.get(1).map_err(|e| DatabaseError::row_decode("content_id", e))?;
                Ok(Some((parent_id, content_id)))
            }
            None => Ok(None),
        }
    }

    /// `(tree_id, sort_index)` of direct children in sibling order
    pub async fn get_child_positions(
        conn: &Connection,
        parent_id: TreeId,
        exclude: Option<TreeId>,
    ) -> Result<Vec<(TreeId, i64)>, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT tree_id, sort_index FROM tree_nodes WHERE parent_id = ? AND tree_id != ?
                 ORDER BY sort_index, tree_id",
                (parent_id, exclude.unwrap_or(NO_EXCLUSION)),
            )
            .await
            .map_err(sql_error("query child positions"))?;

        let mut positions = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_error("fetch child position"))? {
            let tree_id: i64 = row.get(0).map_err(|e| DatabaseError::row_decode("tree_id", e))?;
            let index: i64 = row.get(1).map_err(|e| DatabaseError::row_decode("sort_index", e))?;
            positions.push((tree_id, index));
        }
        Ok(positions)
    }

    pub async fn node_exists(conn: &Connection, tree_id: TreeId) -> Result<bool, DatabaseError> {
        let count = Self::query_count(
            conn,
            "SELECT COUNT(*) FROM tree_nodes WHERE tree_id = ?",
            [tree_id],
        )
        .await?;
        Ok(count > 0)
    }

    /// Direct children ordered by sibling index (ties broken by tree id)
    pub async fn get_children(conn: &Connection, parent_id: TreeId) -> Result<Vec<TreeNode>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM tree_nodes n WHERE n.parent_id = ? ORDER BY n.sort_index, n.tree_id",
                    NODE_COLUMNS
                ),
                [parent_id],
            )
            .await
            .map_err(sql_error("query children"))?;

        Self::collect_nodes(conn, rows).await
    }

    /// Ids of direct children in sibling order, optionally excluding one node
    pub async fn get_child_ids(
        conn: &Connection,
        parent_id: TreeId,
        exclude: Option<TreeId>,
    ) -> Result<Vec<TreeId>, DatabaseError> {
        let rows = conn
            .query(
                "SELECT tree_id FROM tree_nodes WHERE parent_id = ? AND tree_id != ?
                 ORDER BY sort_index, tree_id",
                (parent_id, exclude.unwrap_or(NO_EXCLUSION)),
            )
            .await
            .map_err(sql_error("query child ids"))?;

        Self::collect_ids(rows).await
    }

    pub async fn count_children(
        conn: &Connection,
        parent_id: TreeId,
        exclude: Option<TreeId>,
    ) -> Result<i64, DatabaseError> {
        Self::query_count(
            conn,
            "SELECT COUNT(*) FROM tree_nodes WHERE parent_id = ? AND tree_id != ?",
            (parent_id, exclude.unwrap_or(NO_EXCLUSION)),
        )
        .await
    }

    /// Number of direct children that are locked
    pub async fn count_locked_children(conn: &Connection, parent_id: TreeId) -> Result<i64, DatabaseError> {
        Self::query_count(
            conn,
            "SELECT COUNT(*) FROM tree_nodes WHERE parent_id = ? AND locked = 1",
            [parent_id],
        )
        .await
    }

    /// Placement of `content_id` directly under `parent_id`, if any
    pub async fn find_content_under(
        conn: &Connection,
        parent_id: TreeId,
        content_id: ContentId,
        exclude: Option<TreeId>,
    ) -> Result<Option<TreeId>, DatabaseError> {
        let rows = conn
            .query(
                "SELECT tree_id FROM tree_nodes
                 WHERE parent_id = ? AND content_id = ? AND tree_id != ?
                 ORDER BY tree_id LIMIT 1",
                (parent_id, content_id, exclude.unwrap_or(NO_EXCLUSION)),
            )
            .await
            .map_err(sql_error("query content placement"))?;

        Ok(Self::collect_ids(rows).await?.into_iter().next())
    }

    /// Every placement of a content item, ordered by tree id
    pub async fn find_by_content(conn: &Connection, content_id: ContentId) -> Result<Vec<TreeNode>, DatabaseError> {
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM tree_nodes n WHERE n.content_id = ? ORDER BY n.tree_id",
                    NODE_COLUMNS
                ),
                [content_id],
            )
            .await
            .map_err(sql_error("query placements"))?;

        Self::collect_nodes(conn, rows).await
    }

    /// Every node, ordered by tree id
    pub async fn get_all_nodes(conn: &Connection) -> Result<Vec<TreeNode>, DatabaseError> {
        let rows = conn
            .query(
                &format!("SELECT {} FROM tree_nodes n ORDER BY n.tree_id", NODE_COLUMNS),
                (),
            )
            .await
            .map_err(sql_error("query all nodes"))?;

        Self::collect_nodes(conn, rows).await
    }

    /// Distinct parent references currently in use (including the root sentinel)
    pub async fn get_parent_ids(conn: &Connection) -> Result<Vec<TreeId>, DatabaseError> {
        let rows = conn
            .query(
                "SELECT DISTINCT parent_id FROM tree_nodes ORDER BY parent_id",
                (),
            )
            .await
            .map_err(sql_error("query parent ids"))?;

        Self::collect_ids(rows).await
    }

    pub async fn get_groups(conn: &Connection, tree_id: TreeId) -> Result<BTreeSet<GroupId>, DatabaseError> {
        let rows = conn
            .query(
                "SELECT group_id FROM tree_node_groups WHERE tree_id = ? ORDER BY group_id",
                [tree_id],
            )
            .await
            .map_err(sql_error("query groups"))?;

        Ok(Self::collect_ids(rows).await?.into_iter().collect())
    }

    //
    // WRITES
    //

    /// Insert a node row and its group rows, returning the new tree id
    pub async fn insert_node(conn: &Connection, node: &NewTreeNode) -> Result<TreeId, DatabaseError> {
        let rows = conn
            .query(
                "INSERT INTO tree_nodes (parent_id, content_id, sort_index, locked, shortcut_target, login_required)
                 VALUES (?, ?, ?, 0, ?, ?)
                 RETURNING tree_id",
                (
                    node.parent_id,
                    node.content_id,
                    node.index,
                    node.shortcut_target,
                    i64::from(node.login_required),
                ),
            )
            .await
            .map_err(sql_error("insert node"))?;

        let tree_id = Self::collect_ids(rows)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::sql_execution("Insert returned no tree id"))?;

        Self::replace_groups(conn, tree_id, &node.required_groups).await?;

        Ok(tree_id)
    }

    pub async fn set_index(conn: &Connection, tree_id: TreeId, index: i64) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE tree_nodes SET sort_index = ? WHERE tree_id = ?",
            (index, tree_id),
        )
        .await
        .map_err(sql_error("update sibling index"))?;
        Ok(())
    }

    pub async fn set_placement(
        conn: &Connection,
        tree_id: TreeId,
        parent_id: TreeId,
        index: i64,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE tree_nodes SET parent_id = ?, sort_index = ? WHERE tree_id = ?",
            (parent_id, index, tree_id),
        )
        .await
        .map_err(sql_error("update placement"))?;
        Ok(())
    }

    /// Add `delta` to the index of children at or after `from_index`
    pub async fn shift_indices(
        conn: &Connection,
        parent_id: TreeId,
        from_index: i64,
        delta: i64,
        exclude: Option<TreeId>,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE tree_nodes SET sort_index = sort_index + ?
             WHERE parent_id = ? AND sort_index >= ? AND tree_id != ?",
            (delta, parent_id, from_index, exclude.unwrap_or(NO_EXCLUSION)),
        )
        .await
        .map_err(sql_error("shift sibling indices"))
    }

    pub async fn set_locked(conn: &Connection, tree_id: TreeId, locked: bool) -> Result<u64, DatabaseError> {
        conn.execute(
            "UPDATE tree_nodes SET locked = ? WHERE tree_id = ?",
            (i64::from(locked), tree_id),
        )
        .await
        .map_err(sql_error("update lock flag"))
    }

    pub async fn set_login_required(
        conn: &Connection,
        tree_id: TreeId,
        login_required: bool,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE tree_nodes SET login_required = ? WHERE tree_id = ?",
            (i64::from(login_required), tree_id),
        )
        .await
        .map_err(sql_error("update login flag"))?;
        Ok(())
    }

    pub async fn replace_groups(
        conn: &Connection,
        tree_id: TreeId,
        groups: &BTreeSet<GroupId>,
    ) -> Result<(), DatabaseError> {
        conn.execute("DELETE FROM tree_node_groups WHERE tree_id = ?", [tree_id])
            .await
            .map_err(sql_error("clear groups"))?;

        for group_id in groups {
            conn.execute(
                "INSERT INTO tree_node_groups (tree_id, group_id) VALUES (?, ?)",
                (tree_id, *group_id),
            )
            .await
            .map_err(sql_error("insert group"))?;
        }

        Ok(())
    }

    /// Delete one node row and its group rows
    pub async fn delete_node(conn: &Connection, tree_id: TreeId) -> Result<u64, DatabaseError> {
        conn.execute("DELETE FROM tree_node_groups WHERE tree_id = ?", [tree_id])
            .await
            .map_err(sql_error("delete groups"))?;

        conn.execute("DELETE FROM tree_nodes WHERE tree_id = ?", [tree_id])
            .await
            .map_err(sql_error("delete node"))
    }

    /// Delete every node whose non-zero parent does not exist (one pass)
    pub async fn delete_orphans(conn: &Connection) -> Result<u64, DatabaseError> {
        conn.execute(
            "DELETE FROM tree_nodes
             WHERE parent_id != 0
               AND parent_id NOT IN (SELECT tree_id FROM tree_nodes)",
            (),
        )
        .await
        .map_err(sql_error("delete orphans"))
    }

    /// Shortcuts whose target no longer exists, as `(tree_id, parent_id)`
    pub async fn find_dangling_shortcuts(conn: &Connection) -> Result<Vec<(TreeId, TreeId)>, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT tree_id, parent_id FROM tree_nodes
                 WHERE shortcut_target IS NOT NULL
                   AND shortcut_target NOT IN (SELECT tree_id FROM tree_nodes)
                 ORDER BY tree_id",
                (),
            )
            .await
            .map_err(sql_error("query dangling shortcuts"))?;

        let mut found = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_error("fetch shortcut row"))? {
            let tree_id: i64 = row.get(0).map_err(|e| DatabaseError::row_decode("tree_id", e))?;
            let parent_id: i64 = row.get(1).map_err(|e| DatabaseError::row_decode("parent_id", e))?;
            found.push((tree_id, parent_id));
        }
        Ok(found)
    }

    /// Delete group rows whose node is gone
    pub async fn delete_orphan_groups(conn: &Connection) -> Result<u64, DatabaseError> {
        conn.execute(
            "DELETE FROM tree_node_groups WHERE tree_id NOT IN (SELECT tree_id FROM tree_nodes)",
            (),
        )
        .await
        .map_err(sql_error("delete orphan groups"))
    }
}
