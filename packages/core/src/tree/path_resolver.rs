//! Upward walks over the parent chain
//!
//! Every walk is bounded by a hop limit (see [`crate::config::MAX_PATH_HOPS`]).
//! A stored hierarchy can be corrupt (a cycle, a dangling parent reference) and a
//! walk over it must still terminate; such walks yield `None` and a warning.

use crate::db::TreeStore;
use crate::models::{ContentId, TreeId, ROOT_PARENT_ID};
use crate::services::{ContentStore, TreeServiceError};
use libsql::Connection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Collect `tree_id` and its ancestors (nearest first), excluding the virtual root
///
/// Returns `None` when a row is missing or the chain exceeds `max_hops`.
pub async fn walk_ancestors(
    conn: &Connection,
    tree_id: TreeId,
    max_hops: usize,
) -> Result<Option<Vec<TreeId>>, TreeServiceError> {
    let mut chain = Vec::new();
    let mut current = tree_id;

    while current != ROOT_PARENT_ID {
        if chain.len() >= max_hops {
            warn!(
                "Ancestor walk from {} exceeded {} hops; parent chain is cyclic or too deep",
                tree_id, max_hops
            );
            return Ok(None);
        }

        match TreeStore::get_parent_id(conn, current).await? {
            Some(parent_id) => {
                chain.push(current);
                current = parent_id;
            }
            None => {
                warn!(
                    "Ancestor walk from {} hit missing node {}",
                    tree_id, current
                );
                return Ok(None);
            }
        }
    }

    Ok(Some(chain))
}

/// Resolves nodes to slash-joined label paths
pub struct PathResolver {
    content: Arc<dyn ContentStore>,
    max_hops: usize,
}

impl PathResolver {
    pub fn new(content: Arc<dyn ContentStore>, max_hops: usize) -> Self {
        Self { content, max_hops }
    }

    /// Path of `tree_id` relative to `root_id`, e.g. `"a/b/c/"`
    ///
    /// Labels of the nodes strictly below `root_id` are joined root-to-leaf with
    /// a trailing `/`. `root_id = 0` resolves from the virtual site root, so
    /// every top-level label is included. The path of `root_id` itself is `""`.
    pub async fn resolve_path(
        &self,
        conn: &Connection,
        tree_id: TreeId,
        root_id: TreeId,
    ) -> Result<Option<String>, TreeServiceError> {
        let mut labels: Vec<String> = Vec::new();
        let mut current = tree_id;
        let mut hops = 0;

        while current != root_id {
            if current == ROOT_PARENT_ID {
                warn!(
                    "Node {} is not below root {}; path cannot be resolved",
                    tree_id, root_id
                );
                return Ok(None);
            }

            if hops >= self.max_hops {
                warn!(
                    "Path walk from {} exceeded {} hops; parent chain is cyclic or too deep",
                    tree_id, self.max_hops
                );
                return Ok(None);
            }
            hops += 1;

            let Some((parent_id, content_id)) = TreeStore::get_link(conn, current).await? else {
                warn!("Path walk from {} hit missing node {}", tree_id, current);
                return Ok(None);
            };

            match self.label_of(content_id).await? {
                Some(label) => labels.push(label),
                None => {
                    warn!(
                        "Path walk from {} hit node {} with unknown content {}",
                        tree_id, current, content_id
                    );
                    return Ok(None);
                }
            }

            current = parent_id;
        }

        let mut path = String::new();
        for label in labels.iter().rev() {
            path.push_str(label);
            path.push('/');
        }

        debug!("Resolved node {} to '{}'", tree_id, path);
        Ok(Some(path))
    }

    /// One `(tree_id, path)` per placement of `content_id`, ordered by tree id
    ///
    /// Placements whose path cannot be resolved are left out.
    pub async fn resolve_all_placements(
        &self,
        conn: &Connection,
        content_id: ContentId,
    ) -> Result<Vec<(TreeId, String)>, TreeServiceError> {
        let placements = TreeStore::find_by_content(conn, content_id).await?;

        let mut resolved = Vec::with_capacity(placements.len());
        for node in placements {
            if let Some(path) = self.resolve_path(conn, node.tree_id, ROOT_PARENT_ID).await? {
                resolved.push((node.tree_id, path));
            }
        }

        Ok(resolved)
    }

    /// Nodes from the top level down to `tree_id`
    pub async fn breadcrumb(
        &self,
        conn: &Connection,
        tree_id: TreeId,
    ) -> Result<Option<Vec<TreeId>>, TreeServiceError> {
        Ok(walk_ancestors(conn, tree_id, self.max_hops)
            .await?
            .map(|mut chain| {
                chain.reverse();
                chain
            }))
    }

    async fn label_of(&self, content_id: ContentId) -> Result<Option<String>, TreeServiceError> {
        Ok(self
            .content
            .get_content_item(content_id)
            .await?
            .map(|item| item.label))
    }
}
