//! Read operations on the site tree
//!
//! Reads bypass the mutation coordinator and open their own connection. They
//! never fail on corrupt structure: unresolvable paths and shortcuts come back
//! as `None` (with a warning from the resolver).

use crate::db::{DatabaseService, TreeStore};
use crate::models::{ContentId, Principal, TreeId, TreeNode, ROOT_PARENT_ID};
use crate::services::{ContentStore, TreeServiceError};
use crate::tree::{AccessController, AccessDecision, PathResolver, ShortcutResolver};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Result of a label lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "node", rename_all = "camelCase")]
pub enum ChildLookup {
    /// Canonical node (shortcuts already followed)
    Found(TreeNode),
    /// Node exists but the principal may not open it
    AccessDenied(TreeNode),
    NotFound,
}

/// A public page for sitemap generators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapEntry {
    pub tree_id: TreeId,
    pub content_id: ContentId,
    pub path: String,
}

pub struct TreeQueryService {
    db: Arc<DatabaseService>,
    content: Arc<dyn ContentStore>,
    paths: PathResolver,
}

impl TreeQueryService {
    pub fn new(db: Arc<DatabaseService>, content: Arc<dyn ContentStore>, max_path_hops: usize) -> Self {
        Self {
            paths: PathResolver::new(content.clone(), max_path_hops),
            db,
            content,
        }
    }

    pub async fn get_node(&self, tree_id: TreeId) -> Result<Option<TreeNode>, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(TreeStore::get_node(&conn, tree_id).await?)
    }

    /// Direct children in sibling order
    pub async fn children(&self, parent_id: TreeId) -> Result<Vec<TreeNode>, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(TreeStore::get_children(&conn, parent_id).await?)
    }

    /// Nodes from the top level down to `tree_id`
    pub async fn breadcrumb(&self, tree_id: TreeId) -> Result<Option<Vec<TreeNode>>, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;

        let Some(chain) = self.paths.breadcrumb(&conn, tree_id).await? else {
            return Ok(None);
        };

        let mut nodes = Vec::with_capacity(chain.len());
        for id in chain {
            match TreeStore::get_node(&conn, id).await? {
                Some(node) => nodes.push(node),
                None => return Ok(None),
            }
        }
        Ok(Some(nodes))
    }

    pub async fn resolve_path(
        &self,
        tree_id: TreeId,
        root_id: TreeId,
    ) -> Result<Option<String>, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.paths.resolve_path(&conn, tree_id, root_id).await
    }

    pub async fn resolve_all_placements(
        &self,
        content_id: ContentId,
    ) -> Result<Vec<(TreeId, String)>, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.paths.resolve_all_placements(&conn, content_id).await
    }

    pub async fn resolve_shortcut(&self, tree_id: TreeId) -> Result<Option<TreeNode>, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        ShortcutResolver::resolve_id(&conn, tree_id).await
    }

    /// Child of `parent_id` whose content label is `label`
    ///
    /// Shortcuts are followed to their target and access is checked on the node
    /// that would be served.
    pub async fn find_child(
        &self,
        parent_id: TreeId,
        label: &str,
        principal: &Principal,
    ) -> Result<ChildLookup, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;

        for child in TreeStore::get_children(&conn, parent_id).await? {
            let matches = self
                .content
                .get_content_item(child.content_id)
                .await?
                .is_some_and(|item| item.label == label);
            if !matches {
                continue;
            }

            let Some(resolved) = ShortcutResolver::resolve(&conn, child).await? else {
                return Ok(ChildLookup::NotFound);
            };

            return Ok(match AccessController::check_access(&resolved, &principal.groups) {
                AccessDecision::Granted => ChildLookup::Found(resolved),
                AccessDecision::Denied => {
                    debug!(
                        "Principal {} denied access to node {}",
                        principal.id, resolved.tree_id
                    );
                    ChildLookup::AccessDenied(resolved)
                }
            });
        }

        Ok(ChildLookup::NotFound)
    }

    /// Walk a slash separated label path (`"a/b/c/"`) down from `root_id`
    pub async fn resolve_url(
        &self,
        root_id: TreeId,
        url: &str,
        principal: &Principal,
    ) -> Result<ChildLookup, TreeServiceError> {
        let mut segments = url.split('/').filter(|s| !s.is_empty()).peekable();

        if segments.peek().is_none() {
            if root_id == ROOT_PARENT_ID {
                return Ok(ChildLookup::NotFound);
            }
            return Ok(match self.get_node(root_id).await? {
                Some(node) => match AccessController::check_access(&node, &principal.groups) {
                    AccessDecision::Granted => ChildLookup::Found(node),
                    AccessDecision::Denied => ChildLookup::AccessDenied(node),
                },
                None => ChildLookup::NotFound,
            });
        }

        let mut current = root_id;
        let mut found = ChildLookup::NotFound;
        for segment in segments {
            found = self.find_child(current, segment, principal).await?;
            match &found {
                ChildLookup::Found(node) => current = node.tree_id,
                _ => return Ok(found),
            }
        }

        Ok(found)
    }

    /// Public canonical pages with resolvable paths, ordered by tree id
    pub async fn sitemap_entries(&self) -> Result<Vec<SitemapEntry>, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;

        let mut entries = Vec::new();
        for node in TreeStore::get_all_nodes(&conn).await? {
            if node.login_required || node.is_shortcut() {
                continue;
            }
            if let Some(path) = self
                .paths
                .resolve_path(&conn, node.tree_id, ROOT_PARENT_ID)
                .await?
            {
                entries.push(SitemapEntry {
                    tree_id: node.tree_id,
                    content_id: node.content_id,
                    path,
                });
            }
        }

        Ok(entries)
    }
}
