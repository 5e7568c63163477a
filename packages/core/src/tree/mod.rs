//! Tree Components
//!
//! Building blocks the mutation coordinator composes inside one transaction:
//!
//! - `IndexAllocator`: contiguous sibling indices (`open_slot` / `close_slot`)
//! - `PathResolver`: bounded upward walks, label paths and breadcrumbs
//! - `ShortcutResolver`: alias resolution without chains
//! - `AccessController`: inherited login gates and group checks
//! - `LockManager`: upward lock propagation and guarded unlock
//! - `OrphanReclaimer`: removal of nodes left without parent or target
//! - `IntegrityAuditor`: read-only check of all structural rules
//!
//! Components hold no connection of their own; every call receives the
//! `&libsql::Connection` (or transaction) to work on.

mod access;
mod index_allocator;
mod integrity;
mod lock_manager;
mod orphan_reclaimer;
mod path_resolver;
mod shortcut_resolver;

pub use access::{AccessController, AccessDecision, InheritedAccess};
pub use index_allocator::IndexAllocator;
pub use integrity::{IntegrityAuditor, IntegrityReport};
pub use lock_manager::LockManager;
pub use orphan_reclaimer::{OrphanReclaimer, ReclaimReport};
pub use path_resolver::{walk_ancestors, PathResolver};
pub use shortcut_resolver::ShortcutResolver;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{DatabaseService, NewTreeNode, TreeStore};
    use crate::models::{ContentId, ContentItem, TreeId};
    use crate::services::{ContentStore, InMemoryContentStore};
    use libsql::Connection;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub async fn create_test_db() -> (DatabaseService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("tree.db"))
            .await
            .unwrap();
        (db, temp_dir)
    }

    /// Insert a raw row, bypassing all tree rules
    pub async fn place(conn: &Connection, parent_id: TreeId, content_id: ContentId, index: i64) -> TreeId {
        TreeStore::insert_node(
            conn,
            &NewTreeNode {
                parent_id,
                content_id,
                index,
                shortcut_target: None,
                login_required: false,
                required_groups: BTreeSet::new(),
            },
        )
        .await
        .unwrap()
    }

    pub async fn indices(conn: &Connection, parent_id: TreeId) -> Vec<(TreeId, i64)> {
        TreeStore::get_child_positions(conn, parent_id, None)
            .await
            .unwrap()
    }

    pub fn catalog(labels: &[(ContentId, &str)]) -> Arc<dyn ContentStore> {
        Arc::new(InMemoryContentStore::with_items(
            labels
                .iter()
                .map(|(id, label)| ContentItem::new(*id, *label, 1)),
        ))
    }
}
