//! Mutation Coordinator
//!
//! Single entry point for every structural change to the site tree.
//!
//! # Flow
//!
//! 1. Permission check for the mutation kind
//! 2. `pre_mutate` hook (may rewrite the mutation, not its kind)
//! 3. Shape validation (identifiers, empty batches)
//! 4. One `BEGIN IMMEDIATE` transaction behind an in-process write gate:
//!    rule checks, index allocation, row writes, orphan reclamation
//! 5. Commit, then a [`TreeEvent`] broadcast and a queued notification
//!    (cache flush, sitemap regeneration, `post_mutate`)
//!
//! Any error before commit rolls the transaction back, so a failed mutation
//! leaves the tree exactly as it was.

use crate::config::TreeConfig;
use crate::db::{DatabaseService, NewTreeNode, TreeStore};
use crate::models::tree_node::{ensure_node_id, ensure_parent_id};
use crate::models::{
    ContentId, GroupId, InsertReport, MoveItem, MoveReport, Mutation, MutationKind,
    MutationOutcome, MutationRecord, Permission, Principal, RemoveReport, RepairReport, TreeId,
    TreeNode, ValidationError, ROOT_PARENT_ID,
};
use crate::services::collaborators::{
    CacheInvalidator, ContentStore, MutationHooks, NoopCacheInvalidator, NoopHooks,
    NoopSitemapGenerator, SitemapGenerator,
};
use crate::services::events::TreeEvent;
use crate::services::notifier::Notifier;
use crate::services::TreeServiceError;
use crate::tree::{
    walk_ancestors, AccessController, IndexAllocator, LockManager, OrphanReclaimer,
    ShortcutResolver,
};
use chrono::Utc;
use libsql::Connection;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Capacity of the tree event broadcast channel
const TREE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Collaborators notified after each committed mutation
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn CacheInvalidator>,
    pub sitemap: Arc<dyn SitemapGenerator>,
    pub hooks: Arc<dyn MutationHooks>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            cache: Arc::new(NoopCacheInvalidator),
            sitemap: Arc::new(NoopSitemapGenerator),
            hooks: Arc::new(NoopHooks),
        }
    }
}

/// Permission a principal needs for a mutation kind
pub fn required_permission(kind: MutationKind) -> Permission {
    match kind {
        MutationKind::Insert
        | MutationKind::Move
        | MutationKind::Remove
        | MutationKind::CreateShortcut => Permission::EditTree,
        MutationKind::Lock | MutationKind::Unlock => Permission::ManageLocks,
        MutationKind::SetAccess => Permission::ManageAccess,
        MutationKind::Repair => Permission::Administrator,
    }
}

/// Reject malformed input before a transaction is opened
fn validate_shape(mutation: &Mutation) -> Result<(), ValidationError> {
    match mutation {
        Mutation::Insert {
            content_ids,
            parent_id,
            ..
        } => {
            if content_ids.is_empty() {
                return Err(ValidationError::EmptyBatch);
            }
            ensure_parent_id(*parent_id)?;
            content_ids.iter().try_for_each(|id| ensure_node_id(*id))
        }
        Mutation::Move {
            items,
            new_parent_id,
            ..
        } => {
            if items.is_empty() {
                return Err(ValidationError::EmptyBatch);
            }
            ensure_parent_id(*new_parent_id)?;
            let mut seen = HashSet::new();
            for item in items {
                ensure_node_id(item.tree_id)?;
                ensure_parent_id(item.old_parent_id)?;
                if !seen.insert(item.tree_id) {
                    return Err(ValidationError::MalformedBatch(format!(
                        "node {} listed more than once",
                        item.tree_id
                    )));
                }
            }
            Ok(())
        }
        Mutation::Remove { tree_ids } => {
            if tree_ids.is_empty() {
                return Err(ValidationError::EmptyBatch);
            }
            tree_ids.iter().try_for_each(|id| ensure_node_id(*id))
        }
        Mutation::CreateShortcut {
            target_id,
            content_id,
            parent_id,
            ..
        } => {
            ensure_node_id(*target_id)?;
            ensure_node_id(*content_id)?;
            ensure_parent_id(*parent_id)
        }
        Mutation::Lock { tree_id } | Mutation::Unlock { tree_id } => ensure_node_id(*tree_id),
        Mutation::SetAccess {
            tree_id,
            required_groups,
        } => {
            ensure_node_id(*tree_id)?;
            required_groups.iter().try_for_each(|id| ensure_node_id(*id))
        }
        Mutation::Repair => Ok(()),
    }
}

fn unexpected_outcome(kind: MutationKind, outcome: &MutationOutcome) -> TreeServiceError {
    TreeServiceError::transaction_failed(format!(
        "{} produced an unexpected outcome: {:?}",
        kind.as_str(),
        outcome
    ))
}

/// Serializes and executes tree mutations
pub struct MutationCoordinator {
    db: Arc<DatabaseService>,
    content: Arc<dyn ContentStore>,
    hooks: Arc<dyn MutationHooks>,
    access: AccessController,
    locks: LockManager,
    notifier: Notifier,
    event_tx: broadcast::Sender<TreeEvent>,
    write_gate: Mutex<()>,
    config: TreeConfig,
}

impl MutationCoordinator {
    /// Coordinator with no-op cache, sitemap and hooks
    ///
    /// Must be called within a Tokio runtime (the notification worker is spawned
    /// here).
    pub fn new(db: Arc<DatabaseService>, content: Arc<dyn ContentStore>, config: TreeConfig) -> Self {
        Self::with_collaborators(db, content, config, Collaborators::default())
    }

    pub fn with_collaborators(
        db: Arc<DatabaseService>,
        content: Arc<dyn ContentStore>,
        config: TreeConfig,
        collaborators: Collaborators,
    ) -> Self {
        let notifier = Notifier::spawn(
            collaborators.cache,
            collaborators.sitemap,
            collaborators.hooks.clone(),
        );
        let (event_tx, _) = broadcast::channel(TREE_EVENT_CHANNEL_CAPACITY);

        Self {
            access: AccessController::new(content.clone(), config.login_gate_content_type),
            locks: LockManager::new(config.max_path_hops),
            db,
            content,
            hooks: collaborators.hooks,
            notifier,
            event_tx,
            write_gate: Mutex::new(()),
            config,
        }
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Subscribe to events of committed mutations
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    /// Wait until collaborators have been notified of every committed mutation
    pub async fn notifications_settled(&self) {
        self.notifier.settled().await
    }

    /// Ignores errors if no subscribers
    fn emit_event(&self, event: TreeEvent) {
        let _ = self.event_tx.send(event);
    }

    //
    // TYPED ENTRY POINTS
    //

    /// Place one content item; a duplicate under the parent is a conflict
    pub async fn insert(
        &self,
        principal: &Principal,
        content_id: ContentId,
        parent_id: TreeId,
        index: i64,
    ) -> Result<TreeNode, TreeServiceError> {
        let mutation = Mutation::Insert {
            content_ids: vec![content_id],
            parent_id,
            index,
            batch: false,
        };
        match self.apply(principal, mutation).await? {
            MutationOutcome::Inserted(mut report) if !report.nodes.is_empty() => {
                Ok(report.nodes.remove(0))
            }
            other => Err(unexpected_outcome(MutationKind::Insert, &other)),
        }
    }

    /// Place several content items at consecutive positions, skipping duplicates
    pub async fn insert_batch(
        &self,
        principal: &Principal,
        content_ids: Vec<ContentId>,
        parent_id: TreeId,
        index: i64,
    ) -> Result<InsertReport, TreeServiceError> {
        let mutation = Mutation::Insert {
            content_ids,
            parent_id,
            index,
            batch: true,
        };
        match self.apply(principal, mutation).await? {
            MutationOutcome::Inserted(report) => Ok(report),
            other => Err(unexpected_outcome(MutationKind::Insert, &other)),
        }
    }

    /// Relocate one node; a duplicate under the new parent is a conflict
    pub async fn move_node(
        &self,
        principal: &Principal,
        item: MoveItem,
        new_parent_id: TreeId,
        new_index: i64,
    ) -> Result<MoveReport, TreeServiceError> {
        let mutation = Mutation::Move {
            items: vec![item],
            new_parent_id,
            new_index,
            batch: false,
        };
        self.expect_moved(principal, mutation).await
    }

    /// Relocate several nodes to consecutive positions, skipping duplicates
    ///
    /// The target index advances only for items that actually move.
    pub async fn move_batch(
        &self,
        principal: &Principal,
        items: Vec<MoveItem>,
        new_parent_id: TreeId,
        new_index: i64,
    ) -> Result<MoveReport, TreeServiceError> {
        let mutation = Mutation::Move {
            items,
            new_parent_id,
            new_index,
            batch: true,
        };
        self.expect_moved(principal, mutation).await
    }

    async fn expect_moved(
        &self,
        principal: &Principal,
        mutation: Mutation,
    ) -> Result<MoveReport, TreeServiceError> {
        match self.apply(principal, mutation).await? {
            MutationOutcome::Moved(report) => Ok(report),
            other => Err(unexpected_outcome(MutationKind::Move, &other)),
        }
    }

    /// Delete a node and everything below it
    pub async fn remove(
        &self,
        principal: &Principal,
        tree_id: TreeId,
    ) -> Result<RemoveReport, TreeServiceError> {
        self.remove_batch(principal, vec![tree_id]).await
    }

    pub async fn remove_batch(
        &self,
        principal: &Principal,
        tree_ids: Vec<TreeId>,
    ) -> Result<RemoveReport, TreeServiceError> {
        match self.apply(principal, Mutation::Remove { tree_ids }).await? {
            MutationOutcome::Removed(report) => Ok(report),
            other => Err(unexpected_outcome(MutationKind::Remove, &other)),
        }
    }

    /// Place an alias of `target_id` presenting `content_id`
    pub async fn create_shortcut(
        &self,
        principal: &Principal,
        target_id: TreeId,
        content_id: ContentId,
        parent_id: TreeId,
        index: i64,
    ) -> Result<TreeNode, TreeServiceError> {
        let mutation = Mutation::CreateShortcut {
            target_id,
            content_id,
            parent_id,
            index,
        };
        match self.apply(principal, mutation).await? {
            MutationOutcome::Inserted(mut report) if !report.nodes.is_empty() => {
                Ok(report.nodes.remove(0))
            }
            other => Err(unexpected_outcome(MutationKind::CreateShortcut, &other)),
        }
    }

    /// Lock a node and its ancestors; returns the nodes whose flag changed
    pub async fn lock(
        &self,
        principal: &Principal,
        tree_id: TreeId,
    ) -> Result<Vec<TreeId>, TreeServiceError> {
        match self.apply(principal, Mutation::Lock { tree_id }).await? {
            MutationOutcome::Locked { changed } => Ok(changed),
            other => Err(unexpected_outcome(MutationKind::Lock, &other)),
        }
    }

    pub async fn unlock(&self, principal: &Principal, tree_id: TreeId) -> Result<(), TreeServiceError> {
        match self.apply(principal, Mutation::Unlock { tree_id }).await? {
            MutationOutcome::Unlocked { .. } => Ok(()),
            other => Err(unexpected_outcome(MutationKind::Unlock, &other)),
        }
    }

    /// Replace the groups of a node; existing descendants are not touched
    pub async fn set_access(
        &self,
        principal: &Principal,
        tree_id: TreeId,
        required_groups: BTreeSet<GroupId>,
    ) -> Result<TreeNode, TreeServiceError> {
        let mutation = Mutation::SetAccess {
            tree_id,
            required_groups,
        };
        match self.apply(principal, mutation).await? {
            MutationOutcome::AccessChanged(node) => Ok(node),
            other => Err(unexpected_outcome(MutationKind::SetAccess, &other)),
        }
    }

    /// Reclaim orphans and dangling shortcuts, then renumber every parent
    pub async fn repair(&self, principal: &Principal) -> Result<RepairReport, TreeServiceError> {
        match self.apply(principal, Mutation::Repair).await? {
            MutationOutcome::Repaired(report) => Ok(report),
            other => Err(unexpected_outcome(MutationKind::Repair, &other)),
        }
    }

    //
    // EXECUTION
    //

    /// Run any mutation through the full pipeline
    pub async fn apply(
        &self,
        principal: &Principal,
        mutation: Mutation,
    ) -> Result<MutationOutcome, TreeServiceError> {
        let kind = mutation.kind();

        let permission = required_permission(kind);
        if !principal.has_permission(permission) {
            return Err(TreeServiceError::permission_denied(principal.id, permission));
        }

        let mutation = self.hooks.pre_mutate(principal, mutation).await?;
        if mutation.kind() != kind {
            return Err(TreeServiceError::hook_rejected(format!(
                "pre-mutation hook turned {} into {}",
                kind.as_str(),
                mutation.kind().as_str()
            )));
        }

        validate_shape(&mutation)?;

        let outcome = {
            let _gate = self.write_gate.lock().await;
            let tx = self.db.begin_write().await?;

            let result = self.execute(&tx, &mutation).await;
            match result {
                Ok(outcome) => {
                    tx.commit().await.map_err(|e| {
                        TreeServiceError::transaction_failed(format!(
                            "Failed to commit {}: {}",
                            kind.as_str(),
                            e
                        ))
                    })?;
                    outcome
                }
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!("Rollback of {} failed: {}", kind.as_str(), rollback_err);
                    }
                    debug!("{} rolled back: {}", kind.as_str(), e);
                    return Err(e);
                }
            }
        };

        info!("Committed {} for principal {}", kind.as_str(), principal.id);

        let record = MutationRecord {
            kind,
            mutation,
            outcome: outcome.clone(),
            principal_id: principal.id,
            committed_at: Utc::now(),
        };
        self.emit_event(TreeEvent::from_record(&record));
        self.notifier.notify(record);

        Ok(outcome)
    }

    async fn execute(
        &self,
        conn: &Connection,
        mutation: &Mutation,
    ) -> Result<MutationOutcome, TreeServiceError> {
        match mutation {
            Mutation::Insert {
                content_ids,
                parent_id,
                index,
                batch,
            } => self
                .execute_insert(conn, content_ids, *parent_id, *index, *batch, None)
                .await
                .map(MutationOutcome::Inserted),

            Mutation::CreateShortcut {
                target_id,
                content_id,
                parent_id,
                index,
            } => {
                let target = ShortcutResolver::validate_target(conn, *target_id).await?;
                self.execute_insert(
                    conn,
                    &[*content_id],
                    *parent_id,
                    *index,
                    false,
                    Some(target.tree_id),
                )
                .await
                .map(MutationOutcome::Inserted)
            }

            Mutation::Move {
                items,
                new_parent_id,
                new_index,
                batch,
            } => self
                .execute_move(conn, items, *new_parent_id, *new_index, *batch)
                .await
                .map(MutationOutcome::Moved),

            Mutation::Remove { tree_ids } => self
                .execute_remove(conn, tree_ids)
                .await
                .map(MutationOutcome::Removed),

            Mutation::Lock { tree_id } => {
                let changed = self.locks.lock(conn, *tree_id).await?;
                Ok(MutationOutcome::Locked { changed })
            }

            Mutation::Unlock { tree_id } => {
                self.locks.unlock(conn, *tree_id).await?;
                Ok(MutationOutcome::Unlocked { tree_id: *tree_id })
            }

            Mutation::SetAccess {
                tree_id,
                required_groups,
            } => {
                let node = AccessController::set_access(conn, *tree_id, required_groups).await?;
                Ok(MutationOutcome::AccessChanged(node))
            }

            Mutation::Repair => self.execute_repair(conn).await.map(MutationOutcome::Repaired),
        }
    }

    /// Parent node of a placement; `None` for the virtual root
    async fn check_parent(
        &self,
        conn: &Connection,
        parent_id: TreeId,
    ) -> Result<Option<TreeNode>, TreeServiceError> {
        if parent_id == ROOT_PARENT_ID {
            return Ok(None);
        }

        let parent = TreeStore::get_node(conn, parent_id)
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(parent_id))?;

        if parent.is_shortcut() {
            return Err(ValidationError::ParentIsShortcut { parent_id }.into());
        }

        Ok(Some(parent))
    }

    /// Child bound of a parent, from its content item
    async fn capacity_of(&self, parent: Option<&TreeNode>) -> Result<Option<usize>, TreeServiceError> {
        let Some(parent) = parent else {
            return Ok(None);
        };

        match self.content.get_content_item(parent.content_id).await? {
            Some(item) => Ok(item.capacity()),
            None => {
                warn!(
                    "Parent {} presents unknown content {}; treating as unbounded",
                    parent.tree_id, parent.content_id
                );
                Ok(None)
            }
        }
    }

    async fn ensure_single_root(&self, conn: &Connection, additional: usize) -> Result<(), TreeServiceError> {
        if !self.config.single_root {
            return Ok(());
        }

        let existing = TreeStore::get_child_ids(conn, ROOT_PARENT_ID, None).await?;
        if existing.len() + additional > 1 {
            return Err(ValidationError::RootAlreadyExists {
                existing_root: existing.first().copied().unwrap_or(ROOT_PARENT_ID),
            }
            .into());
        }
        Ok(())
    }

    async fn execute_insert(
        &self,
        conn: &Connection,
        content_ids: &[ContentId],
        parent_id: TreeId,
        index: i64,
        batch: bool,
        shortcut_target: Option<TreeId>,
    ) -> Result<InsertReport, TreeServiceError> {
        let parent = self.check_parent(conn, parent_id).await?;

        let mut accepted = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();
        for &content_id in content_ids {
            if !self.content.content_item_exists(content_id).await? {
                return Err(TreeServiceError::content_not_found(content_id));
            }

            let duplicate = !seen.insert(content_id)
                || TreeStore::find_content_under(conn, parent_id, content_id, None)
                    .await?
                    .is_some();
            if duplicate {
                if !batch {
                    return Err(TreeServiceError::duplicate_placement(parent_id, content_id));
                }
                debug!(
                    "Skipping content {} already placed under {}",
                    content_id, parent_id
                );
                skipped.push(content_id);
                continue;
            }
            accepted.push(content_id);
        }

        if accepted.is_empty() {
            return Err(TreeServiceError::AllItemsSkipped {
                parent_id,
                count: content_ids.len(),
            });
        }

        let existing = TreeStore::count_children(conn, parent_id, None).await?;
        if let Some(max_children) = self.capacity_of(parent.as_ref()).await? {
            if existing as usize + accepted.len() > max_children {
                return Err(TreeServiceError::capacity_exceeded(parent_id, max_children));
            }
        }
        if parent_id == ROOT_PARENT_ID {
            self.ensure_single_root(conn, accepted.len()).await?;
        }
        if index < 0 || index > existing {
            return Err(ValidationError::InvalidIndex {
                index,
                max: existing,
            }
            .into());
        }

        let mut created = Vec::with_capacity(accepted.len());
        for (offset, content_id) in accepted.into_iter().enumerate() {
            let position = index + offset as i64;
            // A shortcut is gated by the content it presents, not by its target
            let inherited = self
                .access
                .compute_inherited_access(conn, parent_id, content_id)
                .await?;
            IndexAllocator::open_slot(conn, parent_id, position, None).await?;

            let tree_id = TreeStore::insert_node(
                conn,
                &NewTreeNode {
                    parent_id,
                    content_id,
                    index: position,
                    shortcut_target,
                    login_required: inherited.login_required,
                    required_groups: inherited.required_groups,
                },
            )
            .await?;
            created.push(tree_id);
        }

        let mut nodes = Vec::with_capacity(created.len());
        for tree_id in created {
            let node = TreeStore::get_node(conn, tree_id)
                .await?
                .ok_or_else(|| TreeServiceError::node_not_found(tree_id))?;
            nodes.push(node);
        }

        debug!(
            "Placed {} nodes under {} ({} skipped)",
            nodes.len(),
            parent_id,
            skipped.len()
        );
        Ok(InsertReport { nodes, skipped })
    }

    async fn execute_move(
        &self,
        conn: &Connection,
        items: &[MoveItem],
        new_parent_id: TreeId,
        new_index: i64,
        batch: bool,
    ) -> Result<MoveReport, TreeServiceError> {
        let new_parent = self.check_parent(conn, new_parent_id).await?;

        let destination_chain = if new_parent_id == ROOT_PARENT_ID {
            Vec::new()
        } else {
            walk_ancestors(conn, new_parent_id, self.config.max_path_hops)
                .await?
                .ok_or(TreeServiceError::CorruptHierarchy {
                    tree_id: new_parent_id,
                })?
        };

        let mut accepted: Vec<TreeNode> = Vec::new();
        let mut skipped = Vec::new();
        let mut seen_content = HashSet::new();
        for item in items {
            let node = TreeStore::get_node(conn, item.tree_id)
                .await?
                .ok_or_else(|| TreeServiceError::node_not_found(item.tree_id))?;

            if node.parent_id != item.old_parent_id {
                return Err(TreeServiceError::StaleLocation {
                    tree_id: node.tree_id,
                    expected_parent_id: item.old_parent_id,
                    actual_parent_id: node.parent_id,
                });
            }
            if node.locked {
                return Err(TreeServiceError::NodeLocked {
                    tree_id: node.tree_id,
                });
            }
            if destination_chain.contains(&node.tree_id) {
                return Err(ValidationError::CycleWouldForm {
                    tree_id: node.tree_id,
                    new_parent_id,
                }
                .into());
            }

            let duplicate = !seen_content.insert(node.content_id)
                || TreeStore::find_content_under(
                    conn,
                    new_parent_id,
                    node.content_id,
                    Some(node.tree_id),
                )
                .await?
                .is_some();
            if duplicate {
                if !batch {
                    return Err(TreeServiceError::duplicate_placement(
                        new_parent_id,
                        node.content_id,
                    ));
                }
                debug!(
                    "Skipping move of {}: content {} already under {}",
                    node.tree_id, node.content_id, new_parent_id
                );
                skipped.push(node.tree_id);
                continue;
            }

            accepted.push(node);
        }

        if accepted.is_empty() {
            return Err(TreeServiceError::AllItemsSkipped {
                parent_id: new_parent_id,
                count: items.len(),
            });
        }

        let incoming = accepted
            .iter()
            .filter(|node| node.parent_id != new_parent_id)
            .count();
        if incoming > 0 {
            if let Some(max_children) = self.capacity_of(new_parent.as_ref()).await? {
                let existing = TreeStore::count_children(conn, new_parent_id, None).await?;
                if existing as usize + incoming > max_children {
                    return Err(TreeServiceError::capacity_exceeded(new_parent_id, max_children));
                }
            }
            if new_parent_id == ROOT_PARENT_ID {
                self.ensure_single_root(conn, incoming).await?;
            }
        }

        // Target positions count the destination without any accepted node
        let staying = (accepted.len() - incoming) as i64;
        let others = TreeStore::count_children(conn, new_parent_id, None).await? - staying;
        if new_index < 0 || new_index > others {
            return Err(ValidationError::InvalidIndex {
                index: new_index,
                max: others,
            }
            .into());
        }

        let mut touched = BTreeSet::new();
        for node in &accepted {
            IndexAllocator::detach(conn, node.parent_id, node.tree_id).await?;
            touched.insert(node.parent_id);
        }

        let mut moved = Vec::with_capacity(accepted.len());
        for (offset, node) in accepted.iter().enumerate() {
            IndexAllocator::place(conn, new_parent_id, new_index + offset as i64, node.tree_id).await?;
            moved.push(node.tree_id);
        }
        touched.insert(new_parent_id);

        let mut children = BTreeMap::new();
        for parent_id in touched {
            children.insert(parent_id, TreeStore::get_children(conn, parent_id).await?);
        }

        debug!(
            "Moved {} nodes under {} ({} skipped)",
            moved.len(),
            new_parent_id,
            skipped.len()
        );
        Ok(MoveReport {
            moved,
            skipped,
            children,
        })
    }

    async fn execute_remove(
        &self,
        conn: &Connection,
        tree_ids: &[TreeId],
    ) -> Result<RemoveReport, TreeServiceError> {
        let mut targets = Vec::with_capacity(tree_ids.len());
        let mut seen = HashSet::new();
        for &tree_id in tree_ids {
            if !seen.insert(tree_id) {
                continue;
            }
            let node = TreeStore::get_node(conn, tree_id)
                .await?
                .ok_or_else(|| TreeServiceError::node_not_found(tree_id))?;
            if node.locked {
                return Err(TreeServiceError::NodeLocked { tree_id });
            }
            targets.push(node);
        }

        let mut removed = Vec::with_capacity(targets.len());
        for node in targets {
            IndexAllocator::close_slot(conn, node.parent_id, node.tree_id).await?;
            TreeStore::delete_node(conn, node.tree_id).await?;
            removed.push(node.tree_id);
        }

        let reclaim = OrphanReclaimer::reclaim(conn).await?;
        for parent_id in &reclaim.touched_parents {
            IndexAllocator::compact(conn, *parent_id).await?;
        }

        debug!(
            "Removed {} nodes ({} reclaimed)",
            removed.len(),
            reclaim.removed
        );
        Ok(RemoveReport {
            removed,
            reclaimed: reclaim.removed,
        })
    }

    async fn execute_repair(&self, conn: &Connection) -> Result<RepairReport, TreeServiceError> {
        let reclaim = OrphanReclaimer::reclaim(conn).await?;

        let mut normalized_parents = 0;
        for parent_id in TreeStore::get_parent_ids(conn).await? {
            if IndexAllocator::compact(conn, parent_id).await? {
                normalized_parents += 1;
            }
        }

        if normalized_parents > 0 {
            warn!("Repair renumbered children of {} parents", normalized_parents);
        }

        Ok(RepairReport {
            reclaimed: reclaim.removed,
            normalized_parents,
        })
    }
}
