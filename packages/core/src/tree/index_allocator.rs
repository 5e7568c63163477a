//! Sibling index maintenance
//!
//! Children of one parent always carry the indices `0..n-1`. Changes happen in
//! two units that run inside the caller's transaction:
//!
//! - [`IndexAllocator::open_slot`]: compact the siblings, then shift everything
//!   at or after the target position up by one
//! - [`IndexAllocator::close_slot`]: compact the siblings, then shift everything
//!   after the leaving node down by one
//!
//! Moves use [`IndexAllocator::detach`] and [`IndexAllocator::place`], which wrap
//! the two units. A detached node is parked under `DETACHED_PARENT_ID` and is
//! invisible to every sibling list until it is placed again in the same
//! transaction.
//!
//! Compacting first makes the units self-healing: a parent whose indices drifted
//! (gaps, duplicates) is rewritten in its stored order before the shift.

use crate::db::{DatabaseError, TreeStore};
use crate::models::{TreeId, ValidationError};
use crate::services::TreeServiceError;
use libsql::Connection;
use tracing::debug;

/// Parent of nodes taken out of their parent mid-move; never committed
pub(crate) const DETACHED_PARENT_ID: TreeId = -1;

pub struct IndexAllocator;

impl IndexAllocator {
    /// Rewrite the children of `parent_id` as `0..n-1` in their current order
    ///
    /// Returns the number of children considered and how many rows changed.
    async fn normalize(
        conn: &Connection,
        parent_id: TreeId,
        exclude: Option<TreeId>,
    ) -> Result<(i64, usize), DatabaseError> {
        let positions = TreeStore::get_child_positions(conn, parent_id, exclude).await?;

        let mut changed = 0;
        for (expected, (tree_id, index)) in positions.iter().enumerate() {
            let expected = expected as i64;
            if *index != expected {
                TreeStore::set_index(conn, *tree_id, expected).await?;
                changed += 1;
            }
        }

        Ok((positions.len() as i64, changed))
    }

    async fn shift(
        conn: &Connection,
        parent_id: TreeId,
        from_index: i64,
        delta: i64,
        exclude: Option<TreeId>,
    ) -> Result<u64, DatabaseError> {
        TreeStore::shift_indices(conn, parent_id, from_index, delta, exclude).await
    }

    /// Make room at `index` under `parent_id`
    ///
    /// `moving` names a node that is being relocated and must be ignored while
    /// counting and shifting. Valid positions are `0..=n` where `n` is the
    /// number of other children.
    pub async fn open_slot(
        conn: &Connection,
        parent_id: TreeId,
        index: i64,
        moving: Option<TreeId>,
    ) -> Result<(), TreeServiceError> {
        let (count, _) = Self::normalize(conn, parent_id, moving).await?;

        if index < 0 || index > count {
            return Err(ValidationError::InvalidIndex { index, max: count }.into());
        }

        let shifted = Self::shift(conn, parent_id, index, 1, moving).await?;
        debug!(
            "Opened slot {} under {} ({} siblings shifted)",
            index, parent_id, shifted
        );
        Ok(())
    }

    /// Close the gap left by `tree_id` leaving `parent_id`
    ///
    /// Must run while the node is still stored under `parent_id`. Returns the
    /// node's normalized index before it left.
    pub async fn close_slot(
        conn: &Connection,
        parent_id: TreeId,
        tree_id: TreeId,
    ) -> Result<i64, TreeServiceError> {
        Self::normalize(conn, parent_id, None).await?;

        let positions = TreeStore::get_child_positions(conn, parent_id, None).await?;
        let current = positions
            .iter()
            .find(|(id, _)| *id == tree_id)
            .map(|(_, index)| *index)
            .ok_or_else(|| TreeServiceError::node_not_found(tree_id))?;

        let shifted = Self::shift(conn, parent_id, current + 1, -1, Some(tree_id)).await?;
        debug!(
            "Closed slot {} under {} ({} siblings shifted)",
            current, parent_id, shifted
        );
        Ok(current)
    }

    /// Take `tree_id` out of `parent_id`, closing its slot
    pub async fn detach(
        conn: &Connection,
        parent_id: TreeId,
        tree_id: TreeId,
    ) -> Result<i64, TreeServiceError> {
        let index = Self::close_slot(conn, parent_id, tree_id).await?;
        TreeStore::set_placement(conn, tree_id, DETACHED_PARENT_ID, 0).await?;
        Ok(index)
    }

    /// Put a detached node at `index` under `parent_id`
    pub async fn place(
        conn: &Connection,
        parent_id: TreeId,
        index: i64,
        tree_id: TreeId,
    ) -> Result<(), TreeServiceError> {
        Self::open_slot(conn, parent_id, index, Some(tree_id)).await?;
        TreeStore::set_placement(conn, tree_id, parent_id, index).await?;
        Ok(())
    }

    /// Renumber the children of `parent_id`; returns whether anything changed
    pub async fn compact(conn: &Connection, parent_id: TreeId) -> Result<bool, DatabaseError> {
        let (_, changed) = Self::normalize(conn, parent_id, None).await?;
        Ok(changed > 0)
    }
}
