//! Concurrent Mutation Tests
//!
//! Many tasks mutate the same parent at once. Every mutation runs in its own
//! write transaction, so siblings must end up contiguous with no lost updates.

#[cfg(test)]
mod concurrency_tests {
    use anyhow::Result;
    use sitetree_core::db::DatabaseService;
    use sitetree_core::tree::IntegrityAuditor;
    use sitetree_core::{
        ContentItem, InMemoryContentStore, MoveItem, MutationCoordinator, Principal, TreeConfig,
        TreeQueryService,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    const WRITERS: i64 = 24;

    async fn setup() -> Result<(Arc<MutationCoordinator>, TreeQueryService, Arc<DatabaseService>, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = Arc::new(DatabaseService::new(temp_dir.path().join("tree.db")).await?);
        let items = (1..=WRITERS * 2).map(|id| ContentItem::new(id, format!("p{}", id), 1));
        let content = Arc::new(InMemoryContentStore::with_items(items));
        let config = TreeConfig::default();

        let coordinator = Arc::new(MutationCoordinator::new(
            db.clone(),
            content.clone(),
            config.clone(),
        ));
        let query = TreeQueryService::new(db.clone(), content, config.max_path_hops);
        Ok((coordinator, query, db, temp_dir))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_keep_indices_contiguous() -> Result<()> {
        let (coordinator, query, db, _temp_dir) = setup().await?;
        let admin = Principal::administrator(1);

        let mut handles = Vec::new();
        for content_id in 1..=WRITERS {
            let coordinator = coordinator.clone();
            let admin = admin.clone();
            handles.push(tokio::spawn(async move {
                coordinator.insert(&admin, content_id, 0, 0).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let children = query.children(0).await?;
        assert_eq!(children.len() as i64, WRITERS);
        let indices: Vec<i64> = children.iter().map(|n| n.index).collect();
        assert_eq!(indices, (0..WRITERS).collect::<Vec<_>>());

        let conn = db.connect_with_timeout().await?;
        let report = IntegrityAuditor::new(Arc::new(InMemoryContentStore::new()), false)
            .audit(&conn)
            .await?;
        assert!(report.is_clean());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_moves_and_inserts() -> Result<()> {
        let (coordinator, query, _db, _temp_dir) = setup().await?;
        let admin = Principal::administrator(1);

        let holder = coordinator.insert(&admin, WRITERS * 2, 0, 0).await?;
        let seeded = coordinator
            .insert_batch(&admin, (1..=WRITERS).collect(), 0, 1)
            .await?;

        let mut handles = Vec::new();
        for (i, node) in seeded.nodes.into_iter().enumerate() {
            let coordinator = coordinator.clone();
            let admin = admin.clone();
            let holder_id = holder.tree_id;
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    coordinator
                        .move_node(&admin, MoveItem::new(node.tree_id, 0), holder_id, 0)
                        .await
                        .map(|_| ())
                } else {
                    coordinator
                        .insert(&admin, WRITERS + 1 + i as i64, holder_id, 0)
                        .await
                        .map(|_| ())
                }
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let root_indices: Vec<i64> = query.children(0).await?.iter().map(|n| n.index).collect();
        assert_eq!(root_indices, (0..root_indices.len() as i64).collect::<Vec<_>>());

        let held = query.children(holder.tree_id).await?;
        assert_eq!(held.len() as i64, WRITERS);
        let held_indices: Vec<i64> = held.iter().map(|n| n.index).collect();
        assert_eq!(held_indices, (0..WRITERS).collect::<Vec<_>>());
        Ok(())
    }
}
