//! Notification and Hook Tests
//!
//! Committed mutations notify collaborators in a fixed order (cache flush,
//! sitemap regeneration, post-mutation hook) and broadcast a tree event.
//! Failed mutations notify nobody. Pre-mutation hooks can rewrite or veto.

#[cfg(test)]
mod notification_tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use sitetree_core::db::DatabaseService;
    use sitetree_core::{
        CacheInvalidator, Collaborators, ContentItem, InMemoryContentStore, Mutation,
        MutationCoordinator, MutationHooks, MutationRecord, Principal, SitemapGenerator,
        TreeConfig, TreeEvent, TreeServiceError,
    };
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct RecordingCache(Journal);
    struct RecordingSitemap(Journal);

    /// Records calls, pushes inserts to the end of the parent and vetoes content 666
    struct RecordingHooks {
        journal: Journal,
        fail_post: bool,
    }

    #[async_trait]
    impl CacheInvalidator for RecordingCache {
        async fn flush_all(&self) -> Result<(), TreeServiceError> {
            self.0.lock().unwrap().push("flush".to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl SitemapGenerator for RecordingSitemap {
        async fn regenerate(&self) -> Result<(), TreeServiceError> {
            self.0.lock().unwrap().push("sitemap".to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl MutationHooks for RecordingHooks {
        async fn pre_mutate(
            &self,
            _principal: &Principal,
            mutation: Mutation,
        ) -> Result<Mutation, TreeServiceError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("pre:{}", mutation.kind().as_str()));

            match mutation {
                Mutation::Insert { content_ids, .. } if content_ids.contains(&666) => {
                    Err(TreeServiceError::hook_rejected("content 666 is not allowed"))
                }
                Mutation::Insert { content_ids, .. } if content_ids.contains(&777) => {
                    Ok(Mutation::Remove { tree_ids: vec![1] })
                }
                other => Ok(other),
            }
        }

        async fn post_mutate(&self, record: &MutationRecord) -> Result<(), TreeServiceError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("post:{}", record.kind.as_str()));
            if self.fail_post {
                return Err(TreeServiceError::collaborator("post hook failed"));
            }
            Ok(())
        }
    }

    async fn setup(fail_post: bool) -> Result<(MutationCoordinator, Journal, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = Arc::new(DatabaseService::new(temp_dir.path().join("tree.db")).await?);
        let content = Arc::new(InMemoryContentStore::with_items([
            ContentItem::new(1, "home", 1),
            ContentItem::new(2, "about", 1),
            ContentItem::new(666, "spam", 1),
            ContentItem::new(777, "sneaky", 1),
        ]));

        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let collaborators = Collaborators {
            cache: Arc::new(RecordingCache(journal.clone())),
            sitemap: Arc::new(RecordingSitemap(journal.clone())),
            hooks: Arc::new(RecordingHooks {
                journal: journal.clone(),
                fail_post,
            }),
        };

        let coordinator =
            MutationCoordinator::with_collaborators(db, content, TreeConfig::default(), collaborators);
        Ok((coordinator, journal, temp_dir))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_collaborators_called_in_order() -> Result<()> {
        let (coordinator, journal, _temp_dir) = setup(false).await?;
        let admin = Principal::administrator(1);

        coordinator.insert(&admin, 1, 0, 0).await?;
        coordinator.notifications_settled().await;

        assert_eq!(
            entries(&journal),
            vec!["pre:insert", "flush", "sitemap", "post:insert"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_mutation_notifies_nobody() -> Result<()> {
        let (coordinator, journal, _temp_dir) = setup(false).await?;
        let admin = Principal::administrator(1);

        // Unknown parent: passes the hook, fails in the transaction
        assert!(coordinator.insert(&admin, 1, 55, 0).await.is_err());
        coordinator.notifications_settled().await;

        assert_eq!(entries(&journal), vec!["pre:insert"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_pre_hook_can_veto() -> Result<()> {
        let (coordinator, journal, _temp_dir) = setup(false).await?;
        let admin = Principal::administrator(1);

        let err = coordinator.insert(&admin, 666, 0, 0).await.unwrap_err();
        assert!(matches!(err, TreeServiceError::HookRejected(_)));

        // A hook may not change what kind of mutation runs
        let err = coordinator.insert(&admin, 777, 0, 0).await.unwrap_err();
        assert!(matches!(err, TreeServiceError::HookRejected(_)));

        coordinator.notifications_settled().await;
        assert_eq!(entries(&journal), vec!["pre:insert", "pre:insert"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_post_hook_failure_does_not_fail_mutation() -> Result<()> {
        let (coordinator, journal, _temp_dir) = setup(true).await?;
        let admin = Principal::administrator(1);

        let first = coordinator.insert(&admin, 1, 0, 0).await?;
        coordinator.insert(&admin, 2, first.tree_id, 0).await?;
        coordinator.notifications_settled().await;

        let journal = entries(&journal);
        assert_eq!(journal.iter().filter(|e| *e == "post:insert").count(), 2);
        assert_eq!(journal.iter().filter(|e| *e == "flush").count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_events_broadcast_after_commit() -> Result<()> {
        let (coordinator, _journal, _temp_dir) = setup(false).await?;
        let admin = Principal::administrator(1);
        let mut rx = coordinator.subscribe_to_events();

        let node = coordinator.insert(&admin, 1, 0, 0).await?;
        coordinator.lock(&admin, node.tree_id).await?;
        coordinator.remove_batch(&admin, vec![node.tree_id]).await.unwrap_err();

        match rx.recv().await? {
            TreeEvent::NodesInserted { nodes } => assert_eq!(nodes[0].tree_id, node.tree_id),
            other => panic!("unexpected event {:?}", other),
        }

        let event = rx.recv().await?;
        assert_eq!(event.event_type(), "tree:lock-changed");

        // The failed removal emitted nothing
        assert!(rx.try_recv().is_err());
        Ok(())
    }
}
