//! Post-commit notification worker
//!
//! Committed mutations are queued on an unbounded channel and handled by a
//! background task in order: cache flush, sitemap regeneration, post-mutation
//! hook. Collaborator failures are logged and never reach the caller of the
//! mutation.

use crate::models::MutationRecord;
use crate::services::collaborators::{CacheInvalidator, MutationHooks, SitemapGenerator};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

enum NotifierMessage {
    Committed(Box<MutationRecord>),
    /// Answered once every earlier message has been handled
    Sync(oneshot::Sender<()>),
}

pub struct Notifier {
    tx: mpsc::UnboundedSender<NotifierMessage>,
}

impl Notifier {
    /// Start the worker task; must be called within a Tokio runtime
    pub fn spawn(
        cache: Arc<dyn CacheInvalidator>,
        sitemap: Arc<dyn SitemapGenerator>,
        hooks: Arc<dyn MutationHooks>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, cache, sitemap, hooks));
        Self { tx }
    }

    pub fn notify(&self, record: MutationRecord) {
        if self
            .tx
            .send(NotifierMessage::Committed(Box::new(record)))
            .is_err()
        {
            error!("Notification worker is gone; dropping mutation notification");
        }
    }

    /// Wait until every notification queued so far has been handled
    pub async fn settled(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(NotifierMessage::Sync(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<NotifierMessage>,
    cache: Arc<dyn CacheInvalidator>,
    sitemap: Arc<dyn SitemapGenerator>,
    hooks: Arc<dyn MutationHooks>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            NotifierMessage::Committed(record) => {
                let kind = record.kind.as_str();

                if let Err(e) = cache.flush_all().await {
                    error!("Cache flush after {} failed: {}", kind, e);
                }
                if let Err(e) = sitemap.regenerate().await {
                    error!("Sitemap regeneration after {} failed: {}", kind, e);
                }
                if let Err(e) = hooks.post_mutate(&record).await {
                    error!("Post-mutation hook for {} failed: {}", kind, e);
                }

                debug!("Notified collaborators of {}", kind);
            }
            NotifierMessage::Sync(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Notification worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mutation, MutationKind, MutationOutcome};
    use crate::services::collaborators::{NoopHooks, NoopSitemapGenerator};
    use crate::services::TreeServiceError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FailingCache {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheInvalidator for FailingCache {
        async fn flush_all(&self) -> Result<(), TreeServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TreeServiceError::collaborator("cache offline"))
        }
    }

    fn record() -> MutationRecord {
        MutationRecord {
            kind: MutationKind::Unlock,
            mutation: Mutation::Unlock { tree_id: 1 },
            outcome: MutationOutcome::Unlocked { tree_id: 1 },
            principal_id: 1,
            committed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_worker_survives_collaborator_failure() {
        let cache = Arc::new(FailingCache::default());
        let notifier = Notifier::spawn(
            cache.clone(),
            Arc::new(NoopSitemapGenerator),
            Arc::new(NoopHooks),
        );

        notifier.notify(record());
        notifier.notify(record());
        notifier.settled().await;

        assert_eq!(cache.calls.load(Ordering::SeqCst), 2);
    }
}
