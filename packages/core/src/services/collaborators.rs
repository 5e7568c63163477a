//! External collaborators of the tree
//!
//! The tree owns placement only. Labels and capacity come from a [`ContentStore`];
//! committed mutations are announced to a [`CacheInvalidator`], a
//! [`SitemapGenerator`] and [`MutationHooks`]. All of them are injected as trait
//! objects so hosts and tests can supply their own.

use crate::models::{ContentId, ContentItem, Mutation, MutationRecord, Principal};
use crate::services::error::TreeServiceError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

/// Read access to content item metadata
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_content_item(
        &self,
        content_id: ContentId,
    ) -> Result<Option<ContentItem>, TreeServiceError>;

    async fn content_item_exists(&self, content_id: ContentId) -> Result<bool, TreeServiceError> {
        Ok(self.get_content_item(content_id).await?.is_some())
    }
}

/// Whole-site cache flush after structural changes
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn flush_all(&self) -> Result<(), TreeServiceError>;
}

/// Sitemap rebuild after structural changes
#[async_trait]
pub trait SitemapGenerator: Send + Sync {
    async fn regenerate(&self) -> Result<(), TreeServiceError>;
}

/// Extension points around every mutation
///
/// `pre_mutate` runs before the transaction opens and may rewrite the mutation
/// (but not change its kind); an error aborts the mutation. `post_mutate` runs
/// after commit; its errors are logged and otherwise ignored.
#[async_trait]
pub trait MutationHooks: Send + Sync {
    async fn pre_mutate(
        &self,
        _principal: &Principal,
        mutation: Mutation,
    ) -> Result<Mutation, TreeServiceError> {
        Ok(mutation)
    }

    async fn post_mutate(&self, _record: &MutationRecord) -> Result<(), TreeServiceError> {
        Ok(())
    }
}

/// Cache invalidator that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn flush_all(&self) -> Result<(), TreeServiceError> {
        Ok(())
    }
}

/// Sitemap generator that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSitemapGenerator;

#[async_trait]
impl SitemapGenerator for NoopSitemapGenerator {
    async fn regenerate(&self) -> Result<(), TreeServiceError> {
        Ok(())
    }
}

/// Hooks that pass every mutation through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl MutationHooks for NoopHooks {}

/// Content store backed by a map, for tools and tests
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    items: RwLock<HashMap<ContentId, ContentItem>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = ContentItem>) -> Self {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|item| (item.content_id, item))
                    .collect(),
            ),
        }
    }

    /// Load a JSON array of content items (a catalog export)
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TreeServiceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TreeServiceError::collaborator(format!(
                "Failed to read content catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        let items: Vec<ContentItem> = serde_json::from_str(&raw).map_err(|e| {
            TreeServiceError::collaborator(format!(
                "Failed to parse content catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::with_items(items))
    }

    pub async fn insert(&self, item: ContentItem) {
        self.items.write().await.insert(item.content_id, item);
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_content_item(
        &self,
        content_id: ContentId,
    ) -> Result<Option<ContentItem>, TreeServiceError> {
        Ok(self.items.read().await.get(&content_id).cloned())
    }
}
