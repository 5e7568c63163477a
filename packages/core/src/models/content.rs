//! Content item metadata as seen by the tree
//!
//! The tree never reads or writes content fields. It only needs a label for path
//! building, the capacity bound of the content type, and the type id for the
//! login gate rule.

use super::tree_node::ContentId;
use serde::{Deserialize, Serialize};

/// Identifier of a content type (template)
pub type ContentTypeId = i64;

/// Metadata the content store exposes for one content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub content_id: ContentId,

    /// Slug-like label used as a path segment
    pub label: String,

    /// Maximum number of direct children; negative means unbounded
    #[serde(default = "unbounded")]
    pub max_children: i64,

    pub content_type_id: ContentTypeId,
}

fn unbounded() -> i64 {
    -1
}

impl ContentItem {
    /// Create an item without a capacity bound
    pub fn new(content_id: ContentId, label: impl Into<String>, content_type_id: ContentTypeId) -> Self {
        Self {
            content_id,
            label: label.into(),
            max_children: unbounded(),
            content_type_id,
        }
    }

    /// Set the capacity bound
    pub fn with_max_children(mut self, max_children: i64) -> Self {
        self.max_children = max_children;
        self
    }

    /// Capacity bound, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        usize::try_from(self.max_children).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity() {
        let item = ContentItem::new(1, "news", 3);
        assert_eq!(item.capacity(), None);
        assert_eq!(item.clone().with_max_children(0).capacity(), Some(0));
        assert_eq!(item.with_max_children(5).capacity(), Some(5));
    }

    #[test]
    fn test_missing_max_children_defaults_to_unbounded() {
        let item: ContentItem =
            serde_json::from_str(r#"{"contentId": 4, "label": "about", "contentTypeId": 1}"#)
                .unwrap();
        assert_eq!(item.max_children, -1);
        assert_eq!(item.capacity(), None);
    }
}
