//! Business Services
//!
//! - `MutationCoordinator` - the only write path: validation, rules, one
//!   transaction per mutation, notifications
//! - `TreeQueryService` - reads: children, breadcrumbs, paths, label lookup,
//!   sitemap entries
//! - Collaborator traits (`ContentStore`, `CacheInvalidator`,
//!   `SitemapGenerator`, `MutationHooks`) with no-op and in-memory defaults
//! - `TreeEvent` broadcast of committed mutations

pub mod collaborators;
pub mod error;
pub mod events;
pub mod mutation_coordinator;
mod notifier;
pub mod tree_query;

pub use collaborators::{
    CacheInvalidator, ContentStore, InMemoryContentStore, MutationHooks, NoopCacheInvalidator,
    NoopHooks, NoopSitemapGenerator, SitemapGenerator,
};
pub use error::TreeServiceError;
pub use events::TreeEvent;
pub use mutation_coordinator::{required_permission, Collaborators, MutationCoordinator};
pub use tree_query::{ChildLookup, SitemapEntry, TreeQueryService};
