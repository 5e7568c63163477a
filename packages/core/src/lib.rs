//! SiteTree Core
//!
//! Placement hierarchy for a content-managed web site: which content item
//! (page) appears where, in what order, behind which login gate, and under which
//! structural lock.
//!
//! # Architecture
//!
//! - **Placement, not content**: tree nodes reference external content items by id
//! - **Contiguous ordering**: siblings are always indexed `0..n-1`
//! - **One write path**: every structural change goes through the
//!   [`MutationCoordinator`], one `BEGIN IMMEDIATE` transaction per mutation
//! - **libsql**: embedded SQLite-compatible database
//!
//! # Modules
//!
//! - [`models`] - Data structures (TreeNode, ContentItem, Principal, Mutation)
//! - [`db`] - Database layer with libsql integration
//! - [`tree`] - Index allocation, path and shortcut resolution, access, locks,
//!   orphan reclamation, integrity audit
//! - [`services`] - Mutation coordinator, query service, collaborators, events
//! - [`config`] - Tree configuration (file and environment)

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod tree;

// Re-export commonly used types
pub use config::{TreeConfig, MAX_PATH_HOPS};
pub use models::*;
pub use services::*;
