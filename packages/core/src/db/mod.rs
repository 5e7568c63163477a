//! Database Layer
//!
//! Persistence for the site tree using an embedded libsql (SQLite) database:
//!
//! - Connection management and idempotent schema creation (`DatabaseService`)
//! - Row mapping and SQL for tree and group rows (`TreeStore`)
//!
//! Every `TreeStore` function takes a `&libsql::Connection`, so callers decide
//! the transaction boundary. Mutations run inside a single `BEGIN IMMEDIATE`
//! transaction obtained from [`DatabaseService::begin_write`].

mod database;
mod error;
mod tree_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use tree_store::{NewTreeNode, TreeStore};
