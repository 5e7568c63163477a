//! Database Connection Management
//!
//! This module provides the database connection and initialization
//! functionality using libsql for the site tree.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging so readers never block the writer
//! - **Busy timeout**: Concurrent writers wait instead of failing with `SQLITE_BUSY`
//! - **Write transactions**: Every structural mutation runs inside
//!   `BEGIN IMMEDIATE`, which takes the write lock up front
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions** so the busy
//! timeout is configured on the connection that runs the statements.
//!
//! ```no_run
//! # use sitetree_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/sitetree.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{TreeConfig, DEFAULT_BUSY_TIMEOUT_MS};
use crate::db::error::DatabaseError;
use libsql::{Builder, Database, Transaction, TransactionBehavior};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Enable WAL mode and the busy timeout
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::open(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
    }

    /// Create a DatabaseService from a [`TreeConfig`]
    pub async fn from_config(config: &TreeConfig) -> Result<Self, DatabaseError> {
        Self::open(config.database_path.clone(), config.busy_timeout_ms).await
    }

    async fn open(db_path: PathBuf, busy_timeout_ms: u64) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms,
        };

        service.initialize_schema(is_new_database).await?;

        tracing::debug!("Opened site tree database at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: safe to call on an existing database.
    ///
    /// # Schema
    ///
    /// - `tree_nodes`: one row per placement. No foreign key on `parent_id`;
    ///   dangling parents are reclaimed explicitly.
    /// - `tree_node_groups`: many-to-many required groups per node
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tree_nodes (
                tree_id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER NOT NULL,
                content_id INTEGER NOT NULL,
                sort_index INTEGER NOT NULL,
                locked INTEGER NOT NULL DEFAULT 0,
                shortcut_target INTEGER,
                login_required INTEGER NOT NULL DEFAULT 0
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create tree_nodes table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tree_node_groups (
                tree_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                PRIMARY KEY (tree_id, group_id)
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create tree_node_groups table: {}",
                e
            ))
        })?;

        self.create_core_indexes(&conn).await?;

        // Flush the freshly created schema so other connections see it immediately
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create core indexes for the tree tables
    async fn create_core_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let indexes = [
            (
                "idx_tree_parent_order",
                "CREATE INDEX IF NOT EXISTS idx_tree_parent_order ON tree_nodes(parent_id, sort_index)",
            ),
            (
                "idx_tree_content",
                "CREATE INDEX IF NOT EXISTS idx_tree_content ON tree_nodes(content_id)",
            ),
            (
                "idx_tree_shortcut",
                "CREATE INDEX IF NOT EXISTS idx_tree_shortcut ON tree_nodes(shortcut_target)",
            ),
            (
                "idx_tree_groups_node",
                "CREATE INDEX IF NOT EXISTS idx_tree_groups_node ON tree_node_groups(tree_id)",
            ),
        ];

        for (name, sql) in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    name, e
                ))
            })?;
        }

        Ok(())
    }

    /// Get a connection to the database
    ///
    /// Only for short synchronous setup code; async callers should use
    /// `connect_with_timeout()`.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with the busy timeout configured
    ///
    /// Concurrent writers wait up to the configured timeout for the write lock
    /// instead of failing immediately.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;

        Ok(conn)
    }

    /// Open a write transaction (`BEGIN IMMEDIATE`)
    ///
    /// The write lock is taken before the first read, so a read-modify-write unit
    /// (normalize, shift, write) can never interleave with another writer.
    /// Callers must `commit()` or `rollback()` explicitly.
    pub async fn begin_write(&self) -> Result<Transaction, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e)))
    }

    /// Flush the WAL into the main database file
    pub async fn checkpoint(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await
    }
}
