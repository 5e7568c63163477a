//! Tree audit tool for SiteTree databases
//!
//! Checks a site tree database for structural damage (index gaps, dangling
//! parents, invalid shortcuts, lock and capacity violations) and prints the
//! report as JSON. Optionally runs a repair pass first.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tree-audit
//! ```
//!
//! # Environment Variables
//!
//! - `SITETREE_DB_PATH`: Database file to audit (default: ./sitetree.db)
//! - `SITETREE_SINGLE_ROOT`: Report more than one top-level node as damage
//! - `SITETREE_CONTENT_CATALOG`: JSON file with the content catalog used to
//!   resolve capacities (default: empty catalog)
//! - `SITETREE_REPAIR`: When set, reclaim orphans and renumber siblings before
//!   auditing
//! - `RUST_LOG`: Log filter (default: info)
//!
//! The process exits with status 1 when the final report is not clean.

use anyhow::Context;
use sitetree_core::db::DatabaseService;
use sitetree_core::services::ContentStore;
use sitetree_core::tree::IntegrityAuditor;
use sitetree_core::{InMemoryContentStore, MutationCoordinator, Principal, TreeConfig};
use std::sync::Arc;

const ENV_CONTENT_CATALOG: &str = "SITETREE_CONTENT_CATALOG";
const ENV_REPAIR: &str = "SITETREE_REPAIR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = TreeConfig::default()
        .apply_env_overrides()
        .context("invalid SITETREE_* environment")?;
    config.validate()?;

    let content: Arc<dyn ContentStore> = match std::env::var(ENV_CONTENT_CATALOG) {
        Ok(path) => Arc::new(
            InMemoryContentStore::from_json_file(&path)
                .with_context(|| format!("failed to load content catalog {}", path))?,
        ),
        Err(_) => Arc::new(InMemoryContentStore::new()),
    };

    tracing::info!("Auditing {}", config.database_path.display());
    let db = Arc::new(DatabaseService::from_config(&config).await?);
    let auditor = IntegrityAuditor::new(content.clone(), config.single_root);

    let before = {
        let conn = db.connect_with_timeout().await?;
        auditor.audit(&conn).await?
    };

    let (output, final_report) = if std::env::var_os(ENV_REPAIR).is_some() {
        let coordinator = MutationCoordinator::new(db.clone(), content, config.clone());
        let repair = coordinator
            .repair(&Principal::administrator(0))
            .await
            .context("repair failed")?;
        coordinator.notifications_settled().await;
        db.checkpoint().await?;
        tracing::info!(
            "Repair reclaimed {} nodes and renumbered {} parents",
            repair.reclaimed,
            repair.normalized_parents
        );

        let conn = db.connect_with_timeout().await?;
        let after = auditor.audit(&conn).await?;
        (
            serde_json::json!({ "before": before, "repair": repair, "after": after }),
            after,
        )
    } else {
        (serde_json::json!({ "report": before }), before)
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    if !final_report.is_clean() {
        tracing::warn!("Tree is not clean");
        std::process::exit(1);
    }
    Ok(())
}
