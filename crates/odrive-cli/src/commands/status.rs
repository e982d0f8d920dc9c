//! Status command - Display synchronization status
//!
//! Provides the `odrive status` CLI command which:
//! 1. Shows global sync status (item counts by status, last sync time)
//! 2. Shows per-file status when a path is given
//! 3. Lists pending (PendingUpload/PendingDownload) items
//! 4. Lists items in Failed status with error details

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

/// T189: Status command with optional path argument
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Optional path to check status of a specific file
    pub path: Option<String>,
}

impl StatusCommand {
    /// T190-T193: Execute the status command
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        use odrive_cache::{pool::DatabasePool, SqliteStateRepository};
        use odrive_core::ports::state_repository::IStateRepository;

        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        // Open database
        let db_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("odrive")
            .join("odrive.db");

        if !db_path.exists() {
            formatter
                .error("No database found. Run 'odrive auth login' and 'odrive sync' first.");
            return Ok(());
        }

        let pool = DatabasePool::new(Path::new(&db_path))
            .await
            .context("Failed to open database")?;
        let state_repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));

        // Get default account
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

        if let Some(ref path_str) = self.path {
            // T191: Per-file status
            self.show_file_status(&*state_repo, path_str, &format, &*formatter)
                .await
        } else {
            // T190, T192, T193: Global status
            self.show_global_status(&*state_repo, &account, &format, &*formatter)
                .await
        }
    }

    /// T190: Display global synchronization status
    async fn show_global_status(
        &self,
        state_repo: &dyn odrive_core::ports::IStateRepository,
        account: &odrive_core::domain::Account,
        format: &OutputFormat,
        formatter: &dyn crate::output::OutputFormatter,
    ) -> Result<()> {
        use odrive_core::{domain::sync_item::SyncStatus, ports::state_repository::ItemFilter};

        info!(email = %account.email(), "Showing status for account");

        // Query counts by status
        let counts = state_repo
            .count_items_by_state(account.id())
            .await
            .context("Failed to count items by status")?;

        let total: u64 = counts.values().sum();

        if matches!(format, OutputFormat::Json) {
            let last_sync_str = account
                .last_sync()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());

            let json = serde_json::json!({
                "account": account.email().as_str(),
                "last_sync": last_sync_str,
                "total_items": total,
                "items_by_state": counts,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        // Human-readable output
        formatter.success(&format!("ODrive Status - {}", account.email()));
        formatter.info("");

        // Last sync time
        match account.last_sync() {
            Some(time) => {
                formatter.info(&format!(
                    "Last sync: {}",
                    time.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
            None => {
                formatter.info("Last sync: Never");
            }
        }

        formatter.info(&format!("Total items: {}", total));
        formatter.info("");

        // Status counts table
        let state_order = ["Synced", "PendingUpload", "PendingDownload", "Failed"];
        formatter.info("Status          Count");
        formatter.info("--------------- -----");
        for state_name in &state_order {
            let count = counts.get(*state_name).copied().unwrap_or(0);
            if count > 0 {
                formatter.info(&format!("{:<15} {}", state_name, count));
            }
        }

        // T192: Show pending items (PendingUpload/PendingDownload)
        let upload_items = state_repo
            .query_items(&ItemFilter::new().with_state(SyncStatus::PendingUpload))
            .await
            .context("Failed to query pending-upload items")?;

        let download_items = state_repo
            .query_items(&ItemFilter::new().with_state(SyncStatus::PendingDownload))
            .await
            .context("Failed to query pending-download items")?;

        if !upload_items.is_empty() || !download_items.is_empty() {
            formatter.info("");
            formatter.info("Pending items:");

            for item in &upload_items {
                let path_str = truncate_path(item.local_path().to_string(), 60);
                formatter.info(&format!("  [Upload]   {}", path_str));
            }

            for item in &download_items {
                let path_str = truncate_path(item.local_path().to_string(), 60);
                formatter.info(&format!("  [Download] {}", path_str));
            }
        }

        // T193: Show failed items
        let failed_items = state_repo
            .query_items(&ItemFilter::new().with_state(SyncStatus::Failed))
            .await
            .context("Failed to query failed items")?;

        if !failed_items.is_empty() {
            formatter.info("");
            formatter.error(&format!("{} file(s) with errors:", failed_items.len()));

            for item in &failed_items {
                let path_str = truncate_path(item.local_path().to_string(), 50);
                let reason = match item.error_info() {
                    Some(err) => format!("[{}] {}", err.code(), err.message()),
                    None => "Unknown error".to_string(),
                };
                formatter.info(&format!("  {} - {}", path_str, reason));
            }
        }

        Ok(())
    }

    /// T191: Display status for a specific file
    async fn show_file_status(
        &self,
        state_repo: &dyn odrive_core::ports::IStateRepository,
        path_str: &str,
        format: &OutputFormat,
        formatter: &dyn crate::output::OutputFormatter,
    ) -> Result<()> {
        use odrive_core::domain::newtypes::SyncPath;

        // Resolve to absolute path
        let abs_path = if PathBuf::from(path_str).is_absolute() {
            PathBuf::from(path_str)
        } else {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(path_str)
        };

        let sync_path = SyncPath::new(abs_path.clone()).context("Invalid path")?;

        let item = state_repo
            .get_item_by_path(&sync_path)
            .await
            .context("Failed to query item by path")?;

        match item {
            Some(item) => {
                if matches!(format, OutputFormat::Json) {
                    let json = serde_json::json!({
                        "path": item.local_path().to_string(),
                        "remote_path": item.remote_path().to_string(),
                        "remote_id": item.remote_id().map(|r| r.to_string()),
                        "sync_status": item.sync_status().to_string(),
                        "last_sync_direction": item.last_sync_direction().to_string(),
                        "size_bytes": item.size_bytes(),
                        "remote_hash": item.remote_hash().map(|h| h.to_string()),
                        "local_hash": item.local_hash().map(|h| h.to_string()),
                        "last_modified_local": item.last_modified_local().map(|t| t.to_rfc3339()),
                        "last_modified_remote": item.last_modified_remote().map(|t| t.to_rfc3339()),
                        "last_sync": item.last_sync().map(|t| t.to_rfc3339()),
                        "error_info": item.error_info().map(|e| e.to_string()),
                    });
                    formatter.print_json(&json);
                    return Ok(());
                }

                formatter.success(&format!("File status: {}", item.local_path()));
                formatter.info("");
                formatter.info(&format!("Status:         {}", item.sync_status()));
                formatter.info(&format!("Local path:     {}", item.local_path()));
                formatter.info(&format!("Remote path:    {}", item.remote_path()));
                formatter.info(&format!(
                    "Remote ID:      {}",
                    item.remote_id()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "(not assigned)".to_string())
                ));
                formatter.info(&format!("Size:           {} bytes", item.size_bytes()));
                formatter.info(&format!(
                    "Remote hash:    {}",
                    item.remote_hash()
                        .map(|h| h.to_string())
                        .unwrap_or_else(|| "(none)".to_string())
                ));
                formatter.info(&format!(
                    "Local hash:     {}",
                    item.local_hash()
                        .map(|h| h.to_string())
                        .unwrap_or_else(|| "(none)".to_string())
                ));
                formatter.info("");

                // Timestamps
                formatter.info(&format!(
                    "Local modified:  {}",
                    item.last_modified_local()
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| "(unknown)".to_string())
                ));
                formatter.info(&format!(
                    "Remote modified: {}",
                    item.last_modified_remote()
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| "(unknown)".to_string())
                ));
                formatter.info(&format!(
                    "Last sync:       {}",
                    item.last_sync()
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| "(never)".to_string())
                ));
                formatter.info("");

                // Error info
                if let Some(error) = item.error_info() {
                    formatter.info(&format!("Error: {}", error));
                }
            }
            None => {
                if matches!(format, OutputFormat::Json) {
                    let json = serde_json::json!({
                        "path": abs_path.display().to_string(),
                        "state": "not_tracked",
                        "message": "File is not tracked by ODrive",
                    });
                    formatter.print_json(&json);
                    return Ok(());
                }

                formatter.info(&format!(
                    "File '{}' is not tracked by ODrive.",
                    abs_path.display()
                ));
                formatter.info("It may be outside the sync folder or excluded by sync rules.");
            }
        }

        Ok(())
    }
}

/// Truncate a path string to a maximum length, showing the end of the path
fn truncate_path(path: String, max_len: usize) -> String {
    if path.len() <= max_len {
        path
    } else {
        format!("...{}", &path[path.len() - (max_len - 3)..])
    }
}

