//! Failure explanation use case
//!
//! Provides human-readable explanations of why a file failed to sync,
//! including actionable suggestions and audit history. This powers the
//! `odrive explain <path>` CLI command.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{AuditEntry, Conflict, DriveItem, SyncPath, SyncStatus};
use crate::ports::IStateRepository;

/// Human-readable explanation of a file's sync state
///
/// Contains a summary message, actionable suggestions, and the
/// relevant audit history for the item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// The file path being explained
    pub path: SyncPath,
    /// The current sync state of the item
    pub state: String,
    /// Human-readable explanation of the current state
    pub message: String,
    /// Actionable suggestions for resolving issues
    pub suggestions: Vec<String>,
    /// Recent audit history entries for this item
    pub history: Vec<AuditEntry>,
}

impl Explanation {
    /// Creates a new Explanation for a sync item with its audit history
    fn from_item(item: &DriveItem, conflict: Option<&Conflict>, history: Vec<AuditEntry>) -> Self {
        let (message, suggestions) = Self::generate_explanation(item, conflict);

        Self {
            path: item.local_path().clone(),
            state: if conflict.is_some() {
                "conflicted".to_string()
            } else {
                item.sync_status().to_string()
            },
            message,
            suggestions,
            history,
        }
    }

    /// Creates an Explanation for a path that has no tracked sync item
    fn not_found(path: &SyncPath) -> Self {
        Self {
            path: path.clone(),
            state: "unknown".to_string(),
            message: "This file is not being tracked by ODrive.".to_string(),
            suggestions: vec![
                "Ensure the file is within the configured sync root directory.".to_string(),
                "Check that the file is not excluded by sync rules or .odriveignore.".to_string(),
                "Run 'odrive status' to verify the sync root configuration.".to_string(),
            ],
            history: Vec::new(),
        }
    }

    /// Generates a human-readable message and suggestions based on item state
    fn generate_explanation(
        item: &DriveItem,
        conflict: Option<&Conflict>,
    ) -> (String, Vec<String>) {
        if item.is_deleted() {
            return (
                "This file has been marked for deletion.".to_string(),
                vec![
                    "The deletion will be synced during the next sync cycle.".to_string(),
                    "If this was unintentional, check the OneDrive recycle bin.".to_string(),
                ],
            );
        }

        if conflict.is_some() {
            return (
                "This file has conflicting changes in both local and cloud versions.".to_string(),
                vec![
                    "Use 'odrive resolve <path> --keep-local' to keep your version.".to_string(),
                    "Use 'odrive resolve <path> --keep-remote' to use the cloud version."
                        .to_string(),
                    "Use 'odrive resolve <path> --keep-both' to keep both versions.".to_string(),
                ],
            );
        }

        match item.sync_status() {
            SyncStatus::Synced => (
                "This file is fully synced. Local and cloud copies match.".to_string(),
                vec![],
            ),

            SyncStatus::PendingUpload => (
                "This file has local changes that have not been uploaded yet.".to_string(),
                vec![
                    "Changes will be uploaded during the next sync cycle.".to_string(),
                    "Use 'odrive sync' to trigger an immediate sync.".to_string(),
                ],
            ),

            SyncStatus::PendingDownload => (
                "This file has changed in the cloud and has not been downloaded yet.".to_string(),
                vec![
                    "The download will happen during the next sync cycle.".to_string(),
                    "Use 'odrive sync' to trigger an immediate sync.".to_string(),
                ],
            ),

            SyncStatus::Failed => {
                let mut message =
                    "This file encountered an error during synchronization.".to_string();
                let mut suggestions = vec!["Check 'odrive status' for more details.".to_string()];

                if let Some(error_info) = item.error_info() {
                    message = format!(
                        "This file encountered an error during synchronization: {}",
                        error_info.message()
                    );

                    match error_info.code() {
                        "NETWORK_ERROR" => {
                            suggestions
                                .push("Check your network connection and try again.".to_string());
                        }
                        "AUTH_ERROR" => {
                            suggestions.push("Re-authenticate with 'odrive login'.".to_string());
                        }
                        "RATE_LIMITED" => {
                            suggestions.push(
                                "The cloud provider is rate-limiting requests. Wait a moment and retry."
                                    .to_string(),
                            );
                        }
                        _ => {
                            suggestions.push(
                                "Try 'odrive sync --force' to retry the operation.".to_string(),
                            );
                        }
                    }

                    if error_info.retry_count() > 0 {
                        suggestions.push(format!(
                            "This operation has been retried {} time(s) already.",
                            error_info.retry_count()
                        ));
                    }
                }

                (message, suggestions)
            }
        }
    }
}

/// Use case for generating human-readable failure explanations
///
/// Provides the `odrive explain` functionality by combining sync item
/// state with audit history to produce actionable explanations.
pub struct ExplainFailureUseCase {
    state_repository: Arc<dyn IStateRepository + Send + Sync>,
}

impl ExplainFailureUseCase {
    /// Creates a new ExplainFailureUseCase with the required dependencies
    ///
    /// # Arguments
    ///
    /// * `state_repository` - Persistent storage for querying item state and audit log
    pub fn new(state_repository: Arc<dyn IStateRepository + Send + Sync>) -> Self {
        Self { state_repository }
    }

    /// Generates a human-readable explanation for a file path
    ///
    /// This method:
    /// 1. Looks up the sync item by its local path
    /// 2. Checks whether the item has an unresolved conflict
    /// 3. Retrieves the audit history for the item
    /// 4. Generates a human-readable message with suggestions
    ///
    /// # Arguments
    ///
    /// * `path` - The local sync path to explain
    ///
    /// # Returns
    ///
    /// An Explanation struct with state, message, suggestions, and history
    ///
    /// # Errors
    ///
    /// Returns an error if the repository query fails
    pub async fn explain(&self, path: &SyncPath) -> Result<Explanation> {
        // Step 1: Look up the sync item by path
        let item = self
            .state_repository
            .get_item_by_path(path)
            .await
            .context("Failed to look up sync item by path")?;

        let Some(item) = item else {
            return Ok(Explanation::not_found(path));
        };

        // Step 2: Check for an unresolved conflict on this item
        let conflicts = self
            .state_repository
            .get_unresolved_conflicts()
            .await
            .context("Failed to query unresolved conflicts")?;
        let conflict = conflicts.into_iter().find(|c| c.item_id() == item.id());

        // Step 3: Get audit history for this item
        let history = self
            .state_repository
            .get_audit_trail(item.id())
            .await
            .context("Failed to retrieve audit history for item")?;

        // Step 4: Generate the explanation
        Ok(Explanation::from_item(&item, conflict.as_ref(), history))
    }
}
