//! AuditLogger - high-level audit logging service
//!
//! Wraps `IStateRepository::save_audit()` with convenience methods for
//! each type of auditable operation. All methods are non-fatal: errors
//! in audit persistence are logged via `tracing::warn!` but never propagated.

use std::sync::Arc;

use chrono::Utc;
use odrive_core::{
    domain::{
        audit::{AuditAction, AuditEntry, AuditResult},
        newtypes::{SessionId, UniqueId},
    },
    ports::state_repository::IStateRepository,
};
use serde_json::json;

/// High-level audit logger that wraps the state repository's audit persistence.
///
/// All methods silently swallow errors (logging a warning) to ensure
/// audit failures never break sync operations.
pub struct AuditLogger {
    state_repo: Arc<dyn IStateRepository>,
}

impl AuditLogger {
    /// Creates a new `AuditLogger` backed by the given state repository.
    pub fn new(state_repo: Arc<dyn IStateRepository>) -> Self {
        Self { state_repo }
    }

    /// Persist an audit entry, swallowing errors with a tracing warning.
    async fn save(&self, entry: &AuditEntry) {
        if let Err(e) = self.state_repo.save_audit(entry).await {
            tracing::warn!(error = %e, "Failed to save audit entry");
        }
    }

    // ========================================================================
    // Sync lifecycle
    // ========================================================================

    /// Log the start of a sync cycle.
    pub async fn log_sync_start(&self, session_id: SessionId) {
        let entry = AuditEntry::new(AuditAction::SyncStart, AuditResult::success())
            .with_session_id(session_id);
        self.save(&entry).await;
    }

    /// Log the successful completion of a sync cycle.
    pub async fn log_sync_complete(
        &self,
        session_id: SessionId,
        duration_ms: u64,
        downloaded: u32,
        uploaded: u32,
        deleted: u32,
        errors: usize,
    ) {
        let entry = AuditEntry::new(AuditAction::SyncComplete, AuditResult::success())
            .with_session_id(session_id)
            .with_duration_ms(duration_ms)
            .with_details(json!({
                "files_downloaded": downloaded,
                "files_uploaded": uploaded,
                "files_deleted": deleted,
                "errors": errors,
            }));
        self.save(&entry).await;
    }

    // ========================================================================
    // File operations
    // ========================================================================

    /// Log a file download from the cloud.
    pub async fn log_file_download(
        &self,
        item_id: UniqueId,
        path: &str,
        size_bytes: u64,
        duration_ms: u64,
    ) {
        let entry = AuditEntry::new(AuditAction::FileDownload, AuditResult::success())
            .with_item_id(item_id)
            .with_duration_ms(duration_ms)
            .with_details(json!({
                "path": path,
                "size_bytes": size_bytes,
            }));
        self.save(&entry).await;
    }

    /// Log a file upload to the cloud.
    pub async fn log_file_upload(
        &self,
        item_id: UniqueId,
        path: &str,
        size_bytes: u64,
        duration_ms: u64,
    ) {
        let entry = AuditEntry::new(AuditAction::FileUpload, AuditResult::success())
            .with_item_id(item_id)
            .with_duration_ms(duration_ms)
            .with_details(json!({
                "path": path,
                "size_bytes": size_bytes,
            }));
        self.save(&entry).await;
    }

    /// Log a file deletion (local or remote).
    pub async fn log_file_delete(&self, item_id: UniqueId, path: &str) {
        let entry = AuditEntry::new(AuditAction::FileDelete, AuditResult::success())
            .with_item_id(item_id)
            .with_details(json!({
                "path": path,
            }));
        self.save(&entry).await;
    }

    // ========================================================================
    // Conflicts and errors
    // ========================================================================

    /// Log detection of a sync conflict.
    pub async fn log_conflict_detected(&self, item_id: UniqueId, path: &str, reason: &str) {
        let entry = AuditEntry::new(AuditAction::ConflictDetected, AuditResult::success())
            .with_item_id(item_id)
            .with_details(json!({
                "path": path,
                "reason": reason,
            }));
        self.save(&entry).await;
    }

    /// Log resolution of a sync conflict.
    pub async fn log_conflict_resolved(
        &self,
        item_id: UniqueId,
        path: &str,
        resolution: &str,
    ) {
        let entry = AuditEntry::new(AuditAction::ConflictResolved, AuditResult::success())
            .with_item_id(item_id)
            .with_details(json!({
                "path": path,
                "resolution": resolution,
            }));
        self.save(&entry).await;
    }

    /// Log a non-fatal error during sync.
    pub async fn log_error(&self, message: &str, context: Option<&str>) {
        let result = AuditResult::failed("SYNC_ERROR", message);
        let mut entry = AuditEntry::new(AuditAction::Error, result);
        if let Some(ctx) = context {
            entry = entry.with_details(json!({
                "context": ctx,
                "timestamp": Utc::now().to_rfc3339(),
            }));
        }
        self.save(&entry).await;
    }
}
