//! Conflict detection logic
//!
//! Determines whether a remote change conflicts with local modifications.
//! Per the store's comparison rule: local-vs-stored uses content hash,
//! remote-vs-stored uses ctag.

use odrive_core::domain::{
    conflict::{Conflict, VersionInfo},
    sync_item::{DriveItem, SyncStatus},
};
use tracing::{debug, info};

use crate::policy::PolicyEngine;

/// Result of conflict detection check
#[derive(Debug, Clone)]
pub enum DetectionResult {
    /// No conflict: safe to apply the remote change
    NoConflict,
    /// Conflict detected: both versions changed
    Conflicted(Box<Conflict>),
}

/// Detects conflicts between local and remote file versions
pub struct ConflictDetector;

impl ConflictDetector {
    /// Checks if a remote update conflicts with the local state
    ///
    /// A conflict exists when:
    /// 1. The item has a pending local upload (local changes not yet pushed), AND
    /// 2. The remote ctag differs from the stored ctag (remote also changed)
    ///
    /// Returns `DetectionResult::Conflicted` with a new `Conflict` entity
    /// if both sides changed, or `DetectionResult::NoConflict` otherwise.
    pub fn check_remote_update(
        existing: &DriveItem,
        remote_ctag: Option<&str>,
        remote_size: Option<u64>,
        remote_modified: Option<chrono::DateTime<chrono::Utc>>,
        remote_etag: Option<&str>,
    ) -> DetectionResult {
        // Only check for conflicts if the item has local modifications pending.
        if existing.sync_status() != SyncStatus::PendingUpload {
            return DetectionResult::NoConflict;
        }

        // If we can't determine the remote ctag, we can't detect conflicts.
        let Some(remote_ctag_str) = remote_ctag else {
            return DetectionResult::NoConflict;
        };

        let stored_ctag = existing.remote_ctag();
        let remote_changed = match stored_ctag {
            Some(stored) => stored != remote_ctag_str,
            None => true, // No stored ctag, assume changed
        };

        if !remote_changed {
            debug!(
                path = %existing.local_path(),
                "Remote ctag matches stored ctag, no conflict"
            );
            return DetectionResult::NoConflict;
        }

        // Both local (pending upload) and remote (ctag changed) have changes.
        info!(
            path = %existing.local_path(),
            stored_ctag = ?stored_ctag,
            remote_ctag = %remote_ctag_str,
            "Conflict detected: both local and remote versions changed"
        );

        let local_version = build_local_version(existing);
        let remote_version = build_remote_version(
            remote_size.unwrap_or(0),
            remote_modified.unwrap_or_else(chrono::Utc::now),
            remote_etag,
        );

        let conflict = Conflict::new(*existing.id(), local_version, remote_version);
        DetectionResult::Conflicted(Box::new(conflict))
    }

    /// Checks if a local update conflicts with a known remote change
    ///
    /// This is the reverse direction: before uploading a local change,
    /// verify the remote hasn't also changed (e.g., via a concurrent delta).
    /// Uses content hash since this compares actual file content, not
    /// remote metadata.
    pub fn check_local_update(existing: &DriveItem, current_remote_hash: Option<&str>) -> bool {
        let stored_hash = existing.remote_hash().map(|h| h.as_str());

        match (stored_hash, current_remote_hash) {
            (Some(stored), Some(remote)) => {
                if stored != remote {
                    info!(
                        path = %existing.local_path(),
                        "Remote changed since last sync, potential conflict on local upload"
                    );
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Determines whether a conflict should be auto-resolved via policy
    ///
    /// Returns `Some(Resolution)` if the policy engine has a non-Manual
    /// resolution for this file path.
    pub fn should_auto_resolve(
        policy: &PolicyEngine,
        relative_path: &str,
    ) -> Option<odrive_core::domain::conflict::Resolution> {
        let resolution = policy.evaluate(relative_path);
        if matches!(resolution, odrive_core::domain::conflict::Resolution::Manual) {
            None
        } else {
            Some(resolution)
        }
    }
}

fn build_local_version(item: &DriveItem) -> VersionInfo {
    let modified = item.last_modified_local().unwrap_or_else(chrono::Utc::now);
    let mut version = VersionInfo::new(item.size_bytes(), modified);
    if let Some(hash) = item.local_hash() {
        version = version.with_hash(hash.clone());
    }
    version
}

fn build_remote_version(
    size: u64,
    modified: chrono::DateTime<chrono::Utc>,
    etag: Option<&str>,
) -> VersionInfo {
    let mut version = VersionInfo::new(size, modified);
    if let Some(etag) = etag {
        version = version.with_etag(etag);
    }
    version
}
