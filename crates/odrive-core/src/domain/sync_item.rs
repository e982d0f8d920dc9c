//! DriveItem domain entity
//!
//! This module defines the `DriveItem` entity, the metadata record ODrive
//! keeps for every file or folder known to an account: one row per item,
//! keyed by its local path, tracking enough state to decide what a sync
//! pass should do with it next.
//!
//! Unlike a Files-on-Demand client, ODrive always keeps file content on
//! disk when `sync_status` is `Synced` - there is no placeholder/hydration
//! state. An item's outstanding work is described by a flat pair:
//! `sync_status` (is it in sync, and if not, in which direction does it
//! need to move) and `last_sync_direction` (which way the last completed
//! transfer went, for status reporting).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{FileHash, RemoteHash, RemoteId, RemotePath, SyncPath, UniqueId};

// ============================================================================
// SyncStatus / SyncDirection
// ============================================================================

/// Synchronization status of a drive item
///
/// Replaces a hydration state machine with the minimum needed to decide
/// what a sync pass does next: nothing, upload, download, or give up and
/// surface the item as needing attention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local and remote content agree as of the last successful sync
    #[default]
    Synced,
    /// Local content changed and has not yet been uploaded
    PendingUpload,
    /// Remote content changed and has not yet been downloaded
    PendingDownload,
    /// The last transfer attempt failed; see `error_info`
    Failed,
}

impl SyncStatus {
    /// Returns true if this item requires no transfer
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncStatus::Synced)
    }

    /// Returns true if a transfer is pending in either direction
    pub fn has_pending_changes(&self) -> bool {
        matches!(self, SyncStatus::PendingUpload | SyncStatus::PendingDownload)
    }

    /// Returns true if the item needs user or operator attention
    pub fn needs_attention(&self) -> bool {
        matches!(self, SyncStatus::Failed)
    }

    /// Returns the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "Synced",
            SyncStatus::PendingUpload => "PendingUpload",
            SyncStatus::PendingDownload => "PendingDownload",
            SyncStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::PendingUpload => write!(f, "pending_upload"),
            SyncStatus::PendingDownload => write!(f, "pending_download"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Direction of the most recently completed (or currently pending) transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local content was (or will be) pushed to the remote
    Upload,
    /// Remote content was (or will be) pulled to the local disk
    Download,
    /// No transfer has happened yet for this item
    #[default]
    None,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Upload => write!(f, "upload"),
            SyncDirection::Download => write!(f, "download"),
            SyncDirection::None => write!(f, "none"),
        }
    }
}

// ============================================================================
// Permissions / ItemMetadata
// ============================================================================

/// Unix-style file permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Read permission
    pub read: bool,
    /// Write permission
    pub write: bool,
    /// Execute permission (for directories, this means list)
    pub execute: bool,
}

impl Permissions {
    /// Creates permissions with all flags set to true
    pub fn all() -> Self {
        Self {
            read: true,
            write: true,
            execute: true,
        }
    }

    /// Creates read-only permissions
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            execute: false,
        }
    }

    /// Creates permissions from a Unix mode (e.g., 0o644)
    pub fn from_mode(mode: u32) -> Self {
        Self {
            read: (mode & 0o400) != 0,
            write: (mode & 0o200) != 0,
            execute: (mode & 0o100) != 0,
        }
    }

    /// Converts to a Unix mode for the owner bits
    pub fn to_mode(&self) -> u32 {
        let mut mode = 0u32;
        if self.read {
            mode |= 0o400;
        }
        if self.write {
            mode |= 0o200;
        }
        if self.execute {
            mode |= 0o100;
        }
        mode
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::all()
    }
}

/// Metadata about a drive item that isn't itself sync state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// MIME type of the file (None for directories)
    mime_type: Option<String>,
    /// When the item was originally created
    created_at: DateTime<Utc>,
    /// File permissions
    permissions: Permissions,
}

impl ItemMetadata {
    /// Creates metadata for a file
    pub fn new_file(mime_type: Option<String>) -> Self {
        Self {
            mime_type,
            created_at: Utc::now(),
            permissions: Permissions::all(),
        }
    }

    /// Creates metadata for a directory
    pub fn new_directory() -> Self {
        Self {
            mime_type: None,
            created_at: Utc::now(),
            permissions: Permissions::all(),
        }
    }

    /// Creates metadata with all fields specified
    pub fn new(mime_type: Option<String>, created_at: DateTime<Utc>, permissions: Permissions) -> Self {
        Self {
            mime_type,
            created_at,
            permissions,
        }
    }

    /// Returns the MIME type
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Returns when the item was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the permissions
    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Sets the permissions
    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.permissions = permissions;
    }

    /// Sets the MIME type
    pub fn set_mime_type(&mut self, mime_type: Option<String>) {
        self.mime_type = mime_type;
    }
}

// ============================================================================
// ErrorInfo
// ============================================================================

/// Information about an error that occurred during synchronization
///
/// Tracks error details and retry information for failed operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code for categorization (e.g., "NETWORK_ERROR", "AUTH_EXPIRED")
    code: String,
    /// Human-readable error message
    message: String,
    /// Number of retry attempts made
    retry_count: u32,
    /// When the last attempt was made
    last_attempt: DateTime<Utc>,
    /// When the next retry should be attempted (None if no retry scheduled)
    next_retry: Option<DateTime<Utc>>,
}

impl ErrorInfo {
    /// Creates a new ErrorInfo
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retry_count: 0,
            last_attempt: Utc::now(),
            next_retry: None,
        }
    }

    /// Creates an ErrorInfo with a scheduled retry
    pub fn with_retry(code: impl Into<String>, message: impl Into<String>, retry_delay: Duration) -> Self {
        let now = Utc::now();
        Self {
            code: code.into(),
            message: message.into(),
            retry_count: 0,
            last_attempt: now,
            next_retry: Some(now + retry_delay),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the retry count
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns when the last attempt was made
    pub fn last_attempt(&self) -> DateTime<Utc> {
        self.last_attempt
    }

    /// Returns when the next retry is scheduled
    pub fn next_retry(&self) -> Option<DateTime<Utc>> {
        self.next_retry
    }

    /// Returns true if a retry is scheduled
    pub fn has_retry_scheduled(&self) -> bool {
        self.next_retry.is_some()
    }

    /// Returns true if it's time to retry
    pub fn should_retry_now(&self) -> bool {
        match self.next_retry {
            Some(next) => Utc::now() >= next,
            None => false,
        }
    }

    /// Increments the retry count and updates the last attempt time
    pub fn record_retry(&mut self) {
        self.retry_count += 1;
        self.last_attempt = Utc::now();
    }

    /// Schedules the next retry with full-jitter exponential backoff
    ///
    /// Uses the formula: random(0, base_delay * 2^retry_count), capped at max_delay
    pub fn schedule_retry_exponential(&mut self, base_delay: Duration, max_delay: Duration) {
        let multiplier = 2i64.saturating_pow(self.retry_count);
        let delay = base_delay * multiplier as i32;
        let capped_delay = if delay > max_delay { max_delay } else { delay };
        self.next_retry = Some(Utc::now() + capped_delay);
    }

    /// Cancels any scheduled retry
    pub fn cancel_retry(&mut self) {
        self.next_retry = None;
    }

    /// Creates a common network error
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::with_retry("NETWORK_ERROR", message, Duration::milliseconds(100))
    }

    /// Creates a common authentication error
    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::new("AUTH_ERROR", message)
    }

    /// Creates a common rate limit error
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::with_retry("RATE_LIMITED", "Rate limit exceeded", retry_after)
    }

    /// Creates a common conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if self.retry_count > 0 {
            write!(f, " (retries: {})", self.retry_count)?;
        }
        Ok(())
    }
}

// ============================================================================
// DriveItem
// ============================================================================

/// Represents a file or folder known to ODrive for a given account
///
/// `DriveItem` is the core domain entity: one row per item, keyed by
/// `(account, local_path)`, carrying enough state to decide whether the
/// next sync pass needs to upload it, download it, leave it alone, or
/// has previously failed to converge it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveItem {
    /// Unique identifier for this item within ODrive
    id: UniqueId,
    /// Local file system path
    local_path: SyncPath,
    /// OneDrive item ID (None for new local items not yet uploaded)
    remote_id: Option<RemoteId>,
    /// Remote OneDrive path
    remote_path: RemotePath,
    /// Whether this item is a directory
    is_directory: bool,
    /// Soft-deleted: the item no longer exists on one side
    is_deleted: bool,
    /// Whether this item's folder subtree is selected for sync.
    /// `None` means "inherit from the nearest selected ancestor".
    is_selected: Option<bool>,
    /// Current synchronization status
    sync_status: SyncStatus,
    /// Direction of the most recently completed (or pending) transfer
    last_sync_direction: SyncDirection,
    /// ctag reported by the remote, used to detect metadata-only changes
    remote_ctag: Option<String>,
    /// etag reported by the remote, used for optimistic concurrency
    remote_etag: Option<String>,
    /// Local content hash (SHA-256 hex, computed from file bytes on disk)
    local_hash: Option<FileHash>,
    /// Remote content hash as reported by the provider (opaque)
    remote_hash: Option<RemoteHash>,
    /// File size in bytes (0 for directories)
    size_bytes: u64,
    /// When this item was last successfully synced
    last_sync: Option<DateTime<Utc>>,
    /// Last modified time on the local filesystem
    last_modified_local: Option<DateTime<Utc>>,
    /// Last modified time on OneDrive
    last_modified_remote: Option<DateTime<Utc>>,
    /// Item metadata
    metadata: ItemMetadata,
    /// Error information if sync_status is Failed
    error_info: Option<ErrorInfo>,
}

impl DriveItem {
    /// Creates a new DriveItem with validation
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` if the paths are inconsistent.
    pub fn new(local_path: SyncPath, remote_path: RemotePath, is_directory: bool) -> Result<Self, DomainError> {
        let metadata = if is_directory {
            ItemMetadata::new_directory()
        } else {
            ItemMetadata::new_file(None)
        };

        Ok(Self {
            id: UniqueId::new(),
            local_path,
            remote_id: None,
            remote_path,
            is_directory,
            is_deleted: false,
            is_selected: None,
            sync_status: SyncStatus::default(),
            last_sync_direction: SyncDirection::default(),
            remote_ctag: None,
            remote_etag: None,
            local_hash: None,
            remote_hash: None,
            size_bytes: 0,
            last_sync: None,
            last_modified_local: None,
            last_modified_remote: None,
            metadata,
            error_info: None,
        })
    }

    /// Creates a new DriveItem for a file with size and MIME type
    pub fn new_file(
        local_path: SyncPath,
        remote_path: RemotePath,
        size_bytes: u64,
        mime_type: Option<String>,
    ) -> Result<Self, DomainError> {
        let mut item = Self::new(local_path, remote_path, false)?;
        item.size_bytes = size_bytes;
        item.metadata.set_mime_type(mime_type);
        Ok(item)
    }

    /// Creates a new DriveItem for a directory
    pub fn new_directory(local_path: SyncPath, remote_path: RemotePath) -> Result<Self, DomainError> {
        Self::new(local_path, remote_path, true)
    }

    /// Creates a DriveItem from a remote snapshot (for initial or delta sync from cloud)
    pub fn from_remote(
        local_path: SyncPath,
        remote_path: RemotePath,
        remote_id: RemoteId,
        is_directory: bool,
        size_bytes: u64,
        remote_hash: Option<RemoteHash>,
        last_modified_remote: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let mut item = Self::new(local_path, remote_path, is_directory)?;
        item.remote_id = Some(remote_id);
        item.size_bytes = size_bytes;
        item.remote_hash = remote_hash;
        item.last_modified_remote = Some(last_modified_remote);
        Ok(item)
    }

    // --- Getters ---

    /// Returns the item's unique identifier
    pub fn id(&self) -> &UniqueId {
        &self.id
    }

    /// Returns the local file path
    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    /// Returns the remote ID if set
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    /// Returns the remote path
    pub fn remote_path(&self) -> &RemotePath {
        &self.remote_path
    }

    /// Returns the current sync status
    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Returns the direction of the last completed or pending transfer
    pub fn last_sync_direction(&self) -> SyncDirection {
        self.last_sync_direction
    }

    /// Returns true if this item is a directory
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Returns true if this item has been deleted on either side
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Returns the selection override for this item, if any
    pub fn is_selected(&self) -> Option<bool> {
        self.is_selected
    }

    /// Returns the remote ctag
    pub fn remote_ctag(&self) -> Option<&str> {
        self.remote_ctag.as_deref()
    }

    /// Returns the remote etag
    pub fn remote_etag(&self) -> Option<&str> {
        self.remote_etag.as_deref()
    }

    /// Returns the remote content hash
    pub fn remote_hash(&self) -> Option<&RemoteHash> {
        self.remote_hash.as_ref()
    }

    /// Returns the local content hash
    pub fn local_hash(&self) -> Option<&FileHash> {
        self.local_hash.as_ref()
    }

    /// Returns the file size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Returns when the item was last synced
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Returns the local last modified time
    pub fn last_modified_local(&self) -> Option<DateTime<Utc>> {
        self.last_modified_local
    }

    /// Returns the remote last modified time
    pub fn last_modified_remote(&self) -> Option<DateTime<Utc>> {
        self.last_modified_remote
    }

    /// Returns the metadata
    pub fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    /// Returns mutable metadata
    pub fn metadata_mut(&mut self) -> &mut ItemMetadata {
        &mut self.metadata
    }

    /// Returns the error info if any
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        self.error_info.as_ref()
    }

    // --- Setters ---

    /// Sets the remote ID
    pub fn set_remote_id(&mut self, remote_id: RemoteId) {
        self.remote_id = Some(remote_id);
    }

    /// Sets the remote content hash
    pub fn set_remote_hash(&mut self, hash: RemoteHash) {
        self.remote_hash = Some(hash);
    }

    /// Sets the local content hash
    pub fn set_local_hash(&mut self, hash: FileHash) {
        self.local_hash = Some(hash);
    }

    /// Sets the remote ctag
    pub fn set_remote_ctag(&mut self, ctag: impl Into<String>) {
        self.remote_ctag = Some(ctag.into());
    }

    /// Sets the remote etag
    pub fn set_remote_etag(&mut self, etag: impl Into<String>) {
        self.remote_etag = Some(etag.into());
    }

    /// Sets the file size
    pub fn set_size_bytes(&mut self, size: u64) {
        self.size_bytes = size;
    }

    /// Sets the local last modified time
    pub fn set_last_modified_local(&mut self, time: DateTime<Utc>) {
        self.last_modified_local = Some(time);
    }

    /// Sets the remote last modified time
    pub fn set_last_modified_remote(&mut self, time: DateTime<Utc>) {
        self.last_modified_remote = Some(time);
    }

    /// Sets the selection override. `None` means "inherit from parent".
    pub fn set_selected(&mut self, selected: Option<bool>) {
        self.is_selected = selected;
    }

    /// Updates the local path
    pub fn update_local_path(&mut self, path: SyncPath) {
        self.local_path = path;
    }

    /// Updates the remote path
    pub fn update_remote_path(&mut self, path: RemotePath) {
        self.remote_path = path;
    }

    /// Returns true if the local and remote hashes represent the same content.
    ///
    /// Hashes are computed with different algorithms (local: SHA-256,
    /// remote: provider-defined), so they can never be compared directly;
    /// this always returns false until content verification moves to
    /// comparing sizes and modification times instead. Retained so
    /// callers have a single place to ask the question.
    pub fn hashes_known(&self) -> bool {
        self.local_hash.is_some() && self.remote_hash.is_some()
    }

    // --- Status transitions ---

    /// Marks the item as having a pending local change that needs upload
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the item is deleted.
    pub fn mark_pending_upload(&mut self) -> Result<(), DomainError> {
        self.guard_not_deleted("PendingUpload")?;
        self.sync_status = SyncStatus::PendingUpload;
        self.error_info = None;
        Ok(())
    }

    /// Marks the item as having a pending remote change that needs download
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the item is deleted.
    pub fn mark_pending_download(&mut self) -> Result<(), DomainError> {
        self.guard_not_deleted("PendingDownload")?;
        self.sync_status = SyncStatus::PendingDownload;
        self.error_info = None;
        Ok(())
    }

    /// Marks the item as synced, recording the direction of the transfer
    /// that just completed (or `SyncDirection::None` if nothing moved).
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if a non-directory item has no
    /// local hash recorded - a synced file must have known content.
    pub fn mark_synced(&mut self, direction: SyncDirection) -> Result<(), DomainError> {
        if !self.is_directory && self.local_hash.is_none() && !self.is_deleted {
            return Err(DomainError::InvalidState {
                from: self.sync_status.name().to_string(),
                to: "Synced".to_string(),
            });
        }
        self.sync_status = SyncStatus::Synced;
        self.last_sync_direction = direction;
        self.last_sync = Some(Utc::now());
        self.error_info = None;
        Ok(())
    }

    /// Marks the item as failed, recording the error that caused it
    pub fn mark_failed(&mut self, error: ErrorInfo) {
        self.sync_status = SyncStatus::Failed;
        self.error_info = Some(error);
    }

    /// Marks the item as deleted. Deletion completes immediately - there is
    /// no pending-delete status, so any outstanding transfer is cleared.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.sync_status = SyncStatus::Synced;
        self.last_sync_direction = SyncDirection::None;
        self.error_info = None;
    }

    fn guard_not_deleted(&self, target: &str) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::InvalidState {
                from: "Deleted".to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }
}
