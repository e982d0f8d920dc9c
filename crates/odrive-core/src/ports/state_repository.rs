//! State repository port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying
//! synchronization state: drive items, accounts, sessions, audit
//! entries, and conflicts.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, filesystem, etc.) and don't need domain-level classification.
//! - The `ItemFilter` struct provides a composable query mechanism
//!   without exposing storage implementation details.
//! - All write operations take references to domain entities, allowing
//!   the caller to retain ownership.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{
    newtypes::{AccountId, DeltaToken, RemoteId, SessionId, SyncPath, UniqueId},
    Account, AuditEntry, Conflict, DriveItem, SyncSession, SyncStatus,
};

// ============================================================================
// ItemFilter struct
// ============================================================================

/// Filter criteria for querying drive items
///
/// All fields are optional; when `None`, no filtering is applied for that field.
/// Multiple filters are combined with AND logic.
///
/// # Example
///
/// ```
/// use odrive_core::ports::ItemFilter;
/// use odrive_core::domain::SyncStatus;
///
/// // Query all items pending upload for a specific account
/// let filter = ItemFilter {
///     account_id: None, // could be set to filter by account
///     state: Some(SyncStatus::PendingUpload),
///     path_prefix: None,
///     modified_since: None,
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Filter by account ID
    pub account_id: Option<AccountId>,
    /// Filter by sync status
    pub state: Option<SyncStatus>,
    /// Filter by path prefix (items whose local path starts with this prefix)
    pub path_prefix: Option<SyncPath>,
    /// Filter by modification time (items modified after this timestamp)
    pub modified_since: Option<DateTime<Utc>>,
}

impl ItemFilter {
    /// Creates a new empty filter (matches all items)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the account ID filter
    pub fn with_account_id(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Sets the sync status filter
    pub fn with_state(mut self, state: SyncStatus) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the path prefix filter
    pub fn with_path_prefix(mut self, path_prefix: SyncPath) -> Self {
        self.path_prefix = Some(path_prefix);
        self
    }

    /// Sets the modified since filter
    pub fn with_modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.modified_since = Some(since);
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.account_id.is_none()
            && self.state.is_none()
            && self.path_prefix.is_none()
            && self.modified_since.is_none()
    }
}

// ============================================================================
// IStateRepository trait
// ============================================================================

/// Port trait for persistent state storage (the Metadata Store)
///
/// This is the primary interface for all persistence operations in ODrive.
/// It covers CRUD operations for all domain entities: drive items, accounts,
/// sessions, audit entries, and conflicts, plus the ambient debug log.
///
/// ## Implementation Notes
///
/// - Implementations should ensure atomicity for individual operations.
/// - `save_items_batch` must commit as a single transaction.
/// - `set_delta_token` must be atomic with the batch that consumed the
///   corresponding delta page (callers achieve this by calling it within
///   the same session-finalization transaction as the final `save_items_batch`).
/// - `update_conflict` only mutates `resolution`/`resolved_at`/`resolved_by`
///   on an existing row; it never changes `local_version`/`remote_version`.
/// - Audit and conflict operations are included here to avoid proliferating
///   small repository traits; implementations may delegate to sub-repositories.
#[async_trait::async_trait]
pub trait IStateRepository: Send + Sync {
    // --- Drive item operations ---

    /// Saves a drive item (insert or update)
    ///
    /// If an item with the same ID already exists, it is updated.
    async fn save_item(&self, item: &DriveItem) -> anyhow::Result<()>;

    /// Idempotent batch upsert, keyed on item id, in a single transaction
    ///
    /// Intended batch size is `Account::max_items_per_batch`.
    async fn save_items_batch(&self, items: &[DriveItem]) -> anyhow::Result<()>;

    /// Retrieves a drive item by its unique ID
    async fn get_item(&self, id: &UniqueId) -> anyhow::Result<Option<DriveItem>>;

    /// Retrieves a drive item by its local path
    async fn get_item_by_path(&self, path: &SyncPath) -> anyhow::Result<Option<DriveItem>>;

    /// Retrieves a drive item by its remote ID
    async fn get_item_by_remote_id(
        &self,
        remote_id: &RemoteId,
    ) -> anyhow::Result<Option<DriveItem>>;

    /// Retrieves every drive item tracked for an account (no-tracking read)
    async fn get_items_by_account(&self, account_id: &AccountId) -> anyhow::Result<Vec<DriveItem>>;

    /// Queries drive items matching the given filter criteria
    async fn query_items(&self, filter: &ItemFilter) -> anyhow::Result<Vec<DriveItem>>;

    /// Deletes a drive item by its unique ID
    async fn delete_item(&self, id: &UniqueId) -> anyhow::Result<()>;

    /// Counts drive items grouped by sync status for a given account
    ///
    /// Returns a map where keys are status names (e.g., "synced",
    /// "pending_upload") and values are the number of items in each status.
    async fn count_items_by_state(
        &self,
        account_id: &AccountId,
    ) -> anyhow::Result<HashMap<String, u64>>;

    // --- Account operations ---

    /// Saves an account (insert or update)
    async fn save_account(&self, account: &Account) -> anyhow::Result<()>;

    /// Retrieves an account by its ID
    async fn get_account(&self, id: &AccountId) -> anyhow::Result<Option<Account>>;

    /// Retrieves the default (primary) account
    ///
    /// Returns `None` if no accounts are configured.
    async fn get_default_account(&self) -> anyhow::Result<Option<Account>>;

    /// Lists every configured account
    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>>;

    /// Deletes an account and cascades to its drive items, conflicts, and
    /// sessions
    async fn delete_account(&self, id: &AccountId) -> anyhow::Result<()>;

    // --- Delta token operations ---

    /// Returns the stored delta cursor for an account, if one exists
    async fn get_delta_token(&self, account_id: &AccountId) -> anyhow::Result<Option<DeltaToken>>;

    /// Persists the delta cursor for an account
    ///
    /// Callers must invoke this only as part of the transaction that commits
    /// the batch of items consumed from the corresponding delta page.
    async fn set_delta_token(&self, account_id: &AccountId, token: DeltaToken) -> anyhow::Result<()>;

    // --- Session operations ---

    /// Records a new sync session
    async fn add_session(&self, session: &SyncSession) -> anyhow::Result<()>;

    /// Updates an existing sync session (progress, status, totals)
    async fn update_session(&self, session: &SyncSession) -> anyhow::Result<()>;

    /// Retrieves a sync session by its ID
    async fn get_session(&self, id: &SessionId) -> anyhow::Result<Option<SyncSession>>;

    // --- Audit / operation log / debug log operations ---

    /// Saves an audit entry (ambient, non-transactional, best-effort)
    async fn save_audit(&self, entry: &AuditEntry) -> anyhow::Result<()>;

    /// Retrieves all audit entries for a specific drive item
    ///
    /// Returns entries ordered by timestamp (oldest first).
    async fn get_audit_trail(&self, item_id: &UniqueId) -> anyhow::Result<Vec<AuditEntry>>;

    /// Retrieves audit entries since a given timestamp, up to a limit
    ///
    /// Returns entries ordered by timestamp (newest first).
    async fn get_audit_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<AuditEntry>>;

    /// Retrieves a page of the operation log for an account, ordered by
    /// timestamp descending
    async fn paged_operations(
        &self,
        account_id: &AccountId,
        limit: u32,
        skip: u32,
    ) -> anyhow::Result<Vec<AuditEntry>>;

    /// Appends an entry to the ambient debug log
    async fn append_debug(&self, entry: &AuditEntry) -> anyhow::Result<()>;

    /// Deletes debug log entries older than the given timestamp
    async fn delete_debug_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<()>;

    // --- Conflict operations ---

    /// Inserts a new conflict record
    ///
    /// Per first-detection-wins semantics, callers should check
    /// `get_conflict_by_path` first and skip the insert if an unresolved
    /// row for the same path already exists.
    async fn add_conflict(&self, conflict: &Conflict) -> anyhow::Result<()>;

    /// Updates an existing conflict record
    ///
    /// Only `resolution`/`resolved_at`/`resolved_by` are mutated; the
    /// recorded local/remote version snapshots never change.
    async fn update_conflict(&self, conflict: &Conflict) -> anyhow::Result<()>;

    /// Retrieves all unresolved conflicts
    ///
    /// Returns conflicts ordered by detection time (newest first).
    async fn get_unresolved_conflicts(&self) -> anyhow::Result<Vec<Conflict>>;

    /// Retrieves the unresolved conflict for a drive item's local path, if any
    async fn get_conflict_by_path(&self, path: &SyncPath) -> anyhow::Result<Option<Conflict>>;
}
