//! Account domain entity
//!
//! This module defines the Account entity which represents a user's
//! OneDrive account and its synchronization state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    errors::DomainError,
    newtypes::{AccountId, DeltaToken, Email, SyncPath},
};

/// T031: Represents the current state of an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    /// Account is active and can sync
    #[default]
    Active,
    /// OAuth token has expired, needs refresh
    TokenExpired,
    /// Account has been suspended (e.g., by Microsoft)
    Suspended,
    /// Account is in an error state with a description
    Error(String),
}

impl AccountState {
    /// Returns true if the account can perform sync operations
    pub fn can_sync(&self) -> bool {
        matches!(self, AccountState::Active)
    }

    /// Returns true if the account needs token refresh
    pub fn needs_token_refresh(&self) -> bool {
        matches!(self, AccountState::TokenExpired)
    }
}

/// Default number of concurrent transfers per direction (§3 Account)
pub const DEFAULT_MAX_PARALLEL_TRANSFERS: u8 = 5;
/// Default number of items flushed to the store per batch write
pub const DEFAULT_MAX_ITEMS_PER_BATCH: u8 = 50;

/// Clamps `max_parallel_transfers` to the documented `1..=10` range
fn clamp_max_parallel_transfers(value: u8) -> u8 {
    value.clamp(1, 10)
}

/// Clamps `max_items_per_batch` to the documented `1..=100` range
fn clamp_max_items_per_batch(value: u8) -> u8 {
    value.clamp(1, 100)
}

/// Clamps `auto_sync_interval_minutes`: `0` disables auto-sync and passes
/// through unchanged; any other value is clamped to `[60, 1440]`
fn clamp_auto_sync_interval(value: u32) -> u32 {
    if value == 0 {
        0
    } else {
        value.clamp(60, 1440)
    }
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountState::Active => write!(f, "active"),
            AccountState::TokenExpired => write!(f, "token_expired"),
            AccountState::Suspended => write!(f, "suspended"),
            AccountState::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// T032: Represents a user's OneDrive account
///
/// An Account entity contains all information needed to identify and
/// manage a user's OneDrive connection, including authentication state,
/// quota information, and sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account
    id: AccountId,
    /// User's email address (Microsoft account)
    email: Email,
    /// Display name from Microsoft profile
    display_name: String,
    /// OneDrive drive ID from Microsoft Graph API
    onedrive_id: String,
    /// Local path where files are synchronized
    sync_root: SyncPath,
    /// Bytes used in OneDrive storage
    quota_used: u64,
    /// Total bytes available in OneDrive storage
    quota_total: u64,
    /// Delta token for incremental sync (None for initial sync)
    delta_token: Option<DeltaToken>,
    /// Timestamp of last successful sync (None if never synced)
    last_sync: Option<DateTime<Utc>>,
    /// Current account state
    state: AccountState,
    /// When this account was created
    created_at: DateTime<Utc>,
    /// Bound on concurrent uploads (and, independently, downloads); clamped to `1..=10`
    max_parallel_transfers: u8,
    /// Number of completed items flushed per `save_items_batch` call; clamped to `1..=100`
    max_items_per_batch: u8,
    /// Auto-sync timer period in minutes; `0` disables, otherwise clamped to `[60, 1440]`
    auto_sync_interval_minutes: u32,
}

impl Account {
    /// T033: Creates a new Account with the provided details
    ///
    /// # Arguments
    /// * `email` - User's Microsoft account email
    /// * `display_name` - User's display name
    /// * `onedrive_id` - OneDrive drive ID from Graph API
    /// * `sync_root` - Local path for file synchronization
    ///
    /// # Returns
    /// A new Account in Active state with zero quota usage
    pub fn new(
        email: Email,
        display_name: impl Into<String>,
        onedrive_id: impl Into<String>,
        sync_root: SyncPath,
    ) -> Self {
        Self {
            id: AccountId::new(),
            email,
            display_name: display_name.into(),
            onedrive_id: onedrive_id.into(),
            sync_root,
            quota_used: 0,
            quota_total: 0,
            delta_token: None,
            last_sync: None,
            state: AccountState::Active,
            created_at: Utc::now(),
            max_parallel_transfers: DEFAULT_MAX_PARALLEL_TRANSFERS,
            max_items_per_batch: DEFAULT_MAX_ITEMS_PER_BATCH,
            auto_sync_interval_minutes: 0,
        }
    }

    /// Creates an Account with a specific ID (for reconstitution from storage)
    pub fn with_id(
        id: AccountId,
        email: Email,
        display_name: impl Into<String>,
        onedrive_id: impl Into<String>,
        sync_root: SyncPath,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            display_name: display_name.into(),
            onedrive_id: onedrive_id.into(),
            sync_root,
            quota_used: 0,
            quota_total: 0,
            delta_token: None,
            last_sync: None,
            state: AccountState::Active,
            created_at,
            max_parallel_transfers: DEFAULT_MAX_PARALLEL_TRANSFERS,
            max_items_per_batch: DEFAULT_MAX_ITEMS_PER_BATCH,
            auto_sync_interval_minutes: 0,
        }
    }

    // --- Getters ---

    /// Returns the account's unique identifier
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Returns the account's email address
    pub fn email(&self) -> &Email {
        &self.email
    }

    /// Returns the account's display name
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the OneDrive drive ID
    pub fn onedrive_id(&self) -> &str {
        &self.onedrive_id
    }

    /// Returns the sync root path
    pub fn sync_root(&self) -> &SyncPath {
        &self.sync_root
    }

    /// Returns bytes used in storage
    pub fn quota_used(&self) -> u64 {
        self.quota_used
    }

    /// Returns total bytes available
    pub fn quota_total(&self) -> u64 {
        self.quota_total
    }

    /// Returns the current delta token if any
    pub fn delta_token(&self) -> Option<&DeltaToken> {
        self.delta_token.as_ref()
    }

    /// Returns the last sync timestamp if any
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Returns the current account state
    pub fn state(&self) -> &AccountState {
        &self.state
    }

    /// Returns when the account was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the configured bound on concurrent transfers per direction
    pub fn max_parallel_transfers(&self) -> u8 {
        self.max_parallel_transfers
    }

    /// Returns the configured batch size for `save_items_batch` flushes
    pub fn max_items_per_batch(&self) -> u8 {
        self.max_items_per_batch
    }

    /// Returns the auto-sync timer period in minutes (`0` = disabled)
    pub fn auto_sync_interval_minutes(&self) -> u32 {
        self.auto_sync_interval_minutes
    }

    /// Returns whether the periodic auto-sync timer is enabled
    pub fn auto_sync_enabled(&self) -> bool {
        self.auto_sync_interval_minutes > 0
    }

    // --- T033: Methods ---

    /// T033: Calculates the percentage of quota used
    ///
    /// # Returns
    /// - Percentage as f64 between 0.0 and 100.0
    /// - Returns 0.0 if quota_total is 0 to avoid division by zero
    pub fn quota_percent(&self) -> f64 {
        if self.quota_total == 0 {
            return 0.0;
        }
        (self.quota_used as f64 / self.quota_total as f64) * 100.0
    }

    // --- Setters / State Mutations ---

    /// Updates the quota information
    pub fn update_quota(&mut self, used: u64, total: u64) {
        self.quota_used = used;
        self.quota_total = total;
    }

    /// Updates the delta token after a successful sync
    pub fn update_delta_token(&mut self, token: DeltaToken) {
        self.delta_token = Some(token);
    }

    /// Clears the delta token (forces full resync)
    pub fn clear_delta_token(&mut self) {
        self.delta_token = None;
    }

    /// Records a successful sync
    pub fn record_sync(&mut self, timestamp: DateTime<Utc>) {
        self.last_sync = Some(timestamp);
    }

    /// Updates the account state
    pub fn set_state(&mut self, state: AccountState) {
        self.state = state;
    }

    /// Marks the account as active
    pub fn activate(&mut self) {
        self.state = AccountState::Active;
    }

    /// Marks the token as expired
    pub fn mark_token_expired(&mut self) {
        self.state = AccountState::TokenExpired;
    }

    /// Marks the account as suspended
    pub fn suspend(&mut self) {
        self.state = AccountState::Suspended;
    }

    /// Marks the account with an error
    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.state = AccountState::Error(reason.into());
    }

    /// Updates the sync root path
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the new path is not absolute
    pub fn update_sync_root(&mut self, path: SyncPath) -> Result<(), DomainError> {
        self.sync_root = path;
        Ok(())
    }

    /// Returns true if the account can perform sync operations
    pub fn can_sync(&self) -> bool {
        self.state.can_sync()
    }

    /// Sets the concurrent-transfers bound, clamped to `1..=10`
    pub fn set_max_parallel_transfers(&mut self, value: u8) {
        self.max_parallel_transfers = clamp_max_parallel_transfers(value);
    }

    /// Sets the batch-write size, clamped to `1..=100`
    pub fn set_max_items_per_batch(&mut self, value: u8) {
        self.max_items_per_batch = clamp_max_items_per_batch(value);
    }

    /// Sets the auto-sync interval in minutes (`0` disables, otherwise clamped to `[60, 1440]`)
    pub fn set_auto_sync_interval_minutes(&mut self, value: u32) {
        self.auto_sync_interval_minutes = clamp_auto_sync_interval(value);
    }
}
