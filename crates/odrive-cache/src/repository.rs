//! SQLite implementation of IStateRepository
//!
//! This module provides the concrete SQLite-based implementation of the
//! state repository port defined in odrive-core. It handles all domain
//! type serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type          | SQL Type | Strategy                                   |
//! |-----------------------|----------|--------------------------------------------|
//! | UniqueId, AccountId   | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | SyncPath              | TEXT     | Path string via `.to_string()` / `SyncPath::new()` |
//! | RemotePath            | TEXT     | String via `.as_str()` / `RemotePath::new()` |
//! | RemoteId              | TEXT     | String via `.as_str()` / `RemoteId::new()` |
//! | FileHash, RemoteHash  | TEXT     | String via `.as_str()` / `FileHash::new()` |
//! | DeltaToken            | TEXT     | String via `.as_str()` / `DeltaToken::new()` |
//! | Email                 | TEXT     | String via `.as_str()` / `Email::new()` |
//! | DateTime<Utc>         | TEXT     | ISO 8601 via `to_rfc3339()` / `DateTime::parse_from_rfc3339()` |
//! | SyncStatus            | TEXT     | lowercase snake_case string |
//! | SyncDirection         | TEXT     | lowercase snake_case string |
//! | ItemMetadata          | TEXT     | serde_json serialization    |
//! | ErrorInfo              | TEXT     | serde_json serialization    |
//! | SessionError[]        | TEXT     | serde_json array            |
//! | VersionInfo           | TEXT     | serde_json serialization    |
//! | AuditAction           | TEXT     | serde_json serialization    |
//! | AuditResult           | TEXT     | serde_json serialization    |

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use odrive_core::domain::{
    newtypes::{
        AccountId, ConflictId, DeltaToken, Email, RemoteId, SessionId, SyncPath, UniqueId,
    },
    session::{SessionError, SessionStatus},
    sync_item::{SyncDirection, SyncStatus},
    Account, AccountState, AuditAction, AuditEntry, AuditResult, Conflict, DriveItem, Resolution,
    ResolutionSource, SyncSession, VersionInfo,
};
use odrive_core::ports::{IStateRepository, ItemFilter};

use crate::CacheError;

/// SQLite-based implementation of the state repository port
///
/// Provides persistent storage for all domain entities using SQLite.
/// All operations are performed through a connection pool for concurrency.
pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolves the account a drive item belongs to: the account already
    /// associated with this item's row if one exists, otherwise the oldest
    /// configured account. Drive items don't carry their account inline, so
    /// writes fall back to this lookup the same way the teacher's sync-item
    /// table did.
    async fn resolve_account_id(&self, item_id: &str) -> anyhow::Result<String> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT account_id FROM drive_items WHERE id = ?")
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(aid) = existing {
            return Ok(aid);
        }

        let default_aid: Option<String> =
            sqlx::query_scalar("SELECT id FROM accounts ORDER BY created_at ASC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        default_aid.ok_or_else(|| anyhow::anyhow!("No account found to associate with drive item"))
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn sync_status_to_string(state: &SyncStatus) -> &'static str {
    match state {
        SyncStatus::Synced => "synced",
        SyncStatus::PendingUpload => "pending_upload",
        SyncStatus::PendingDownload => "pending_download",
        SyncStatus::Failed => "failed",
    }
}

fn sync_status_from_string(s: &str) -> Result<SyncStatus, CacheError> {
    match s {
        "synced" => Ok(SyncStatus::Synced),
        "pending_upload" => Ok(SyncStatus::PendingUpload),
        "pending_download" => Ok(SyncStatus::PendingDownload),
        "failed" => Ok(SyncStatus::Failed),
        other => Err(CacheError::SerializationError(format!(
            "Unknown sync status: {}",
            other
        ))),
    }
}

fn sync_direction_to_string(direction: &SyncDirection) -> &'static str {
    match direction {
        SyncDirection::Upload => "upload",
        SyncDirection::Download => "download",
        SyncDirection::None => "none",
    }
}

fn sync_direction_from_string(s: &str) -> Result<SyncDirection, CacheError> {
    match s {
        "upload" => Ok(SyncDirection::Upload),
        "download" => Ok(SyncDirection::Download),
        "none" => Ok(SyncDirection::None),
        other => Err(CacheError::SerializationError(format!(
            "Unknown sync direction: {}",
            other
        ))),
    }
}

/// Serialize an AccountState to a string for storage
fn account_state_to_string(state: &AccountState) -> String {
    match state {
        AccountState::Active => "active".to_string(),
        AccountState::TokenExpired => "token_expired".to_string(),
        AccountState::Suspended => "suspended".to_string(),
        AccountState::Error(msg) => format!("error:{}", msg),
    }
}

/// Deserialize an AccountState from its stored string representation
fn account_state_from_string(s: &str) -> Result<AccountState, CacheError> {
    match s {
        "active" => Ok(AccountState::Active),
        "token_expired" => Ok(AccountState::TokenExpired),
        "suspended" => Ok(AccountState::Suspended),
        s if s.starts_with("error:") => Ok(AccountState::Error(s[6..].to_string())),
        other => Err(CacheError::SerializationError(format!(
            "Unknown account state: {}",
            other
        ))),
    }
}

/// Serialize a SessionStatus to a string for storage
fn session_status_to_string(status: &SessionStatus) -> String {
    match status {
        SessionStatus::Running => "running".to_string(),
        SessionStatus::Completed => "completed".to_string(),
        SessionStatus::Cancelled => "cancelled".to_string(),
        SessionStatus::Failed(msg) => format!("failed:{}", msg),
    }
}

/// Deserialize a SessionStatus from its stored string representation
fn session_status_from_string(s: &str) -> Result<SessionStatus, CacheError> {
    match s {
        "running" => Ok(SessionStatus::Running),
        "completed" => Ok(SessionStatus::Completed),
        "cancelled" => Ok(SessionStatus::Cancelled),
        s if s.starts_with("failed:") => Ok(SessionStatus::Failed(s[7..].to_string())),
        other => Err(CacheError::SerializationError(format!(
            "Unknown session status: {}",
            other
        ))),
    }
}

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Try parsing without timezone (SQLite default format)
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a DriveItem from a database row
///
/// Uses serde JSON deserialization to reconstruct the item since the struct
/// has private fields that can only be set through constructors or
/// deserialization.
fn drive_item_from_row(row: &SqliteRow) -> Result<DriveItem, CacheError> {
    let id_str: String = row.get("id");
    let local_path_str: String = row.get("local_path");
    let remote_id_str: Option<String> = row.get("remote_id");
    let remote_path_str: String = row.get("remote_path");
    let is_directory: bool = row.get("is_directory");
    let is_deleted: bool = row.get("is_deleted");
    let is_selected: Option<bool> = row.get("is_selected");
    let sync_status_str: String = row.get("sync_status");
    let last_sync_direction_str: String = row.get("last_sync_direction");
    let remote_ctag: Option<String> = row.get("remote_ctag");
    let remote_etag: Option<String> = row.get("remote_etag");
    let local_hash_str: Option<String> = row.get("local_hash");
    let remote_hash_str: Option<String> = row.get("remote_hash");
    let size_bytes: i64 = row.get("size_bytes");
    let last_sync_str: Option<String> = row.get("last_sync");
    let last_modified_local_str: Option<String> = row.get("last_modified_local");
    let last_modified_remote_str: Option<String> = row.get("last_modified_remote");
    let metadata_str: String = row.get("metadata");
    let error_info_str: Option<String> = row.get("error_info");

    // Validate the stored enum strings before handing them to serde as bare values.
    sync_status_from_string(&sync_status_str)?;
    sync_direction_from_string(&last_sync_direction_str)?;

    let remote_id_val = match &remote_id_str {
        Some(rid) => serde_json::Value::String(rid.clone()),
        None => serde_json::Value::Null,
    };

    let local_hash_val = match &local_hash_str {
        Some(h) => serde_json::Value::String(h.clone()),
        None => serde_json::Value::Null,
    };

    let remote_hash_val = match &remote_hash_str {
        Some(h) => serde_json::Value::String(h.clone()),
        None => serde_json::Value::Null,
    };

    let last_sync_val = match parse_optional_datetime(last_sync_str)? {
        Some(dt) => serde_json::Value::String(dt.to_rfc3339()),
        None => serde_json::Value::Null,
    };

    let last_modified_local_val = match parse_optional_datetime(last_modified_local_str)? {
        Some(dt) => serde_json::Value::String(dt.to_rfc3339()),
        None => serde_json::Value::Null,
    };

    let last_modified_remote_val = match parse_optional_datetime(last_modified_remote_str)? {
        Some(dt) => serde_json::Value::String(dt.to_rfc3339()),
        None => serde_json::Value::Null,
    };

    let error_info_val: serde_json::Value = match error_info_str {
        Some(ref s) if !s.is_empty() => serde_json::from_str(s).unwrap_or(serde_json::Value::Null),
        _ => serde_json::Value::Null,
    };

    let metadata_val: serde_json::Value = serde_json::from_str(&metadata_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid metadata JSON: {}", e)))?;

    let is_selected_val = match is_selected {
        Some(v) => serde_json::Value::Bool(v),
        None => serde_json::Value::Null,
    };

    let item_json = serde_json::json!({
        "id": id_str,
        "local_path": local_path_str,
        "remote_id": remote_id_val,
        "remote_path": remote_path_str,
        "is_directory": is_directory,
        "is_deleted": is_deleted,
        "is_selected": is_selected_val,
        "sync_status": sync_status_str,
        "last_sync_direction": last_sync_direction_str,
        "remote_ctag": remote_ctag,
        "remote_etag": remote_etag,
        "local_hash": local_hash_val,
        "remote_hash": remote_hash_val,
        "size_bytes": size_bytes as u64,
        "last_sync": last_sync_val,
        "last_modified_local": last_modified_local_val,
        "last_modified_remote": last_modified_remote_val,
        "metadata": metadata_val,
        "error_info": error_info_val,
    });

    let item: DriveItem = serde_json::from_value(item_json).map_err(|e| {
        CacheError::SerializationError(format!("Failed to reconstruct DriveItem from row: {}", e))
    })?;

    Ok(item)
}

/// Reconstruct an Account from a database row
fn account_from_row(row: &SqliteRow) -> Result<Account, CacheError> {
    let id_str: String = row.get("id");
    let email_str: String = row.get("email");
    let display_name: String = row.get("display_name");
    let onedrive_id: String = row.get("onedrive_id");
    let sync_root_str: String = row.get("sync_root");
    let quota_used: i64 = row.get("quota_used");
    let quota_total: i64 = row.get("quota_total");
    let delta_token_str: Option<String> = row.get("delta_token");
    let last_sync_str: Option<String> = row.get("last_sync");
    let state_str: String = row.get("state");
    let created_at_str: String = row.get("created_at");
    let max_parallel_transfers: i64 = row.get("max_parallel_transfers");
    let max_items_per_batch: i64 = row.get("max_items_per_batch");
    let auto_sync_interval_minutes: i64 = row.get("auto_sync_interval_minutes");

    let id = AccountId::from_str(&id_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid AccountId '{}': {}", id_str, e))
    })?;

    let email = Email::new(email_str.clone()).map_err(|e| {
        CacheError::SerializationError(format!("Invalid Email '{}': {}", email_str, e))
    })?;

    let sync_root = SyncPath::new(PathBuf::from(&sync_root_str)).map_err(|e| {
        CacheError::SerializationError(format!("Invalid SyncPath '{}': {}", sync_root_str, e))
    })?;

    let created_at = parse_datetime(&created_at_str)?;
    let state = account_state_from_string(&state_str)?;
    let last_sync = parse_optional_datetime(last_sync_str)?;

    let mut account = Account::with_id(id, email, display_name, onedrive_id, sync_root, created_at);
    account.update_quota(quota_used as u64, quota_total as u64);
    account.set_state(state);
    account.set_max_parallel_transfers(max_parallel_transfers as u8);
    account.set_max_items_per_batch(max_items_per_batch as u8);
    account.set_auto_sync_interval_minutes(auto_sync_interval_minutes as u32);

    if let Some(ts) = last_sync {
        account.record_sync(ts);
    }

    if let Some(token_str) = delta_token_str {
        if !token_str.is_empty() {
            if let Ok(token) = DeltaToken::new(token_str) {
                account.update_delta_token(token);
            }
        }
    }

    Ok(account)
}

/// Reconstruct a SyncSession from a database row
fn session_from_row(row: &SqliteRow) -> Result<SyncSession, CacheError> {
    let id_str: String = row.get("id");
    let account_id_str: String = row.get("account_id");
    let started_at_str: String = row.get("started_at");
    let completed_at_str: Option<String> = row.get("completed_at");
    let status_str: String = row.get("status");
    let items_total: i64 = row.get("items_total");
    let items_processed: i64 = row.get("items_processed");
    let items_succeeded: i64 = row.get("items_succeeded");
    let items_failed: i64 = row.get("items_failed");
    let bytes_uploaded: i64 = row.get("bytes_uploaded");
    let bytes_downloaded: i64 = row.get("bytes_downloaded");
    let delta_token_start_str: Option<String> = row.get("delta_token_start");
    let delta_token_end_str: Option<String> = row.get("delta_token_end");
    let items_checked: i64 = row.get("items_checked");
    let items_synced: i64 = row.get("items_synced");
    let errors_str: String = row.get("errors");

    let id = SessionId::from_str(&id_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid SessionId '{}': {}", id_str, e))
    })?;

    let account_id = AccountId::from_str(&account_id_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid AccountId '{}': {}", account_id_str, e))
    })?;

    let started_at = parse_datetime(&started_at_str)?;
    let _completed_at = parse_optional_datetime(completed_at_str)?;
    let status = session_status_from_string(&status_str)?;

    let mut session = SyncSession::with_id(id, account_id, started_at);
    session.set_items_total(items_total as u64);
    session.update_progress(
        items_processed as u64,
        items_succeeded as u64,
        items_failed as u64,
    );
    session.add_bytes_uploaded(bytes_uploaded as u64);
    session.add_bytes_downloaded(bytes_downloaded as u64);
    session.set_items_checked(items_checked as u64);
    session.set_items_synced(items_synced as u64);

    if let Some(ref token_str) = delta_token_start_str {
        if !token_str.is_empty() {
            if let Ok(token) = DeltaToken::new(token_str.clone()) {
                session.set_delta_token_start(token);
            }
        }
    }

    if let Some(ref token_str) = delta_token_end_str {
        if !token_str.is_empty() {
            if let Ok(token) = DeltaToken::new(token_str.clone()) {
                session.set_delta_token_end(token);
            }
        }
    }

    let errors: Vec<SessionError> = serde_json::from_str(&errors_str).unwrap_or_default();
    for error in errors {
        session.add_error(error);
    }

    match status {
        SessionStatus::Completed => session.complete(),
        SessionStatus::Failed(msg) => session.fail(msg),
        SessionStatus::Cancelled => session.cancel(),
        SessionStatus::Running => {}
    }

    Ok(session)
}

/// Reconstruct an AuditEntry from a database row
///
/// Uses serde JSON deserialization to reconstruct with the correct stored
/// timestamp (rather than the current time that AuditEntry::new() would use).
fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditEntry, CacheError> {
    let id: i64 = row.get("id");
    let timestamp_str: String = row.get("timestamp");
    let session_id_str: Option<String> = row.get("session_id");
    let item_id_str: Option<String> = row.get("item_id");
    let action_str: String = row.get("action");
    let result_str: String = row.get("result");
    let details_str: String = row.get("details");
    let duration_ms: Option<i64> = row.get("duration_ms");

    let timestamp = parse_datetime(&timestamp_str)?;

    let action: AuditAction =
        serde_json::from_str(&format!("\"{}\"", action_str)).map_err(|e| {
            CacheError::SerializationError(format!("Invalid AuditAction '{}': {}", action_str, e))
        })?;

    let result: AuditResult = serde_json::from_str(&result_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid AuditResult '{}': {}", result_str, e))
    })?;

    let details: serde_json::Value = serde_json::from_str(&details_str).unwrap_or_default();

    let session_id_val = match session_id_str {
        Some(ref s) if !s.is_empty() => serde_json::Value::String(s.clone()),
        _ => serde_json::Value::Null,
    };

    let item_id_val = match item_id_str {
        Some(ref s) if !s.is_empty() => serde_json::Value::String(s.clone()),
        _ => serde_json::Value::Null,
    };

    let duration_val = match duration_ms {
        Some(d) => serde_json::Value::Number(serde_json::Number::from(d as u64)),
        None => serde_json::Value::Null,
    };

    let entry_json = serde_json::json!({
        "id": id,
        "timestamp": timestamp.to_rfc3339(),
        "session_id": session_id_val,
        "item_id": item_id_val,
        "action": action,
        "result": result,
        "details": details,
        "duration_ms": duration_val,
    });

    let entry: AuditEntry = serde_json::from_value(entry_json).map_err(|e| {
        CacheError::SerializationError(format!("Failed to reconstruct AuditEntry from row: {}", e))
    })?;

    Ok(entry)
}

/// Reconstruct a Conflict from a database row
fn conflict_from_row(row: &SqliteRow) -> Result<Conflict, CacheError> {
    let id_str: String = row.get("id");
    let item_id_str: String = row.get("item_id");
    let detected_at_str: String = row.get("detected_at");
    let local_version_str: String = row.get("local_version");
    let remote_version_str: String = row.get("remote_version");
    let resolution_str: Option<String> = row.get("resolution");
    let resolved_at_str: Option<String> = row.get("resolved_at");
    let resolved_by_str: Option<String> = row.get("resolved_by");

    let _id = ConflictId::from_str(&id_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid ConflictId '{}': {}", id_str, e))
    })?;

    let _item_id = UniqueId::from_str(&item_id_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid UniqueId '{}': {}", item_id_str, e))
    })?;

    let _detected_at = parse_datetime(&detected_at_str)?;

    let local_version: VersionInfo = serde_json::from_str(&local_version_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid VersionInfo JSON: {}", e)))?;

    let remote_version: VersionInfo = serde_json::from_str(&remote_version_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid VersionInfo JSON: {}", e)))?;

    let resolution_val = match &resolution_str {
        Some(s) if !s.is_empty() => {
            let r: Resolution = serde_json::from_str(&format!("\"{}\"", s)).map_err(|e| {
                CacheError::SerializationError(format!("Invalid Resolution '{}': {}", s, e))
            })?;
            Some(serde_json::to_value(&r).unwrap())
        }
        _ => None,
    };

    let resolved_at = parse_optional_datetime(resolved_at_str)?;

    let resolved_by_val = match &resolved_by_str {
        Some(s) if !s.is_empty() => {
            let rb: ResolutionSource =
                serde_json::from_str(&format!("\"{}\"", s)).map_err(|e| {
                    CacheError::SerializationError(format!(
                        "Invalid ResolutionSource '{}': {}",
                        s, e
                    ))
                })?;
            Some(serde_json::to_value(&rb).unwrap())
        }
        _ => None,
    };

    let conflict_json = serde_json::json!({
        "id": id_str,
        "item_id": item_id_str,
        "detected_at": _detected_at.to_rfc3339(),
        "local_version": local_version,
        "remote_version": remote_version,
        "resolution": resolution_val,
        "resolved_at": resolved_at.map(|dt| dt.to_rfc3339()),
        "resolved_by": resolved_by_val,
    });

    let conflict: Conflict = serde_json::from_value(conflict_json).map_err(|e| {
        CacheError::SerializationError(format!("Failed to reconstruct Conflict from row: {}", e))
    })?;

    Ok(conflict)
}

/// Binds the common drive-item columns onto an INSERT OR REPLACE query
fn bind_drive_item<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    item: &'q DriveItem,
    account_id: &'q str,
) -> Result<sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>, CacheError> {
    let metadata = serde_json::to_string(item.metadata())
        .map_err(|e| CacheError::SerializationError(format!("Invalid metadata: {}", e)))?;
    let error_info = match item.error_info() {
        Some(ei) => Some(
            serde_json::to_string(ei)
                .map_err(|e| CacheError::SerializationError(format!("Invalid error_info: {}", e)))?,
        ),
        None => None,
    };

    Ok(query
        .bind(item.id().to_string())
        .bind(account_id.to_string())
        .bind(item.local_path().to_string())
        .bind(item.remote_id().map(|r| r.as_str().to_string()))
        .bind(item.remote_path().as_str().to_string())
        .bind(item.is_directory())
        .bind(item.is_deleted())
        .bind(item.is_selected())
        .bind(sync_status_to_string(&item.sync_status()).to_string())
        .bind(sync_direction_to_string(&item.last_sync_direction()).to_string())
        .bind(item.remote_ctag().map(|s| s.to_string()))
        .bind(item.remote_etag().map(|s| s.to_string()))
        .bind(item.local_hash().map(|h| h.as_str().to_string()))
        .bind(item.remote_hash().map(|h| h.as_str().to_string()))
        .bind(item.size_bytes() as i64)
        .bind(item.last_sync().map(|dt| dt.to_rfc3339()))
        .bind(item.last_modified_local().map(|dt| dt.to_rfc3339()))
        .bind(item.last_modified_remote().map(|dt| dt.to_rfc3339()))
        .bind(metadata)
        .bind(error_info))
}

const UPSERT_DRIVE_ITEM_SQL: &str = "INSERT OR REPLACE INTO drive_items \
     (id, account_id, local_path, remote_id, remote_path, is_directory, is_deleted, \
      is_selected, sync_status, last_sync_direction, remote_ctag, remote_etag, \
      local_hash, remote_hash, size_bytes, last_sync, last_modified_local, \
      last_modified_remote, metadata, error_info) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

// ============================================================================
// IStateRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateRepository for SqliteStateRepository {
    // --- Drive item operations ---

    async fn save_item(&self, item: &DriveItem) -> anyhow::Result<()> {
        let account_id = self.resolve_account_id(&item.id().to_string()).await?;
        let query = bind_drive_item(sqlx::query(UPSERT_DRIVE_ITEM_SQL), item, &account_id)?;
        query.execute(&self.pool).await?;

        tracing::trace!(item_id = %item.id(), "Saved drive item");
        Ok(())
    }

    async fn save_items_batch(&self, items: &[DriveItem]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            let id_str = item.id().to_string();
            let existing: Option<String> =
                sqlx::query_scalar("SELECT account_id FROM drive_items WHERE id = ?")
                    .bind(&id_str)
                    .fetch_optional(&mut *tx)
                    .await?;

            let account_id = match existing {
                Some(aid) => aid,
                None => {
                    let default_aid: Option<String> = sqlx::query_scalar(
                        "SELECT id FROM accounts ORDER BY created_at ASC LIMIT 1",
                    )
                    .fetch_optional(&mut *tx)
                    .await?;
                    default_aid
                        .ok_or_else(|| anyhow::anyhow!("No account found for batch drive item"))?
                }
            };

            let query = bind_drive_item(sqlx::query(UPSERT_DRIVE_ITEM_SQL), item, &account_id)?;
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::trace!(count = items.len(), "Saved drive item batch");
        Ok(())
    }

    async fn get_item(&self, id: &UniqueId) -> anyhow::Result<Option<DriveItem>> {
        let id_str = id.to_string();

        let row = sqlx::query("SELECT * FROM drive_items WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(drive_item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_item_by_path(&self, path: &SyncPath) -> anyhow::Result<Option<DriveItem>> {
        let path_str = path.to_string();

        let row = sqlx::query("SELECT * FROM drive_items WHERE local_path = ?")
            .bind(&path_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(drive_item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_item_by_remote_id(
        &self,
        remote_id: &RemoteId,
    ) -> anyhow::Result<Option<DriveItem>> {
        let remote_id_str = remote_id.as_str();

        let row = sqlx::query("SELECT * FROM drive_items WHERE remote_id = ?")
            .bind(remote_id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(drive_item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_items_by_account(&self, account_id: &AccountId) -> anyhow::Result<Vec<DriveItem>> {
        let account_id_str = account_id.to_string();

        let rows = sqlx::query("SELECT * FROM drive_items WHERE account_id = ?")
            .bind(&account_id_str)
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(drive_item_from_row(row)?);
        }

        Ok(items)
    }

    async fn query_items(&self, filter: &ItemFilter) -> anyhow::Result<Vec<DriveItem>> {
        let mut sql = String::from("SELECT * FROM drive_items WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(ref account_id) = filter.account_id {
            sql.push_str(" AND account_id = ?");
            binds.push(account_id.to_string());
        }

        if let Some(ref state) = filter.state {
            sql.push_str(" AND sync_status = ?");
            binds.push(sync_status_to_string(state).to_string());
        }

        if let Some(ref path_prefix) = filter.path_prefix {
            sql.push_str(" AND local_path LIKE ?");
            let prefix = format!("{path_prefix}%");
            binds.push(prefix);
        }

        if let Some(ref modified_since) = filter.modified_since {
            sql.push_str(" AND last_modified_local > ?");
            binds.push(modified_since.to_rfc3339());
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(drive_item_from_row(row)?);
        }

        Ok(items)
    }

    async fn delete_item(&self, id: &UniqueId) -> anyhow::Result<()> {
        let id_str = id.to_string();

        sqlx::query("DELETE FROM drive_items WHERE id = ?")
            .bind(&id_str)
            .execute(&self.pool)
            .await?;

        tracing::trace!(item_id = %id_str, "Deleted drive item");
        Ok(())
    }

    async fn count_items_by_state(
        &self,
        account_id: &AccountId,
    ) -> anyhow::Result<HashMap<String, u64>> {
        let account_id_str = account_id.to_string();

        let rows = sqlx::query(
            "SELECT sync_status, COUNT(*) as count FROM drive_items \
             WHERE account_id = ? GROUP BY sync_status",
        )
        .bind(&account_id_str)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in &rows {
            let status_str: String = row.get("sync_status");
            let count: i64 = row.get("count");

            let status = sync_status_from_string(&status_str)?;
            counts.insert(status.name().to_string(), count as u64);
        }

        Ok(counts)
    }

    // --- Account operations ---

    async fn save_account(&self, account: &Account) -> anyhow::Result<()> {
        let id = account.id().to_string();
        let email = account.email().as_str().to_string();
        let display_name = account.display_name().to_string();
        let onedrive_id = account.onedrive_id().to_string();
        let sync_root = account.sync_root().to_string();
        let quota_used = account.quota_used() as i64;
        let quota_total = account.quota_total() as i64;
        let delta_token = account.delta_token().map(|t| t.as_str().to_string());
        let last_sync = account.last_sync().map(|dt| dt.to_rfc3339());
        let state = account_state_to_string(account.state());
        let created_at = account.created_at().to_rfc3339();
        let max_parallel_transfers = account.max_parallel_transfers() as i64;
        let max_items_per_batch = account.max_items_per_batch() as i64;
        let auto_sync_interval_minutes = account.auto_sync_interval_minutes() as i64;

        sqlx::query(
            "INSERT OR REPLACE INTO accounts \
             (id, email, display_name, onedrive_id, sync_root, \
              quota_used, quota_total, delta_token, last_sync, state, created_at, \
              max_parallel_transfers, max_items_per_batch, auto_sync_interval_minutes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&email)
        .bind(&display_name)
        .bind(&onedrive_id)
        .bind(&sync_root)
        .bind(quota_used)
        .bind(quota_total)
        .bind(&delta_token)
        .bind(&last_sync)
        .bind(&state)
        .bind(&created_at)
        .bind(max_parallel_transfers)
        .bind(max_items_per_batch)
        .bind(auto_sync_interval_minutes)
        .execute(&self.pool)
        .await?;

        tracing::trace!(account_id = %id, "Saved account");
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> anyhow::Result<Option<Account>> {
        let id_str = id.to_string();

        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(account_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_default_account(&self) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts ORDER BY created_at ASC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(account_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            accounts.push(account_from_row(row)?);
        }

        Ok(accounts)
    }

    async fn delete_account(&self, id: &AccountId) -> anyhow::Result<()> {
        let id_str = id.to_string();

        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(&id_str)
            .execute(&self.pool)
            .await?;

        tracing::trace!(account_id = %id_str, "Deleted account");
        Ok(())
    }

    // --- Delta token operations ---

    async fn get_delta_token(&self, account_id: &AccountId) -> anyhow::Result<Option<DeltaToken>> {
        let account_id_str = account_id.to_string();

        let token_str: Option<String> =
            sqlx::query_scalar("SELECT delta_token FROM accounts WHERE id = ?")
                .bind(&account_id_str)
                .fetch_optional(&self.pool)
                .await?
                .flatten();

        match token_str {
            Some(ref s) if !s.is_empty() => Ok(Some(DeltaToken::new(s.clone())?)),
            _ => Ok(None),
        }
    }

    async fn set_delta_token(
        &self,
        account_id: &AccountId,
        token: DeltaToken,
    ) -> anyhow::Result<()> {
        let account_id_str = account_id.to_string();

        sqlx::query("UPDATE accounts SET delta_token = ? WHERE id = ?")
            .bind(token.as_str())
            .bind(&account_id_str)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // --- Session operations ---

    async fn add_session(&self, session: &SyncSession) -> anyhow::Result<()> {
        self.save_session_row(session).await
    }

    async fn update_session(&self, session: &SyncSession) -> anyhow::Result<()> {
        self.save_session_row(session).await
    }

    async fn get_session(&self, id: &SessionId) -> anyhow::Result<Option<SyncSession>> {
        let id_str = id.to_string();

        let row = sqlx::query("SELECT * FROM sync_sessions WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(session_from_row(r)?)),
            None => Ok(None),
        }
    }

    // --- Audit / operation log / debug log operations ---

    async fn save_audit(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        insert_log_entry(&self.pool, "audit_log", entry).await
    }

    async fn get_audit_trail(&self, item_id: &UniqueId) -> anyhow::Result<Vec<AuditEntry>> {
        let item_id_str = item_id.to_string();

        let rows = sqlx::query("SELECT * FROM audit_log WHERE item_id = ? ORDER BY timestamp ASC")
            .bind(&item_id_str)
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(audit_entry_from_row(row)?);
        }

        Ok(entries)
    }

    async fn get_audit_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<AuditEntry>> {
        let since_str = since.to_rfc3339();

        let rows = sqlx::query(
            "SELECT * FROM audit_log WHERE timestamp > ? \
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(&since_str)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(audit_entry_from_row(row)?);
        }

        Ok(entries)
    }

    async fn paged_operations(
        &self,
        account_id: &AccountId,
        limit: u32,
        skip: u32,
    ) -> anyhow::Result<Vec<AuditEntry>> {
        let account_id_str = account_id.to_string();

        let rows = sqlx::query(
            "SELECT audit_log.* FROM audit_log \
             JOIN sync_sessions ON audit_log.session_id = sync_sessions.id \
             WHERE sync_sessions.account_id = ? \
             ORDER BY audit_log.timestamp DESC LIMIT ? OFFSET ?",
        )
        .bind(&account_id_str)
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(audit_entry_from_row(row)?);
        }

        Ok(entries)
    }

    async fn append_debug(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        insert_log_entry(&self.pool, "debug_log", entry).await
    }

    async fn delete_debug_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM debug_log WHERE timestamp < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // --- Conflict operations ---

    async fn add_conflict(&self, conflict: &Conflict) -> anyhow::Result<()> {
        self.upsert_conflict_row(conflict).await
    }

    async fn update_conflict(&self, conflict: &Conflict) -> anyhow::Result<()> {
        let id = conflict.id().to_string();
        let resolution = conflict.resolution().map(|r| {
            serde_json::to_string(r)
                .unwrap_or_default()
                .trim_matches('"')
                .to_string()
        });
        let resolved_at = conflict.resolved_at().map(|dt| dt.to_rfc3339());
        let resolved_by = conflict.resolved_by().map(|rb| {
            serde_json::to_string(rb)
                .unwrap_or_default()
                .trim_matches('"')
                .to_string()
        });

        sqlx::query(
            "UPDATE conflicts SET resolution = ?, resolved_at = ?, resolved_by = ? WHERE id = ?",
        )
        .bind(&resolution)
        .bind(&resolved_at)
        .bind(&resolved_by)
        .bind(&id)
        .execute(&self.pool)
        .await?;

        tracing::trace!(conflict_id = %id, "Updated conflict resolution");
        Ok(())
    }

    async fn get_unresolved_conflicts(&self) -> anyhow::Result<Vec<Conflict>> {
        let rows = sqlx::query(
            "SELECT * FROM conflicts WHERE resolution IS NULL \
             ORDER BY detected_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut conflicts = Vec::with_capacity(rows.len());
        for row in &rows {
            conflicts.push(conflict_from_row(row)?);
        }

        Ok(conflicts)
    }

    async fn get_conflict_by_path(&self, path: &SyncPath) -> anyhow::Result<Option<Conflict>> {
        let path_str = path.to_string();

        let row = sqlx::query(
            "SELECT conflicts.* FROM conflicts \
             JOIN drive_items ON conflicts.item_id = drive_items.id \
             WHERE drive_items.local_path = ? AND conflicts.resolution IS NULL",
        )
        .bind(&path_str)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(conflict_from_row(r)?)),
            None => Ok(None),
        }
    }
}

impl SqliteStateRepository {
    async fn save_session_row(&self, session: &SyncSession) -> anyhow::Result<()> {
        let id = session.id().to_string();
        let account_id = session.account_id().to_string();
        let started_at = session.started_at().to_rfc3339();
        let completed_at = session.completed_at().map(|dt| dt.to_rfc3339());
        let status = session_status_to_string(session.status());
        let items_total = session.items_total() as i64;
        let items_processed = session.items_processed() as i64;
        let items_succeeded = session.items_succeeded() as i64;
        let items_failed = session.items_failed() as i64;
        let bytes_uploaded = session.bytes_uploaded() as i64;
        let bytes_downloaded = session.bytes_downloaded() as i64;
        let delta_token_start = session.delta_token_start().map(|t| t.as_str().to_string());
        let delta_token_end = session.delta_token_end().map(|t| t.as_str().to_string());
        let items_checked = session.items_checked() as i64;
        let items_synced = session.items_synced() as i64;
        let errors = serde_json::to_string(session.errors())
            .map_err(|e| anyhow::anyhow!("Failed to serialize session errors: {}", e))?;

        sqlx::query(
            "INSERT OR REPLACE INTO sync_sessions \
             (id, account_id, started_at, completed_at, status, \
              items_total, items_processed, items_succeeded, items_failed, \
              bytes_uploaded, bytes_downloaded, delta_token_start, delta_token_end, \
              items_checked, items_synced, errors) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&account_id)
        .bind(&started_at)
        .bind(&completed_at)
        .bind(&status)
        .bind(items_total)
        .bind(items_processed)
        .bind(items_succeeded)
        .bind(items_failed)
        .bind(bytes_uploaded)
        .bind(bytes_downloaded)
        .bind(&delta_token_start)
        .bind(&delta_token_end)
        .bind(items_checked)
        .bind(items_synced)
        .bind(&errors)
        .execute(&self.pool)
        .await?;

        tracing::trace!(session_id = %id, "Saved sync session");
        Ok(())
    }

    async fn upsert_conflict_row(&self, conflict: &Conflict) -> anyhow::Result<()> {
        let id = conflict.id().to_string();
        let item_id = conflict.item_id().to_string();
        let detected_at = conflict.detected_at().to_rfc3339();
        let local_version = serde_json::to_string(conflict.local_version())
            .map_err(|e| anyhow::anyhow!("Failed to serialize local_version: {}", e))?;
        let remote_version = serde_json::to_string(conflict.remote_version())
            .map_err(|e| anyhow::anyhow!("Failed to serialize remote_version: {}", e))?;

        let resolution = conflict.resolution().map(|r| {
            serde_json::to_string(r)
                .unwrap_or_default()
                .trim_matches('"')
                .to_string()
        });
        let resolved_at = conflict.resolved_at().map(|dt| dt.to_rfc3339());
        let resolved_by = conflict.resolved_by().map(|rb| {
            serde_json::to_string(rb)
                .unwrap_or_default()
                .trim_matches('"')
                .to_string()
        });

        sqlx::query(
            "INSERT OR REPLACE INTO conflicts \
             (id, item_id, detected_at, local_version, remote_version, \
              resolution, resolved_at, resolved_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&item_id)
        .bind(&detected_at)
        .bind(&local_version)
        .bind(&remote_version)
        .bind(&resolution)
        .bind(&resolved_at)
        .bind(&resolved_by)
        .execute(&self.pool)
        .await?;

        tracing::trace!(conflict_id = %id, "Saved conflict");
        Ok(())
    }
}

async fn insert_log_entry(
    pool: &SqlitePool,
    table: &str,
    entry: &AuditEntry,
) -> anyhow::Result<()> {
    let timestamp = entry.timestamp().to_rfc3339();
    let session_id = entry.session_id().map(|s| s.to_string());
    let item_id = entry.item_id().map(|i| i.to_string());
    let action = entry.action().to_string();
    let result = serde_json::to_string(entry.result())
        .map_err(|e| anyhow::anyhow!("Failed to serialize audit result: {}", e))?;
    let details = serde_json::to_string(entry.details())
        .map_err(|e| anyhow::anyhow!("Failed to serialize audit details: {}", e))?;
    let duration_ms = entry.duration_ms().map(|d| d as i64);

    let sql = format!(
        "INSERT INTO {table} \
         (timestamp, session_id, item_id, action, result, details, duration_ms) \
         VALUES (?, ?, ?, ?, ?, ?, ?)"
    );

    sqlx::query(&sql)
        .bind(&timestamp)
        .bind(&session_id)
        .bind(&item_id)
        .bind(&action)
        .bind(&result)
        .bind(&details)
        .bind(duration_ms)
        .execute(pool)
        .await?;

    tracing::trace!(action = %action, table, "Appended log entry");
    Ok(())
}
