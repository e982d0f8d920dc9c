//! ODrive Cache - Local state persistence
//!
//! SQLite-based cache for:
//! - File metadata and sync state
//! - Delta tokens
//! - Account information
//! - Audit trail

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteStateRepository;

use thiserror::Error;

/// Errors raised by the SQLite-backed cache adapter.
///
/// Adapter methods expose these through `anyhow::Error` at the
/// `IStateRepository` port boundary; they're kept as a concrete type here
/// so callers within this crate can match on failure kind when needed.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to open or configure the SQLite connection pool.
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed to apply.
    #[error("schema migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be deserialized back into a domain type.
    #[error("serialization error: {0}")]
    SerializationError(String),
}
