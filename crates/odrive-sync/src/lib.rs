//! ODrive Sync - Delta synchronization engine
//!
//! Provides:
//! - Incremental delta sync with Microsoft Graph
//! - Adaptive rate limiting
//! - Conflict detection
//! - Bidirectional synchronization

pub mod engine;
pub mod filesystem;
pub mod scheduler;
pub mod transfer;
pub mod watcher;

pub use engine::{SyncEngine, SyncProgress, SyncResult, SyncStatus};
pub use filesystem::LocalFileSystemAdapter;
pub use scheduler::SyncScheduler;
pub use transfer::{BatchBuffer, EwmaRate, TransferPool, TransferSnapshot};
pub use watcher::{ChangeEvent, FileWatcher};
