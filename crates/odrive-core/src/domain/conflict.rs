//! Conflict domain entities
//!
//! This module defines types for detecting, tracking, and resolving
//! synchronization conflicts between local and remote file versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ConflictId, FileHash, UniqueId};

/// Information about a specific version of a file
///
/// VersionInfo captures the essential metadata needed to compare
/// two versions of the same file and determine if they conflict.
/// A conflict only requires size and modification time; the hash is
/// attached when one is already known (SHA-256 for the local side,
/// the provider's opaque hash for the remote side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// File size in bytes
    size_bytes: u64,
    /// When this version was last modified
    modified_at: DateTime<Utc>,
    /// File content hash, if known
    hash: Option<FileHash>,
    /// ETag from OneDrive (if available)
    etag: Option<String>,
}

impl VersionInfo {
    /// Creates a new VersionInfo from size and modification time alone
    pub fn new(size_bytes: u64, modified_at: DateTime<Utc>) -> Self {
        Self {
            size_bytes,
            modified_at,
            hash: None,
            etag: None,
        }
    }

    /// Returns the file size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Returns when this version was modified
    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Returns the file hash, if known
    pub fn hash(&self) -> Option<&FileHash> {
        self.hash.as_ref()
    }

    /// Attaches a content hash to this version
    pub fn with_hash(mut self, hash: FileHash) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Returns the ETag if available
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Sets the ETag for this version
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// How a conflict should be or was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the local version, overwriting remote
    KeepLocal,
    /// Keep the remote version, overwriting local
    KeepRemote,
    /// Keep both versions (rename one with conflict suffix)
    KeepBoth,
    /// Requires manual user intervention
    Manual,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resolution::KeepLocal => "keep_local",
            Resolution::KeepRemote => "keep_remote",
            Resolution::KeepBoth => "keep_both",
            Resolution::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

/// Who or what initiated the conflict resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// User manually chose the resolution
    User,
    /// Automatic resolution based on configured policy
    Policy,
    /// System-initiated resolution (e.g., during startup)
    System,
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionSource::User => "user",
            ResolutionSource::Policy => "policy",
            ResolutionSource::System => "system",
        };
        write!(f, "{}", s)
    }
}

/// A synchronization conflict between local and remote file versions
///
/// Conflicts occur when both the local and remote versions of a file
/// have been modified since the last successful sync. ODrive tracks
/// these conflicts and provides mechanisms for resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique identifier for this conflict
    id: ConflictId,
    /// The sync item that has conflicting versions
    item_id: UniqueId,
    /// When the conflict was detected
    detected_at: DateTime<Utc>,
    /// Information about the local version
    local_version: VersionInfo,
    /// Information about the remote version
    remote_version: VersionInfo,
    /// How the conflict was resolved (if resolved)
    resolution: Option<Resolution>,
    /// When the conflict was resolved (if resolved)
    resolved_at: Option<DateTime<Utc>>,
    /// Who or what resolved the conflict (if resolved)
    resolved_by: Option<ResolutionSource>,
}

impl Conflict {
    /// Creates a new unresolved conflict
    ///
    /// # Arguments
    ///
    /// * `item_id` - The ID of the sync item with conflicting versions
    /// * `local_version` - Information about the local file version
    /// * `remote_version` - Information about the remote file version
    ///
    /// # Example
    ///
    /// ```
    /// use odrive_core::domain::conflict::{Conflict, VersionInfo};
    /// use odrive_core::domain::newtypes::UniqueId;
    /// use chrono::Utc;
    ///
    /// let local = VersionInfo::new(1024, Utc::now());
    /// let remote = VersionInfo::new(1048, Utc::now());
    ///
    /// let conflict = Conflict::new(UniqueId::new(), local, remote);
    /// assert!(!conflict.is_resolved());
    /// ```
    pub fn new(item_id: UniqueId, local_version: VersionInfo, remote_version: VersionInfo) -> Self {
        Self {
            id: ConflictId::new(),
            item_id,
            detected_at: Utc::now(),
            local_version,
            remote_version,
            resolution: None,
            resolved_at: None,
            resolved_by: None,
        }
    }

    /// Returns the conflict ID
    pub fn id(&self) -> &ConflictId {
        &self.id
    }

    /// Returns the item ID
    pub fn item_id(&self) -> &UniqueId {
        &self.item_id
    }

    /// Returns when the conflict was detected
    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Returns information about the local version
    pub fn local_version(&self) -> &VersionInfo {
        &self.local_version
    }

    /// Returns information about the remote version
    pub fn remote_version(&self) -> &VersionInfo {
        &self.remote_version
    }

    /// Returns the resolution if the conflict has been resolved
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    /// Returns when the conflict was resolved
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Returns who or what resolved the conflict
    pub fn resolved_by(&self) -> Option<&ResolutionSource> {
        self.resolved_by.as_ref()
    }

    /// Returns true if the conflict has been resolved
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Resolves the conflict with the given resolution and source
    ///
    /// # Arguments
    ///
    /// * `resolution` - How to resolve the conflict
    /// * `source` - Who or what initiated the resolution
    ///
    /// # Returns
    ///
    /// The modified conflict with resolution information set.
    /// If the conflict is already resolved, this is a no-op and
    /// returns the conflict unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use odrive_core::domain::conflict::{Conflict, VersionInfo, Resolution, ResolutionSource};
    /// use odrive_core::domain::newtypes::UniqueId;
    /// use chrono::Utc;
    ///
    /// let local = VersionInfo::new(1024, Utc::now());
    /// let remote = VersionInfo::new(1048, Utc::now());
    ///
    /// let conflict = Conflict::new(UniqueId::new(), local, remote)
    ///     .resolve(Resolution::KeepBoth, ResolutionSource::User);
    ///
    /// assert!(conflict.is_resolved());
    /// assert_eq!(conflict.resolution(), Some(&Resolution::KeepBoth));
    /// assert_eq!(conflict.resolved_by(), Some(&ResolutionSource::User));
    /// ```
    pub fn resolve(mut self, resolution: Resolution, source: ResolutionSource) -> Self {
        if self.is_resolved() {
            return self;
        }

        self.resolution = Some(resolution);
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(source);
        self
    }
}
