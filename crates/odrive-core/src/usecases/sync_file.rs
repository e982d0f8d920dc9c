//! File synchronization use case
//!
//! Orchestrates the upload and download of individual files between
//! the local filesystem and the cloud provider. Handles hash computation,
//! sync direction determination, and status transitions.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::domain::newtypes::RemoteHash;
use crate::domain::{AuditAction, AuditEntry, AuditResult, DriveItem, SyncDirection, SyncStatus};
use crate::ports::{ICloudProvider, ILocalFileSystem, IStateRepository};

/// Threshold in bytes for choosing simple PUT upload vs. resumable session upload.
/// Files smaller than 4 MB use a simple PUT request.
const SIMPLE_UPLOAD_THRESHOLD: u64 = 4 * 1024 * 1024;

/// Use case for synchronizing individual files
///
/// Coordinates file transfers between local filesystem and cloud provider,
/// based on the item's `sync_status`, and verifies write success after
/// transfer.
pub struct SyncFileUseCase {
    cloud_provider: Arc<dyn ICloudProvider + Send + Sync>,
    state_repository: Arc<dyn IStateRepository + Send + Sync>,
    local_filesystem: Arc<dyn ILocalFileSystem + Send + Sync>,
}

impl SyncFileUseCase {
    /// Creates a new SyncFileUseCase with the required dependencies
    ///
    /// # Arguments
    ///
    /// * `cloud_provider` - Cloud storage provider for upload/download operations
    /// * `state_repository` - Persistent storage for sync state and audit log
    /// * `local_filesystem` - Local filesystem operations for reading/writing files
    pub fn new(
        cloud_provider: Arc<dyn ICloudProvider + Send + Sync>,
        state_repository: Arc<dyn IStateRepository + Send + Sync>,
        local_filesystem: Arc<dyn ILocalFileSystem + Send + Sync>,
    ) -> Self {
        Self {
            cloud_provider,
            state_repository,
            local_filesystem,
        }
    }

    /// Synchronizes a single item according to its pending direction
    ///
    /// This method:
    /// 1. Reads `sync_status` to determine whether an upload or download is due
    /// 2. Performs the transfer via `upload` or `download`
    /// 3. Persists the updated item in the repository
    ///
    /// # Arguments
    ///
    /// * `item` - The sync item to synchronize
    ///
    /// # Returns
    ///
    /// The updated DriveItem after synchronization
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer or state update fails
    pub async fn sync_single(&self, item: &DriveItem) -> Result<DriveItem> {
        // Skip directories - they don't need content sync
        if item.is_directory() {
            return Ok(item.clone());
        }

        let updated_item = match item.sync_status() {
            SyncStatus::PendingUpload => self
                .upload(item)
                .await
                .context("Failed to upload file to cloud")?,
            SyncStatus::PendingDownload => self
                .download(item)
                .await
                .context("Failed to download file from cloud")?,
            SyncStatus::Synced | SyncStatus::Failed => item.clone(),
        };

        // Persist the updated item state
        self.state_repository
            .save_item(&updated_item)
            .await
            .context("Failed to persist sync item state after transfer")?;

        Ok(updated_item)
    }

    /// Uploads a local file to the cloud provider
    ///
    /// This method:
    /// 1. Reads the file content from the local filesystem
    /// 2. Chooses upload method based on file size:
    ///    - Simple PUT for files < 4MB
    ///    - Resumable upload session for larger files
    /// 3. Records the remote hash and ctag/etag returned by the provider
    /// 4. Marks the item `Synced`
    ///
    /// # Arguments
    ///
    /// * `item` - The sync item to upload
    ///
    /// # Returns
    ///
    /// The updated DriveItem, marked `Synced` with the remote hash recorded
    ///
    /// # Errors
    ///
    /// Returns an error if file read, upload, or state transition fails
    pub async fn upload(&self, item: &DriveItem) -> Result<DriveItem> {
        let mut updated_item = item.clone();

        // Step 1: Read the local file content
        let content = self
            .local_filesystem
            .read_file(item.local_path())
            .await
            .context("Failed to read local file for upload")?;

        // Step 2: Extract parent path and file name from remote path
        let remote_path = item.remote_path();
        let parent_path = remote_path
            .parent()
            .context("Remote path has no parent directory")?;
        let file_name = remote_path
            .file_name()
            .context("Remote path has no file name")?;

        // Step 3: Upload based on file size
        let delta_item = if item.size_bytes() < SIMPLE_UPLOAD_THRESHOLD {
            // Simple PUT upload for small files
            self.cloud_provider
                .upload_file(&parent_path, file_name, &content, None)
                .await
                .context("Failed to upload small file via PUT")?
        } else {
            // Resumable upload session for larger files
            self.cloud_provider
                .upload_file_session(&parent_path, file_name, &content, None)
                .await
                .context("Failed to upload large file via session")?
        };

        // Step 4: Extract and record the remote hash from the DeltaItem response
        let remote_hash = match delta_item.hash {
            Some(hash_str) => RemoteHash::new(hash_str)
                .context("Failed to parse hash returned by cloud provider")?,
            None => bail!("Cloud provider did not return a content hash after upload"),
        };

        updated_item.set_remote_hash(remote_hash);
        updated_item
            .mark_synced(SyncDirection::Upload)
            .context("Invalid state transition to Synced after upload")?;

        // Step 5: Record audit entry
        let audit_entry = AuditEntry::new(AuditAction::FileUpload, AuditResult::success())
            .with_details(json!({
                "path": item.local_path().to_string(),
                "remote_path": item.remote_path().to_string(),
                "size_bytes": item.size_bytes(),
                "upload_method": if item.size_bytes() < SIMPLE_UPLOAD_THRESHOLD {
                    "simple_put"
                } else {
                    "resumable_session"
                },
            }));

        self.state_repository
            .save_audit(&audit_entry)
            .await
            .context("Failed to record upload audit entry")?;

        Ok(updated_item)
    }

    /// Downloads a file from the cloud provider to the local filesystem
    ///
    /// This method:
    /// 1. Streams the file content from the cloud provider
    /// 2. Writes the content to the local filesystem
    /// 3. Records the local hash of the written content
    /// 4. Marks the item `Synced`
    ///
    /// # Arguments
    ///
    /// * `item` - The sync item to download
    ///
    /// # Returns
    ///
    /// The updated DriveItem, marked `Synced` with the local hash recorded
    ///
    /// # Errors
    ///
    /// Returns an error if download, write, or state transition fails
    pub async fn download(&self, item: &DriveItem) -> Result<DriveItem> {
        let mut updated_item = item.clone();

        // Step 1: Get the remote ID (required for download)
        let remote_id = item
            .remote_id()
            .context("Cannot download file without a remote ID")?;

        // Step 2: Download content from cloud provider
        let content = self
            .cloud_provider
            .download_file(remote_id)
            .await
            .context("Failed to download file from cloud provider")?;

        // Step 3: Write to local filesystem
        self.local_filesystem
            .write_file(item.local_path(), &content)
            .await
            .context("Failed to write downloaded file to local filesystem")?;

        // Step 4: Compute the local hash of the written content
        let local_hash = self
            .local_filesystem
            .compute_hash(item.local_path())
            .await
            .context("Failed to compute hash of downloaded file")?;

        // Step 5: Update item state
        updated_item.set_local_hash(local_hash);
        updated_item
            .mark_synced(SyncDirection::Download)
            .context("Invalid state transition to Synced after download")?;

        // Step 6: Record audit entry
        let audit_entry = AuditEntry::new(AuditAction::FileDownload, AuditResult::success())
            .with_details(json!({
                "path": item.local_path().to_string(),
                "remote_path": item.remote_path().to_string(),
                "size_bytes": item.size_bytes(),
            }));

        self.state_repository
            .save_audit(&audit_entry)
            .await
            .context("Failed to record download audit entry")?;

        Ok(updated_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::newtypes::{FileHash, RemoteId, RemotePath, SyncPath};
    use crate::ports::cloud_provider::{AuthFlow, DeltaItem, DeltaResponse, Tokens, UserInfo};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeCloudProvider {
        uploaded: AsyncMutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ICloudProvider for FakeCloudProvider {
        async fn authenticate(&self, _auth_flow: &AuthFlow) -> Result<Tokens> {
            unimplemented!()
        }
        async fn refresh_tokens(&self, _refresh_token: &str) -> Result<Tokens> {
            unimplemented!()
        }
        async fn get_delta(
            &self,
            _token: Option<&crate::domain::newtypes::DeltaToken>,
        ) -> Result<DeltaResponse> {
            unimplemented!()
        }
        async fn download_file(&self, _remote_id: &RemoteId) -> Result<Vec<u8>> {
            Ok(b"remote contents".to_vec())
        }
        async fn upload_file(
            &self,
            _parent_path: &RemotePath,
            name: &str,
            data: &[u8],
            _if_match_etag: Option<&str>,
        ) -> Result<DeltaItem> {
            self.uploaded
                .lock()
                .await
                .push((name.to_string(), data.to_vec()));
            Ok(DeltaItem {
                id: "remote-1".to_string(),
                name: name.to_string(),
                path: Some(format!("/{name}")),
                size: Some(data.len() as u64),
                hash: Some("REMOTEHASH".to_string()),
                ctag: Some("ctag-remote-1".to_string()),
                etag: Some("etag-remote-1".to_string()),
                modified: Some(chrono::Utc::now()),
                is_deleted: false,
                is_directory: false,
                parent_id: None,
            })
        }
        async fn upload_file_session(
            &self,
            parent_path: &RemotePath,
            name: &str,
            data: &[u8],
            _progress: Option<Box<dyn Fn(u64, u64) + Send>>,
        ) -> Result<DeltaItem> {
            self.upload_file(parent_path, name, data, None).await
        }
        async fn get_metadata(&self, _remote_id: &RemoteId) -> Result<DeltaItem> {
            unimplemented!()
        }
        async fn get_user_info(&self) -> Result<UserInfo> {
            unimplemented!()
        }
        async fn delete_item(&self, _remote_id: &RemoteId) -> Result<()> {
            Ok(())
        }
    }

    struct FakeFileSystem {
        written: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl ILocalFileSystem for FakeFileSystem {
        async fn read_file(&self, _path: &SyncPath) -> Result<Vec<u8>> {
            Ok(b"local contents".to_vec())
        }
        async fn write_file(&self, path: &SyncPath, data: &[u8]) -> Result<()> {
            self.written
                .lock()
                .unwrap()
                .insert(path.to_string(), data.to_vec());
            Ok(())
        }
        async fn delete_file(&self, _path: &SyncPath) -> Result<()> {
            Ok(())
        }
        async fn get_state(
            &self,
            _path: &SyncPath,
        ) -> Result<crate::ports::local_filesystem::FileSystemState> {
            Ok(crate::ports::local_filesystem::FileSystemState::not_found())
        }
        async fn compute_hash(&self, _path: &SyncPath) -> Result<FileHash> {
            FileHash::new("AAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string())
                .map_err(|e| anyhow::anyhow!(e))
        }
        async fn create_directory(&self, _path: &SyncPath) -> Result<()> {
            Ok(())
        }
        async fn watch(
            &self,
            _path: &SyncPath,
        ) -> Result<crate::ports::local_filesystem::WatchHandle> {
            Ok(crate::ports::local_filesystem::WatchHandle::new(|| {}))
        }
    }

    struct FakeStateRepository;

    #[async_trait]
    impl IStateRepository for FakeStateRepository {
        async fn save_item(&self, _item: &DriveItem) -> Result<()> {
            Ok(())
        }
        async fn get_item(&self, _id: &crate::domain::newtypes::UniqueId) -> Result<Option<DriveItem>> {
            Ok(None)
        }
        async fn get_item_by_path(&self, _path: &SyncPath) -> Result<Option<DriveItem>> {
            Ok(None)
        }
        async fn get_item_by_remote_id(&self, _remote_id: &RemoteId) -> Result<Option<DriveItem>> {
            Ok(None)
        }
        async fn query_items(&self, _filter: &crate::ports::ItemFilter) -> Result<Vec<DriveItem>> {
            Ok(vec![])
        }
        async fn delete_item(&self, _id: &crate::domain::newtypes::UniqueId) -> Result<()> {
            Ok(())
        }
        async fn count_items_by_state(
            &self,
            _account_id: &crate::domain::newtypes::AccountId,
        ) -> Result<HashMap<String, u64>> {
            Ok(HashMap::new())
        }
        async fn save_account(&self, _account: &crate::domain::Account) -> Result<()> {
            Ok(())
        }
        async fn get_account(
            &self,
            _id: &crate::domain::newtypes::AccountId,
        ) -> Result<Option<crate::domain::Account>> {
            Ok(None)
        }
        async fn get_default_account(&self) -> Result<Option<crate::domain::Account>> {
            Ok(None)
        }
        async fn save_session(&self, _session: &crate::domain::session::SyncSession) -> Result<()> {
            Ok(())
        }
        async fn get_session(
            &self,
            _id: &crate::domain::newtypes::SessionId,
        ) -> Result<Option<crate::domain::session::SyncSession>> {
            Ok(None)
        }
        async fn save_audit(&self, _entry: &AuditEntry) -> Result<()> {
            Ok(())
        }
        async fn get_audit_trail(
            &self,
            _item_id: &crate::domain::newtypes::UniqueId,
        ) -> Result<Vec<AuditEntry>> {
            Ok(vec![])
        }
        async fn get_audit_since(
            &self,
            _since: chrono::DateTime<chrono::Utc>,
            _limit: u32,
        ) -> Result<Vec<AuditEntry>> {
            Ok(vec![])
        }
        async fn save_conflict(&self, _conflict: &crate::domain::Conflict) -> Result<()> {
            Ok(())
        }
        async fn get_unresolved_conflicts(&self) -> Result<Vec<crate::domain::Conflict>> {
            Ok(vec![])
        }
        async fn get_next_inode(&self) -> Result<u64> {
            Ok(1)
        }
        async fn update_inode(&self, _item_id: &crate::domain::newtypes::UniqueId, _inode: u64) -> Result<()> {
            Ok(())
        }
        async fn get_item_by_inode(&self, _inode: u64) -> Result<Option<DriveItem>> {
            Ok(None)
        }
        async fn update_last_accessed(
            &self,
            _item_id: &crate::domain::newtypes::UniqueId,
            _accessed: chrono::DateTime<chrono::Utc>,
        ) -> Result<()> {
            Ok(())
        }
        async fn update_hydration_progress(
            &self,
            _item_id: &crate::domain::newtypes::UniqueId,
            _progress: Option<u8>,
        ) -> Result<()> {
            Ok(())
        }
        async fn get_items_for_dehydration(
            &self,
            _max_age_days: u32,
            _limit: u32,
        ) -> Result<Vec<DriveItem>> {
            Ok(vec![])
        }
    }

    fn test_item(status: SyncStatus) -> DriveItem {
        let local_path = SyncPath::new(PathBuf::from("/home/user/OneDrive/test.txt")).unwrap();
        let remote_path = RemotePath::new("/test.txt".to_string()).unwrap();
        let mut item = DriveItem::new_file(local_path, remote_path, 14, None).unwrap();
        item.set_remote_id(RemoteId::new("remote-1".to_string()).unwrap());
        match status {
            SyncStatus::PendingUpload => item.mark_pending_upload().unwrap(),
            SyncStatus::PendingDownload => item.mark_pending_download().unwrap(),
            _ => {}
        }
        item
    }

    fn use_case() -> SyncFileUseCase {
        SyncFileUseCase::new(
            Arc::new(FakeCloudProvider {
                uploaded: AsyncMutex::new(Vec::new()),
            }),
            Arc::new(FakeStateRepository),
            Arc::new(FakeFileSystem {
                written: Mutex::new(HashMap::new()),
            }),
        )
    }

    #[tokio::test]
    async fn upload_marks_item_synced() {
        let item = test_item(SyncStatus::PendingUpload);
        let result = use_case().upload(&item).await.unwrap();

        assert_eq!(result.sync_status(), SyncStatus::Synced);
        assert_eq!(result.last_sync_direction(), SyncDirection::Upload);
        assert!(result.remote_hash().is_some());
    }

    #[tokio::test]
    async fn download_marks_item_synced() {
        let item = test_item(SyncStatus::PendingDownload);
        let result = use_case().download(&item).await.unwrap();

        assert_eq!(result.sync_status(), SyncStatus::Synced);
        assert_eq!(result.last_sync_direction(), SyncDirection::Download);
        assert!(result.local_hash().is_some());
    }

    #[tokio::test]
    async fn sync_single_skips_directories() {
        let local_path = SyncPath::new(PathBuf::from("/home/user/OneDrive/dir")).unwrap();
        let remote_path = RemotePath::new("/dir".to_string()).unwrap();
        let item = DriveItem::new_directory(local_path, remote_path).unwrap();

        let result = use_case().sync_single(&item).await.unwrap();
        assert_eq!(result.sync_status(), SyncStatus::Synced);
    }
}
