use crate::collaborators::RemoteSync;
use crate::monitor::{BackupType, Result, TriggerSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Metadata record describing one uploaded backup. Lives under
/// `<remote>/metadata/<label>.json`, apart from the repository sync target,
/// so operators can enumerate backups without walking the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub label: String,
    pub backup_type: BackupType,
    pub completed_at: DateTime<Utc>,
    pub triggered_by: TriggerSource,
    pub stanza: String,
    pub repository_checksum: String,
}

/// Hands a completed backup off to remote storage: syncs the engine's
/// on-disk repository, then records an [`ArchiveRecord`].
pub struct UploadCoordinator {
    sync: Arc<dyn RemoteSync>,
    repo_path: PathBuf,
    remote: String,
    stanza: String,
}

impl UploadCoordinator {
    pub fn new(
        sync: Arc<dyn RemoteSync>,
        repo_path: impl Into<PathBuf>,
        remote: impl Into<String>,
        stanza: impl Into<String>,
    ) -> Self {
        Self {
            sync,
            repo_path: repo_path.into(),
            remote: remote.into(),
            stanza: stanza.into(),
        }
    }

    /// Sync the repository and upload the metadata record.
    ///
    /// Failures here are warnings, never fatal: the local backup and state
    /// update already succeeded, and the sync tool is incremental and
    /// idempotent, so the repository is picked up by the next attempt.
    pub async fn upload(
        &self,
        backup_type: BackupType,
        triggered_by: TriggerSource,
    ) -> Option<ArchiveRecord> {
        let record = ArchiveRecord {
            label: Uuid::new_v4().to_string(),
            backup_type,
            completed_at: Utc::now(),
            triggered_by,
            stanza: self.stanza.clone(),
            repository_checksum: self.repository_checksum().await,
        };

        let repo_remote = format!("{}/repository", self.remote);
        if let Err(e) = self
            .sync
            .sync_repository(&self.repo_path, &repo_remote)
            .await
        {
            warn!(
                "Repository sync to {} failed, next sync will retry: {}",
                repo_remote, e
            );
            return None;
        }

        if let Err(e) = self.upload_record(&record).await {
            warn!(
                "Could not record metadata for backup {}: {}",
                record.label, e
            );
            return None;
        }

        info!(
            "Backup {} ({}) uploaded to {}",
            record.label,
            record.backup_type.engine_flag(),
            self.remote
        );
        Some(record)
    }

    /// Names of the metadata records already on the remote, one per
    /// uploaded backup.
    pub async fn list_records(&self) -> Result<Vec<String>> {
        self.sync.list(&format!("{}/metadata", self.remote)).await
    }

    // Private helpers

    async fn upload_record(&self, record: &ArchiveRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(record).map_err(|e| {
            crate::monitor::MonitorError::Sync {
                message: format!("Could not serialize archive record: {e}"),
            }
        })?;

        let tmp_path = std::env::temp_dir().join(format!("walguard-{}.json", record.label));
        fs::write(&tmp_path, &body).await?;

        let remote_path = format!("{}/metadata/{}.json", self.remote, record.label);
        let result = self.sync.upload_object(&tmp_path, &remote_path).await;

        let _ = fs::remove_file(&tmp_path).await;
        result
    }

    /// Checksum of the engine's backup manifest, identifying the repository
    /// contents this record describes. Empty when the manifest is missing
    /// (nothing uploaded yet on a fresh repository).
    async fn repository_checksum(&self) -> String {
        use sha2::{Digest, Sha256};

        let manifest = self
            .repo_path
            .join("backup")
            .join(&self.stanza)
            .join("backup.info");

        match fs::read(&manifest).await {
            Ok(contents) => {
                let mut hasher = Sha256::new();
                hasher.update(&contents);
                format!("{:x}", hasher.finalize())
            }
            Err(e) => {
                debug!(
                    "No readable backup manifest at {}: {}",
                    manifest.display(),
                    e
                );
                String::new()
            }
        }
    }
}
