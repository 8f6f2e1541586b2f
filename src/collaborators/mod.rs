pub mod pgbackrest;
pub mod postgres;
pub mod rclone;

pub use pgbackrest::PgBackRestEngine;
pub use postgres::PostgresDatabase;
pub use rclone::RcloneSync;

use crate::monitor::{BackupType, Result};
use async_trait::async_trait;
use std::path::Path;

/// Reachability and WAL-position queries against the monitored database.
#[async_trait]
pub trait Database: Send + Sync {
    /// Whether the database currently accepts queries.
    async fn is_ready(&self) -> bool;

    /// Current WAL write position as reported by the server, or `None` when
    /// it cannot be obtained.
    async fn current_log_position(&self) -> Result<Option<String>>;
}

/// The external backup engine (base/incremental/differential backups, WAL
/// archiving, restore). The monitor only ever sequences it; the engine owns
/// the repository format.
#[async_trait]
pub trait BackupEngine: Send + Sync {
    /// Whether the repository already holds a restorable base backup.
    async fn has_base_backup(&self) -> Result<bool>;

    /// Run one backup of the given type. A failure carries the engine's
    /// diagnostic output in its message.
    async fn run_backup(&self, backup_type: BackupType) -> Result<()>;
}

/// The multi-cloud remote sync tool. Sync is incremental and idempotent, so
/// a failed transfer is simply retried by the next attempt.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    async fn sync_repository(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    async fn upload_object(&self, local_file: &Path, remote_path: &str) -> Result<()>;

    async fn list(&self, remote_path: &str) -> Result<Vec<String>>;
}
