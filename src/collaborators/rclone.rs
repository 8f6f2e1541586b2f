use super::RemoteSync;
use crate::monitor::{MonitorError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// `RemoteSync` collaborator shelling out to rclone.
pub struct RcloneSync;

impl RcloneSync {
    pub fn new() -> Self {
        Self
    }

    fn run(args: &[&str]) -> Result<Vec<u8>> {
        debug!("Running rclone {}", args.join(" "));

        let output = Command::new("rclone")
            .args(args)
            .output()
            .map_err(|e| MonitorError::Sync {
                message: format!("Failed to execute rclone: {e}"),
            })?;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            return Err(MonitorError::Sync {
                message: format!("rclone {} failed: {error_msg}", args[0]),
            });
        }

        Ok(output.stdout)
    }
}

impl Default for RcloneSync {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSync for RcloneSync {
    async fn sync_repository(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let local = local_path.to_string_lossy();
        Self::run(&["sync", "--create-empty-src-dirs", &local, remote_path])?;
        Ok(())
    }

    async fn upload_object(&self, local_file: &Path, remote_path: &str) -> Result<()> {
        let local = local_file.to_string_lossy();
        Self::run(&["copyto", &local, remote_path])?;
        Ok(())
    }

    async fn list(&self, remote_path: &str) -> Result<Vec<String>> {
        let stdout = Self::run(&["lsf", remote_path])?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(|line| line.trim_end_matches('/').to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}
