use super::BackupEngine;
use crate::monitor::{BackupType, MonitorError, Result};
use async_trait::async_trait;
use std::process::Command;
use tracing::{debug, info};

/// `BackupEngine` collaborator shelling out to pgBackRest.
pub struct PgBackRestEngine {
    stanza: String,
}

impl PgBackRestEngine {
    pub fn new(stanza: impl Into<String>) -> Self {
        Self {
            stanza: stanza.into(),
        }
    }

    fn info_json(&self) -> Result<serde_json::Value> {
        debug!("Querying pgbackrest info for stanza {}", self.stanza);

        let output = Command::new("pgbackrest")
            .arg("info")
            .arg("--output=json")
            .arg(format!("--stanza={}", self.stanza))
            .output()
            .map_err(|e| MonitorError::Engine {
                message: format!("Failed to execute pgbackrest info: {e}"),
            })?;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            return Err(MonitorError::Engine {
                message: format!("pgbackrest info failed: {error_msg}"),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| MonitorError::Engine {
            message: format!("Unparseable pgbackrest info output: {e}"),
        })
    }
}

#[async_trait]
impl BackupEngine for PgBackRestEngine {
    async fn has_base_backup(&self) -> Result<bool> {
        let info = self.info_json()?;

        // pgbackrest info emits one entry per stanza, each with a "backup"
        // array listing every backup in the repository.
        let has_backup = info
            .as_array()
            .and_then(|stanzas| {
                stanzas
                    .iter()
                    .find(|s| s.get("name").and_then(|n| n.as_str()) == Some(self.stanza.as_str()))
            })
            .and_then(|stanza| stanza.get("backup"))
            .and_then(|backups| backups.as_array())
            .map(|backups| !backups.is_empty())
            .unwrap_or(false);

        Ok(has_backup)
    }

    async fn run_backup(&self, backup_type: BackupType) -> Result<()> {
        info!(
            "Running pgbackrest {} backup for stanza {}",
            backup_type.engine_flag(),
            self.stanza
        );

        let output = Command::new("pgbackrest")
            .arg("backup")
            .arg(format!("--stanza={}", self.stanza))
            .arg(format!("--type={}", backup_type.engine_flag()))
            .output()
            .map_err(|e| MonitorError::Engine {
                message: format!("Failed to execute pgbackrest backup: {e}"),
            })?;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            return Err(MonitorError::Engine {
                message: format!(
                    "pgbackrest {} backup failed: {error_msg}",
                    backup_type.engine_flag()
                ),
            });
        }

        info!(
            "pgbackrest {} backup completed for stanza {}",
            backup_type.engine_flag(),
            self.stanza
        );
        Ok(())
    }
}
