use super::{Result, TriggerSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const KEY_LAST_BACKUP_TIME: &str = "LAST_BACKUP_TIME";
const KEY_LAST_BACKUP_LSN: &str = "LAST_BACKUP_LSN";
const KEY_LAST_CHECK_LSN: &str = "LAST_CHECK_LSN";
const KEY_ACCUMULATED_GROWTH: &str = "ACCUMULATED_WAL_GROWTH";
const KEY_TRIGGERED_BY: &str = "BACKUP_TRIGGERED_BY";

/// Durable record of the WAL monitor's position between ticks.
///
/// The zero value doubles as the first-run state: no baseline, no recorded
/// backup, nothing accumulated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    /// When the last triggered backup completed
    pub last_backup_time: Option<DateTime<Utc>>,

    /// WAL position at the last triggered backup
    pub last_backup_lsn: Option<String>,

    /// WAL position observed at the previous poll tick
    pub last_check_lsn: Option<String>,

    /// Bytes of WAL growth accumulated since the last trigger
    pub accumulated_growth: u64,

    /// Which path caused the last state transition
    pub triggered_by: Option<TriggerSource>,
}

/// Owns the state file on disk.
///
/// The format is plain `KEY=value` lines so operators can inspect it with
/// `cat`. Absent values are written as the literal `null`. Writes go through
/// a temp file and rename so a crash mid-write leaves the previous valid
/// state in place. There is exactly one writer per state file; auxiliary
/// tooling reads it and tolerates stale values.
pub struct MonitorStateStore {
    path: PathBuf,
}

impl MonitorStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file, falling back to the zero-value state when the
    /// file is absent or unreadable. A corrupt file costs at most one
    /// growth-accounting window; monitoring availability wins over
    /// precision there.
    pub async fn load(&self) -> MonitorState {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No monitor state at {}, starting from zero state",
                    self.path.display()
                );
                MonitorState::default()
            }
            Err(e) => {
                warn!(
                    "Could not read monitor state {}: {}, starting from zero state",
                    self.path.display(),
                    e
                );
                MonitorState::default()
            }
        }
    }

    /// Atomically persist the state: write to a temp file next to the
    /// target, then rename into place.
    pub async fn save(&self, state: &MonitorState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.path.with_extension("state.tmp");
        fs::write(&tmp_path, Self::render(state)).await?;
        fs::rename(&tmp_path, &self.path).await?;

        debug!("Monitor state saved to {}", self.path.display());
        Ok(())
    }

    /// Delete the state file so the next start is an honest first run.
    pub async fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn parse(text: &str) -> MonitorState {
        let mut state = MonitorState::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("Skipping malformed state line: {line}");
                continue;
            };
            let value = value.trim();
            if value.is_empty() || value == "null" {
                continue;
            }

            match key.trim() {
                KEY_LAST_BACKUP_TIME => match DateTime::parse_from_rfc3339(value) {
                    Ok(t) => state.last_backup_time = Some(t.with_timezone(&Utc)),
                    Err(e) => warn!("Ignoring invalid {KEY_LAST_BACKUP_TIME} \"{value}\": {e}"),
                },
                KEY_LAST_BACKUP_LSN => state.last_backup_lsn = Some(value.to_string()),
                KEY_LAST_CHECK_LSN => state.last_check_lsn = Some(value.to_string()),
                KEY_ACCUMULATED_GROWTH => match value.parse() {
                    Ok(n) => state.accumulated_growth = n,
                    Err(e) => warn!("Ignoring invalid {KEY_ACCUMULATED_GROWTH} \"{value}\": {e}"),
                },
                KEY_TRIGGERED_BY => state.triggered_by = TriggerSource::from_tag(value),
                other => debug!("Ignoring unknown state key {other}"),
            }
        }

        state
    }

    fn render(state: &MonitorState) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{KEY_LAST_BACKUP_TIME}={}\n",
            state
                .last_backup_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "null".to_string())
        ));
        out.push_str(&format!(
            "{KEY_LAST_BACKUP_LSN}={}\n",
            state.last_backup_lsn.as_deref().unwrap_or("null")
        ));
        out.push_str(&format!(
            "{KEY_LAST_CHECK_LSN}={}\n",
            state.last_check_lsn.as_deref().unwrap_or("null")
        ));
        out.push_str(&format!(
            "{KEY_ACCUMULATED_GROWTH}={}\n",
            state.accumulated_growth
        ));
        out.push_str(&format!(
            "{KEY_TRIGGERED_BY}={}\n",
            state
                .triggered_by
                .map(|t| t.as_tag())
                .unwrap_or("null")
        ));
        out
    }
}
