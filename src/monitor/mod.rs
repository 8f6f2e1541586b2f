pub mod controller;
pub mod evaluator;
pub mod state;

pub use controller::*;
pub use evaluator::*;
pub use state::*;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Backup engine failure: {message}")]
    Engine { message: String },

    #[error("Remote sync failure: {message}")]
    Sync { message: String },

    #[error("State file error: {message}")]
    State { message: String },
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Backup flavors understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Incremental,
    Differential,
}

impl BackupType {
    /// The `--type` value the engine expects.
    pub fn engine_flag(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Incremental => "incr",
            BackupType::Differential => "diff",
        }
    }
}

/// Which path caused the last recorded backup, kept in the state file for
/// audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Full,
    Incremental,
    Scheduled,
    Forced,
}

impl TriggerSource {
    pub fn as_tag(&self) -> &'static str {
        match self {
            TriggerSource::Full => "full",
            TriggerSource::Incremental => "incremental",
            TriggerSource::Scheduled => "scheduled",
            TriggerSource::Forced => "forced",
        }
    }

    pub fn from_tag(tag: &str) -> Option<TriggerSource> {
        match tag {
            "full" => Some(TriggerSource::Full),
            "incremental" => Some(TriggerSource::Incremental),
            "scheduled" => Some(TriggerSource::Scheduled),
            "forced" => Some(TriggerSource::Forced),
            _ => None,
        }
    }
}

/// Per-tick outcome of the growth evaluator. Never persisted; its effect
/// reaches the state file through the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthDecision {
    NoOp,
    Trigger,
}
