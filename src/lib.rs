pub mod collaborators;
pub mod config;
pub mod lsn;
pub mod manager;
pub mod monitor;
pub mod sizes;
pub mod upload;

pub use config::Config;
pub use lsn::Lsn;
pub use sizes::parse_size;

// Re-export monitor types for convenience
pub use monitor::{
    BackupType, ControllerPhase, GrowthDecision, MonitorError, MonitorState, MonitorStateStore,
    ScheduledOutcome, TickOutcome, TriggerSource, WalMonitor,
};

// Re-export collaborator seams
pub use collaborators::{
    BackupEngine, Database, PgBackRestEngine, PostgresDatabase, RcloneSync, RemoteSync,
};

// Re-export upload coordination
pub use upload::{ArchiveRecord, UploadCoordinator};

// Re-export manager types
pub use manager::{ManagerPaths, MonitorManager};
