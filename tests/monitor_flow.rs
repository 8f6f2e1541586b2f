//! End-to-end monitor flows against in-memory fake collaborators, driving
//! the controller tick-by-tick so no test depends on wall-clock timing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use walguard::collaborators::{BackupEngine, Database, RemoteSync};
use walguard::monitor::{
    BackupType, MonitorError, MonitorState, MonitorStateStore, Result, ScheduledOutcome,
    TickOutcome, TriggerSource, WalMonitor,
};
use walguard::upload::UploadCoordinator;
use walguard::Config;

const ONE_MB: u64 = 1_048_576;

struct FakeDatabase {
    ready: AtomicBool,
    position: Mutex<Option<String>>,
}

impl FakeDatabase {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            position: Mutex::new(None),
        })
    }

    fn set_position(&self, position: &str) {
        *self.position.lock().unwrap() = Some(position.to_string());
    }

    fn clear_position(&self) {
        *self.position.lock().unwrap() = None;
    }

    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn current_log_position(&self) -> Result<Option<String>> {
        Ok(self.position.lock().unwrap().clone())
    }
}

struct FakeEngine {
    has_base: AtomicBool,
    fail_backups: AtomicBool,
    backups: Mutex<Vec<BackupType>>,
}

impl FakeEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            has_base: AtomicBool::new(false),
            fail_backups: AtomicBool::new(false),
            backups: Mutex::new(Vec::new()),
        })
    }

    fn with_base_backup() -> Arc<Self> {
        let engine = Self::new();
        engine.has_base.store(true, Ordering::SeqCst);
        engine
    }

    fn set_failing(&self, failing: bool) {
        self.fail_backups.store(failing, Ordering::SeqCst);
    }

    fn backups_run(&self) -> Vec<BackupType> {
        self.backups.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackupEngine for FakeEngine {
    async fn has_base_backup(&self) -> Result<bool> {
        Ok(self.has_base.load(Ordering::SeqCst))
    }

    async fn run_backup(&self, backup_type: BackupType) -> Result<()> {
        if self.fail_backups.load(Ordering::SeqCst) {
            return Err(MonitorError::Engine {
                message: "simulated engine failure".to_string(),
            });
        }

        self.backups.lock().unwrap().push(backup_type);
        if backup_type == BackupType::Full {
            self.has_base.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeSync {
    fail_sync: AtomicBool,
    synced: Mutex<Vec<String>>,
    uploaded: Mutex<Vec<String>>,
}

impl FakeSync {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn synced_remotes(&self) -> Vec<String> {
        self.synced.lock().unwrap().clone()
    }

    fn uploaded_objects(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSync for FakeSync {
    async fn sync_repository(&self, _local_path: &Path, remote_path: &str) -> Result<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(MonitorError::Sync {
                message: "simulated sync failure".to_string(),
            });
        }
        self.synced.lock().unwrap().push(remote_path.to_string());
        Ok(())
    }

    async fn upload_object(&self, _local_file: &Path, remote_path: &str) -> Result<()> {
        self.uploaded.lock().unwrap().push(remote_path.to_string());
        Ok(())
    }

    async fn list(&self, _remote_path: &str) -> Result<Vec<String>> {
        Ok(self.uploaded_objects())
    }
}

struct Harness {
    database: Arc<FakeDatabase>,
    engine: Arc<FakeEngine>,
    sync: Arc<FakeSync>,
    config: Config,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(engine: Arc<FakeEngine>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            wal_growth_threshold: ONE_MB,
            min_wal_growth_for_backup: ONE_MB,
            state_file: dir.path().join("monitor.state"),
            repo_path: dir.path().join("repo"),
            ..Config::default()
        };

        Self {
            database: FakeDatabase::new(),
            engine,
            sync: FakeSync::new(),
            config,
            _dir: dir,
        }
    }

    fn monitor(&self) -> WalMonitor {
        let uploader = UploadCoordinator::new(
            self.sync.clone(),
            &self.config.repo_path,
            &self.config.backup_remote,
            &self.config.stanza,
        );
        WalMonitor::new(
            &self.config,
            self.database.clone(),
            self.engine.clone(),
            uploader,
        )
    }

    fn state_path(&self) -> PathBuf {
        self.config.state_file.clone()
    }

    async fn load_state(&self) -> MonitorState {
        MonitorStateStore::new(&self.config.state_file).load().await
    }
}

#[tokio::test]
async fn first_tick_establishes_baseline_without_growth() {
    let harness = Harness::new(FakeEngine::new());
    let mut monitor = harness.monitor();

    harness.database.set_position("0/5000000");
    let outcome = monitor.run_tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::NoOp { accumulated: 0 });
    let state = harness.load_state().await;
    assert_eq!(state.last_check_lsn.as_deref(), Some("0/5000000"));
    assert_eq!(state.accumulated_growth, 0);
    assert!(harness.engine.backups_run().is_empty());
}

#[tokio::test]
async fn threshold_crossing_triggers_full_backup_first() {
    let harness = Harness::new(FakeEngine::new());
    let mut monitor = harness.monitor();

    harness.database.set_position("0/1000000");
    monitor.run_tick().await.unwrap();

    // 0x100000 = exactly 1 MiB of growth
    harness.database.set_position("0/1100000");
    let outcome = monitor.run_tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Triggered {
            backup_type: BackupType::Full,
            accumulated: ONE_MB,
        }
    );
    assert_eq!(harness.engine.backups_run(), vec![BackupType::Full]);

    let state = harness.load_state().await;
    assert_eq!(state.accumulated_growth, 0);
    assert_eq!(state.last_backup_lsn.as_deref(), Some("0/1100000"));
    assert_eq!(state.triggered_by, Some(TriggerSource::Full));
    assert!(state.last_backup_time.is_some());
}

#[tokio::test]
async fn existing_base_backup_gets_incremental() {
    let harness = Harness::new(FakeEngine::with_base_backup());
    let mut monitor = harness.monitor();

    harness.database.set_position("3/0");
    monitor.run_tick().await.unwrap();
    harness.database.set_position("3/200000");
    let outcome = monitor.run_tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Triggered {
            backup_type: BackupType::Incremental,
            accumulated: 2 * ONE_MB,
        }
    );
    assert_eq!(harness.engine.backups_run(), vec![BackupType::Incremental]);
    assert_eq!(
        harness.load_state().await.triggered_by,
        Some(TriggerSource::Incremental)
    );
}

#[tokio::test]
async fn failed_backup_preserves_accumulated_growth() {
    let harness = Harness::new(FakeEngine::with_base_backup());
    let mut monitor = harness.monitor();

    harness.database.set_position("0/1000000");
    monitor.run_tick().await.unwrap();

    harness.engine.set_failing(true);
    harness.database.set_position("0/1100000");
    let outcome = monitor.run_tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::BackupFailed {
            backup_type: BackupType::Incremental,
            accumulated: ONE_MB,
        }
    );
    // Not reset, and no backup recorded
    assert_eq!(harness.load_state().await.accumulated_growth, ONE_MB);
    assert!(harness.engine.backups_run().is_empty());

    // Recovery: more growth arrives, the engine is healthy again, and the
    // retry carries the full accumulated total.
    harness.engine.set_failing(false);
    harness.database.set_position("0/1180000");
    let outcome = monitor.run_tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Triggered {
            backup_type: BackupType::Incremental,
            accumulated: ONE_MB + 0x80000,
        }
    );
    assert_eq!(harness.load_state().await.accumulated_growth, 0);
}

#[tokio::test]
async fn unreachable_database_skips_tick_without_state_change() {
    let harness = Harness::new(FakeEngine::new());
    let mut monitor = harness.monitor();

    harness.database.set_ready(false);
    harness.database.set_position("0/1000000");
    let outcome = monitor.run_tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::DatabaseUnreachable);
    assert!(!harness.state_path().exists());
}

#[tokio::test]
async fn missing_position_skips_tick_without_state_change() {
    let harness = Harness::new(FakeEngine::new());
    let mut monitor = harness.monitor();

    harness.database.clear_position();
    let outcome = monitor.run_tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::NoPosition);
    assert!(!harness.state_path().exists());
}

#[tokio::test]
async fn accumulated_growth_survives_controller_restart() {
    let harness = Harness::new(FakeEngine::with_base_backup());

    {
        let mut monitor = harness.monitor();
        harness.database.set_position("0/1000000");
        monitor.run_tick().await.unwrap();
        harness.database.set_position("0/1040000");
        monitor.run_tick().await.unwrap();
    }

    // A fresh controller instance picks up the persisted baseline and
    // counter; the same position yields no phantom growth.
    let mut restarted = harness.monitor();
    harness.database.set_position("0/1040000");
    let outcome = restarted.run_tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::NoOp {
            accumulated: 0x40000
        }
    );
}

#[tokio::test]
async fn triggered_backup_hands_off_to_upload() {
    let harness = Harness::new(FakeEngine::with_base_backup());
    let mut monitor = harness.monitor();

    harness.database.set_position("0/0");
    monitor.run_tick().await.unwrap();
    harness.database.set_position("0/100000");
    monitor.run_tick().await.unwrap();

    let synced = harness.sync.synced_remotes();
    assert_eq!(synced, vec!["remote:pg-backups/repository".to_string()]);

    let uploaded = harness.sync.uploaded_objects();
    assert_eq!(uploaded.len(), 1);
    assert!(uploaded[0].starts_with("remote:pg-backups/metadata/"));
    assert!(uploaded[0].ends_with(".json"));

    // The remote record listing sees the uploaded metadata
    let uploader = UploadCoordinator::new(
        harness.sync.clone(),
        &harness.config.repo_path,
        &harness.config.backup_remote,
        &harness.config.stanza,
    );
    assert_eq!(uploader.list_records().await.unwrap().len(), 1);
}

#[tokio::test]
async fn upload_failure_does_not_fail_the_tick() {
    let harness = Harness::new(FakeEngine::with_base_backup());
    harness.sync.fail_sync.store(true, Ordering::SeqCst);
    let mut monitor = harness.monitor();

    harness.database.set_position("0/0");
    monitor.run_tick().await.unwrap();
    harness.database.set_position("0/100000");
    let outcome = monitor.run_tick().await.unwrap();

    assert!(matches!(outcome, TickOutcome::Triggered { .. }));
    // Local state update already succeeded
    assert_eq!(harness.load_state().await.accumulated_growth, 0);
    assert!(harness.sync.uploaded_objects().is_empty());
}

#[tokio::test]
async fn scheduled_incremental_suppressed_below_minimum_growth() {
    let harness = Harness::new(FakeEngine::with_base_backup());
    let mut monitor = harness.monitor();

    // Record a backup at 0/1000000, then only 0x100 bytes of growth
    MonitorStateStore::new(&harness.config.state_file)
        .save(&MonitorState {
            last_backup_lsn: Some("0/1000000".to_string()),
            ..MonitorState::default()
        })
        .await
        .unwrap();
    harness.database.set_position("0/1000100");

    let outcome = monitor.run_scheduled(BackupType::Incremental).await.unwrap();

    assert_eq!(outcome, ScheduledOutcome::Skipped { growth: 0x100 });
    assert!(harness.engine.backups_run().is_empty());
}

#[tokio::test]
async fn scheduled_incremental_runs_past_minimum_growth() {
    let harness = Harness::new(FakeEngine::with_base_backup());
    let mut monitor = harness.monitor();

    MonitorStateStore::new(&harness.config.state_file)
        .save(&MonitorState {
            last_backup_lsn: Some("0/1000000".to_string()),
            ..MonitorState::default()
        })
        .await
        .unwrap();
    harness.database.set_position("0/1200000");

    let outcome = monitor.run_scheduled(BackupType::Incremental).await.unwrap();

    assert_eq!(
        outcome,
        ScheduledOutcome::Completed {
            backup_type: BackupType::Incremental
        }
    );
    assert_eq!(harness.engine.backups_run(), vec![BackupType::Incremental]);
    assert_eq!(
        harness.load_state().await.triggered_by,
        Some(TriggerSource::Scheduled)
    );
}

#[tokio::test]
async fn scheduled_incremental_promotes_to_full_without_base() {
    let harness = Harness::new(FakeEngine::new());
    let mut monitor = harness.monitor();

    harness.database.set_position("0/5000000");
    let outcome = monitor.run_scheduled(BackupType::Incremental).await.unwrap();

    assert_eq!(
        outcome,
        ScheduledOutcome::Completed {
            backup_type: BackupType::Full
        }
    );
    assert_eq!(harness.engine.backups_run(), vec![BackupType::Full]);
}

#[tokio::test]
async fn scheduled_full_runs_unconditionally() {
    let harness = Harness::new(FakeEngine::with_base_backup());
    let mut monitor = harness.monitor();

    MonitorStateStore::new(&harness.config.state_file)
        .save(&MonitorState {
            last_backup_lsn: Some("0/1000000".to_string()),
            ..MonitorState::default()
        })
        .await
        .unwrap();
    // No growth at all since the last backup
    harness.database.set_position("0/1000000");

    let outcome = monitor.run_scheduled(BackupType::Full).await.unwrap();

    assert_eq!(
        outcome,
        ScheduledOutcome::Completed {
            backup_type: BackupType::Full
        }
    );
}

#[tokio::test]
async fn forced_backup_bypasses_evaluator_and_resets_state() {
    let harness = Harness::new(FakeEngine::with_base_backup());
    let mut monitor = harness.monitor();

    // Accumulate some growth below threshold
    harness.database.set_position("0/1000000");
    monitor.run_tick().await.unwrap();
    harness.database.set_position("0/1040000");
    monitor.run_tick().await.unwrap();
    assert_eq!(harness.load_state().await.accumulated_growth, 0x40000);

    let ran = monitor.run_forced(None).await.unwrap();

    assert_eq!(ran, BackupType::Incremental);
    let state = harness.load_state().await;
    assert_eq!(state.accumulated_growth, 0);
    assert_eq!(state.triggered_by, Some(TriggerSource::Forced));
    assert_eq!(state.last_backup_lsn.as_deref(), Some("0/1040000"));
}

#[tokio::test]
async fn forced_incremental_without_base_runs_full_first() {
    let harness = Harness::new(FakeEngine::new());
    let mut monitor = harness.monitor();

    harness.database.set_position("0/5000000");
    let ran = monitor
        .run_forced(Some(BackupType::Incremental))
        .await
        .unwrap();

    assert_eq!(ran, BackupType::Incremental);
    assert_eq!(
        harness.engine.backups_run(),
        vec![BackupType::Full, BackupType::Incremental]
    );
}
