use super::state::{MonitorState, MonitorStateStore};
use super::{evaluator, BackupType, GrowthDecision, Result, TriggerSource};
use crate::collaborators::{BackupEngine, Database};
use crate::config::Config;
use crate::lsn;
use crate::upload::UploadCoordinator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Controller phases, advanced within a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    AwaitingFullBackup,
    AwaitingIncrementalBackup,
    UpdatingState,
    Faulted,
}

/// What a single poll tick did, for logs and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Database unreachable; nothing read, nothing written
    DatabaseUnreachable,
    /// WAL position could not be obtained; tick skipped with no mutation
    NoPosition,
    /// Below threshold; state persisted with the new baseline
    NoOp { accumulated: u64 },
    /// Threshold crossed and the backup succeeded; counter reset
    Triggered {
        backup_type: BackupType,
        accumulated: u64,
    },
    /// Threshold crossed but the backup failed; counter preserved for retry
    BackupFailed {
        backup_type: BackupType,
        accumulated: u64,
    },
}

/// Outcome of the cron-invoked scheduled backup path.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledOutcome {
    /// Incremental suppressed: WAL growth since the last backup was below
    /// the configured minimum
    Skipped { growth: u64 },
    Completed { backup_type: BackupType },
}

/// The WAL-growth-triggered backup controller.
///
/// One instance owns one state file; ticks are strictly sequential and each
/// tick's read-evaluate-write is never interleaved with another. Running two
/// controllers against the same state file is undefined.
pub struct WalMonitor {
    database: Arc<dyn Database>,
    engine: Arc<dyn BackupEngine>,
    uploader: UploadCoordinator,
    store: MonitorStateStore,
    threshold: u64,
    min_scheduled_growth: u64,
    poll_interval: Duration,
    phase: ControllerPhase,
    last_persisted: MonitorState,
}

impl WalMonitor {
    pub fn new(
        config: &Config,
        database: Arc<dyn Database>,
        engine: Arc<dyn BackupEngine>,
        uploader: UploadCoordinator,
    ) -> Self {
        Self {
            database,
            engine,
            uploader,
            store: MonitorStateStore::new(&config.state_file),
            threshold: config.wal_growth_threshold,
            min_scheduled_growth: config.min_wal_growth_for_backup,
            poll_interval: Duration::from_secs(config.wal_monitor_interval_seconds),
            phase: ControllerPhase::Idle,
            last_persisted: MonitorState::default(),
        }
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn state_store(&self) -> &MonitorStateStore {
        &self.store
    }

    /// Run the polling loop until a shutdown signal arrives.
    ///
    /// An in-flight tick always completes before the signal is honored, so
    /// a backup invocation is never killed midway, and state is persisted
    /// as the final action before returning.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "WAL monitor starting: threshold {} bytes, interval {}s, state file {}",
            self.threshold,
            self.poll_interval.as_secs(),
            self.store.path().display()
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_tick().await {
                        Ok(outcome) => debug!("WAL monitor tick: {:?}", outcome),
                        Err(e) => error!("WAL monitor tick failed: {}", e),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, persisting monitor state");
                    if let Err(e) = self.store.save(&self.last_persisted).await {
                        warn!("Could not persist monitor state on shutdown: {}", e);
                    }
                    break;
                }
            }
        }

        info!("WAL monitor stopped");
        Ok(())
    }

    /// One poll tick: reachability gate, position read, growth evaluation,
    /// and, when the threshold is crossed, the backup itself.
    pub async fn run_tick(&mut self) -> Result<TickOutcome> {
        self.phase = ControllerPhase::Idle;

        if !self.database.is_ready().await {
            debug!("Database not ready, skipping WAL monitor tick");
            return Ok(TickOutcome::DatabaseUnreachable);
        }

        let position = match self.database.current_log_position().await {
            Ok(Some(p)) if !p.is_empty() => p,
            Ok(_) => {
                warn!("Empty WAL position reported, skipping tick");
                return Ok(TickOutcome::NoPosition);
            }
            Err(e) => {
                warn!("Could not read WAL position, skipping tick: {}", e);
                return Ok(TickOutcome::NoPosition);
            }
        };

        let state = self.store.load().await;
        let eval = evaluator::evaluate(&position, &state, self.threshold);
        debug!(
            tick_growth = eval.tick_growth,
            accumulated = eval.state.accumulated_growth,
            threshold = self.threshold,
            position = %position,
            "Evaluated WAL growth"
        );

        match eval.decision {
            GrowthDecision::NoOp => {
                let accumulated = eval.state.accumulated_growth;
                self.persist(eval.state).await?;
                Ok(TickOutcome::NoOp { accumulated })
            }
            GrowthDecision::Trigger => {
                let accumulated = eval.state.accumulated_growth;
                let backup_type = if self.engine.has_base_backup().await? {
                    BackupType::Incremental
                } else {
                    BackupType::Full
                };
                info!(
                    "WAL growth threshold crossed ({} >= {} bytes), triggering {} backup",
                    accumulated,
                    self.threshold,
                    backup_type.engine_flag()
                );

                self.phase = match backup_type {
                    BackupType::Full => ControllerPhase::AwaitingFullBackup,
                    _ => ControllerPhase::AwaitingIncrementalBackup,
                };

                match self.engine.run_backup(backup_type).await {
                    Ok(()) => {
                        let source = match backup_type {
                            BackupType::Full => TriggerSource::Full,
                            _ => TriggerSource::Incremental,
                        };
                        self.record_success(eval.state, &position, backup_type, source)
                            .await?;
                        self.phase = ControllerPhase::Idle;
                        Ok(TickOutcome::Triggered {
                            backup_type,
                            accumulated,
                        })
                    }
                    Err(e) => {
                        self.phase = ControllerPhase::Faulted;
                        error!(
                            "Triggered {} backup failed, keeping {} bytes of accumulated growth for retry: {}",
                            backup_type.engine_flag(),
                            accumulated,
                            e
                        );
                        // Persist the advanced baseline but NOT a reset:
                        // growth survives the failed attempt and the next
                        // tick retries.
                        self.persist(eval.state).await?;
                        self.phase = ControllerPhase::Idle;
                        Ok(TickOutcome::BackupFailed {
                            backup_type,
                            accumulated,
                        })
                    }
                }
            }
        }
    }

    /// The cron-invoked scheduled backup path. A full or differential runs
    /// unconditionally; an incremental is suppressed when WAL growth since
    /// the last recorded backup is below the configured minimum, so cron
    /// does not pile up near-empty backups on an idle database.
    pub async fn run_scheduled(&mut self, requested: BackupType) -> Result<ScheduledOutcome> {
        let state = self.store.load().await;
        let position = self.database.current_log_position().await.ok().flatten();

        let mut backup_type = requested;
        if backup_type == BackupType::Incremental {
            if let (Some(position), Some(last)) = (&position, &state.last_backup_lsn) {
                let growth = lsn::delta(position, last);
                if growth < self.min_scheduled_growth {
                    info!(
                        "Skipping scheduled incremental backup: {} bytes of WAL growth since last backup (minimum {})",
                        growth, self.min_scheduled_growth
                    );
                    return Ok(ScheduledOutcome::Skipped { growth });
                }
            }
            if !self.engine.has_base_backup().await? {
                info!("No base backup exists, promoting scheduled incremental to full");
                backup_type = BackupType::Full;
            }
        }

        info!("Running scheduled {} backup", backup_type.engine_flag());
        self.engine.run_backup(backup_type).await?;

        let mut next = state;
        if let Some(position) = &position {
            next.last_check_lsn = Some(position.clone());
        }
        self.record_success_at(next, position.as_deref(), backup_type, TriggerSource::Scheduled)
            .await?;

        Ok(ScheduledOutcome::Completed { backup_type })
    }

    /// Bypass the evaluator entirely and drive the success path now. Backs
    /// the operator's force-backup command.
    pub async fn run_forced(&mut self, requested: Option<BackupType>) -> Result<BackupType> {
        let backup_type = match requested {
            Some(t) => t,
            None => {
                if self.engine.has_base_backup().await? {
                    BackupType::Incremental
                } else {
                    BackupType::Full
                }
            }
        };

        if backup_type != BackupType::Full && !self.engine.has_base_backup().await? {
            info!("No base backup exists, forcing a full backup first");
            self.engine.run_backup(BackupType::Full).await?;
        }

        info!("Running forced {} backup", backup_type.engine_flag());
        self.engine.run_backup(backup_type).await?;

        let position = self.database.current_log_position().await.ok().flatten();
        let mut state = self.store.load().await;
        if let Some(position) = &position {
            state.last_check_lsn = Some(position.clone());
        }
        self.record_success_at(state, position.as_deref(), backup_type, TriggerSource::Forced)
            .await?;

        Ok(backup_type)
    }

    // Private helpers

    async fn persist(&mut self, state: MonitorState) -> Result<()> {
        self.store.save(&state).await?;
        self.last_persisted = state;
        Ok(())
    }

    /// Success path for a monitor-triggered backup: stamp time and position,
    /// reset the counter, persist, then hand off to the upload coordinator.
    async fn record_success(
        &mut self,
        state: MonitorState,
        position: &str,
        backup_type: BackupType,
        source: TriggerSource,
    ) -> Result<()> {
        self.record_success_at(state, Some(position), backup_type, source)
            .await
    }

    async fn record_success_at(
        &mut self,
        mut state: MonitorState,
        position: Option<&str>,
        backup_type: BackupType,
        source: TriggerSource,
    ) -> Result<()> {
        self.phase = ControllerPhase::UpdatingState;

        state.last_backup_time = Some(Utc::now());
        if let Some(position) = position {
            state.last_backup_lsn = Some(position.to_string());
        }
        state.accumulated_growth = 0;
        state.triggered_by = Some(source);
        self.persist(state).await?;

        // Upload failure is a warning inside the coordinator: the local
        // backup and state update already succeeded, and the next sync
        // picks the repository up.
        let _ = self.uploader.upload(backup_type, source).await;

        self.phase = ControllerPhase::Idle;
        Ok(())
    }
}
