use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walguard::collaborators::{PgBackRestEngine, PostgresDatabase, RcloneSync};
use walguard::manager::MonitorManager;
use walguard::monitor::{BackupType, MonitorStateStore, ScheduledOutcome, WalMonitor};
use walguard::upload::UploadCoordinator;
use walguard::Config;

#[derive(Parser)]
#[command(name = "walguard")]
#[command(about = "WAL-growth-triggered PostgreSQL backup orchestration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the WAL growth monitor
    Start {
        /// Run as a background daemon
        #[arg(long)]
        daemon: bool,
    },
    /// Stop the running monitor
    Stop,
    /// Restart the monitor daemon
    Restart,
    /// Show monitor status, persisted state and configuration
    Status {
        /// Show detailed status
        #[arg(long)]
        detailed: bool,
    },
    /// Show monitor logs
    Logs {
        /// Number of lines to show (default: 50)
        #[arg(long, default_value = "50")]
        lines: usize,
        /// Follow log output
        #[arg(long)]
        follow: bool,
    },
    /// Clear the persisted monitor state
    Reset,
    /// Trigger a backup immediately, bypassing the growth evaluator
    ForceBackup {
        /// Backup type (defaults to incremental when a base backup exists)
        #[arg(long, value_enum)]
        backup_type: Option<BackupTypeArg>,
    },
    /// Backup commands for cron-driven schedules
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Run a scheduled backup; near-empty incrementals are suppressed
    Run {
        #[arg(long, value_enum, default_value = "incr")]
        backup_type: BackupTypeArg,
    },
    /// List uploaded backups recorded on the remote
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackupTypeArg {
    Full,
    Incr,
    Diff,
}

impl From<BackupTypeArg> for BackupType {
    fn from(arg: BackupTypeArg) -> Self {
        match arg {
            BackupTypeArg::Full => BackupType::Full,
            BackupTypeArg::Incr => BackupType::Incremental,
            BackupTypeArg::Diff => BackupType::Differential,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    match cli.command.unwrap_or(Commands::Start { daemon: false }) {
        Commands::Start { daemon } => {
            if daemon {
                MonitorManager::new().start_daemon().await
            } else {
                run_monitor(&config).await
            }
        }
        Commands::Stop => MonitorManager::new().stop().await,
        Commands::Restart => MonitorManager::new().restart().await,
        Commands::Status { detailed } => show_status(&config, detailed).await,
        Commands::Logs { lines, follow } => MonitorManager::new().show_logs(lines, follow).await,
        Commands::Reset => {
            MonitorStateStore::new(&config.state_file).reset().await?;
            println!("Monitor state cleared: {}", config.state_file.display());
            Ok(())
        }
        Commands::ForceBackup { backup_type } => {
            let mut monitor = build_monitor(&config)?;
            let ran = monitor.run_forced(backup_type.map(Into::into)).await?;
            println!("Forced {} backup completed", ran.engine_flag());
            Ok(())
        }
        Commands::Backup { command } => match command {
            BackupCommands::Run { backup_type } => {
                let mut monitor = build_monitor(&config)?;
                match monitor.run_scheduled(backup_type.into()).await? {
                    ScheduledOutcome::Completed { backup_type } => {
                        println!("Scheduled {} backup completed", backup_type.engine_flag());
                    }
                    ScheduledOutcome::Skipped { growth } => {
                        println!(
                            "Scheduled backup skipped: only {growth} bytes of WAL growth since last backup"
                        );
                    }
                }
                Ok(())
            }
            BackupCommands::List => {
                let uploader = build_uploader(&config);
                let records = uploader.list_records().await?;
                if records.is_empty() {
                    println!("No backups recorded on {}", config.backup_remote);
                } else {
                    for record in records {
                        println!("{record}");
                    }
                }
                Ok(())
            }
        },
    }
}

/// Run the monitor loop in the foreground until SIGINT/SIGTERM.
async fn run_monitor(config: &Config) -> Result<()> {
    if !config.enable_wal_monitor {
        warn!("WAL monitor is disabled (ENABLE_WAL_MONITOR=false), nothing to run");
        return Ok(());
    }

    info!(
        "walguard starting against {} (stanza {})",
        config.safe_database_url(),
        config.stanza
    );

    let mut monitor = build_monitor(config)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("Termination signal received");
        let _ = shutdown_tx.send(());
    });

    monitor.run(shutdown_rx).await?;
    Ok(())
}

fn build_monitor(config: &Config) -> Result<WalMonitor> {
    // Lazy pool: the monitor starts even while the database is down and
    // simply skips ticks until it becomes reachable.
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect_lazy(&config.database_url)?;
    let database = Arc::new(PostgresDatabase::new(pool));
    let engine = Arc::new(PgBackRestEngine::new(&config.stanza));

    Ok(WalMonitor::new(config, database, engine, build_uploader(config)))
}

fn build_uploader(config: &Config) -> UploadCoordinator {
    UploadCoordinator::new(
        Arc::new(RcloneSync::new()),
        &config.repo_path,
        &config.backup_remote,
        &config.stanza,
    )
}

async fn show_status(config: &Config, detailed: bool) -> Result<()> {
    let manager = MonitorManager::new();
    match manager.running_pid()? {
        Some(pid) => {
            println!("● Monitor is running");
            println!("  PID: {pid}");
        }
        None => println!("○ Monitor is not running"),
    }

    let state = MonitorStateStore::new(&config.state_file).load().await;
    println!("\nMonitor state ({}):", config.state_file.display());
    println!("{}", serde_json::to_string_pretty(&state)?);

    if detailed {
        let mut shown = config.clone();
        shown.database_url = config.safe_database_url();
        println!("\nConfiguration:");
        println!("{}", serde_json::to_string_pretty(&shown)?);
        println!("\nManager files:");
        println!("  PID file: {}", manager.paths().pid_file.display());
        println!("  Log file: {}", manager.paths().log_file.display());
    }

    Ok(())
}
