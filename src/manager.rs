use anyhow::{Context, Result};
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Default paths for manager files
pub struct ManagerPaths {
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub config_dir: PathBuf,
}

impl Default for ManagerPaths {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("walguard");

        Self {
            pid_file: config_dir.join("walguard.pid"),
            log_file: config_dir.join("walguard.log"),
            config_dir,
        }
    }
}

/// Manages the monitor daemon process: PID file, log file, signals.
pub struct MonitorManager {
    paths: ManagerPaths,
}

impl Default for MonitorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorManager {
    pub fn new() -> Self {
        let paths = ManagerPaths::default();

        // Ensure config directory exists
        if !paths.config_dir.exists() {
            fs::create_dir_all(&paths.config_dir).ok();
        }

        Self { paths }
    }

    pub fn paths(&self) -> &ManagerPaths {
        &self.paths
    }

    /// Start the monitor as a background daemon
    pub async fn start_daemon(&self) -> Result<()> {
        if let Some(pid) = self.get_running_pid()? {
            return Err(anyhow::anyhow!("Monitor already running with PID: {}", pid));
        }

        info!("Starting WAL monitor daemon...");

        let exe = std::env::current_exe().context("Failed to get current executable path")?;

        let log_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.log_file)
            .context("Failed to open log file")?;

        let cmd = Command::new(exe)
            .arg("start")
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file))
            .spawn()
            .context("Failed to spawn monitor process")?;

        let pid = cmd.id();

        fs::write(&self.paths.pid_file, pid.to_string()).context("Failed to write PID file")?;

        info!("Monitor started with PID: {}", pid);
        info!("Log file: {}", self.paths.log_file.display());

        Ok(())
    }

    /// Stop the running monitor. SIGTERM first so the in-flight tick can
    /// finish and persist state, SIGKILL only after a grace period.
    pub async fn stop(&self) -> Result<()> {
        let pid = self
            .get_running_pid()?
            .ok_or_else(|| anyhow::anyhow!("Monitor is not running"))?;

        info!("Stopping monitor with PID: {}", pid);

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                .context("Failed to send SIGTERM")?;

            // Wait for process to exit (max 30 seconds; a backup may be in
            // flight and must not be killed midway)
            for _ in 0..30 {
                if !self.is_process_running(pid)? {
                    break;
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }

            if self.is_process_running(pid)? {
                warn!("Monitor didn't stop gracefully, forcing kill");
                signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
                    .context("Failed to send SIGKILL")?;
            }
        }

        #[cfg(windows)]
        {
            let output = Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/F"])
                .output()
                .context("Failed to kill process")?;

            if !output.status.success() {
                return Err(anyhow::anyhow!("Failed to stop monitor"));
            }
        }

        fs::remove_file(&self.paths.pid_file).ok();
        info!("Monitor stopped");

        Ok(())
    }

    /// Restart the monitor daemon
    pub async fn restart(&self) -> Result<()> {
        info!("Restarting monitor...");

        if self.get_running_pid()?.is_some() {
            self.stop().await?;
            tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
        }

        self.start_daemon().await?;

        Ok(())
    }

    /// Whether the daemon is running, and under which PID
    pub fn running_pid(&self) -> Result<Option<u32>> {
        self.get_running_pid()
    }

    /// Show monitor logs
    pub async fn show_logs(&self, lines: usize, follow: bool) -> Result<()> {
        if !self.paths.log_file.exists() {
            return Err(anyhow::anyhow!("Log file not found"));
        }

        // Show last N lines
        let content = fs::read_to_string(&self.paths.log_file)?;
        let all_lines: Vec<&str> = content.lines().collect();
        let start = all_lines.len().saturating_sub(lines);
        for line in &all_lines[start..] {
            println!("{line}");
        }

        if follow {
            println!("Following logs (Ctrl+C to stop)...");
            let mut file = fs::File::open(&self.paths.log_file)?;
            let mut offset = file.seek(SeekFrom::End(0))?;

            loop {
                tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
                let len = file.metadata()?.len();
                if len < offset {
                    // Log was rotated or truncated; start over
                    offset = 0;
                }
                if len > offset {
                    file.seek(SeekFrom::Start(offset))?;
                    let mut chunk = String::new();
                    file.read_to_string(&mut chunk)?;
                    offset = len;
                    print!("{chunk}");
                }
            }
        }

        Ok(())
    }

    // Private helper methods

    /// Get PID of the running monitor
    fn get_running_pid(&self) -> Result<Option<u32>> {
        if !self.paths.pid_file.exists() {
            return Ok(None);
        }

        let pid_str = fs::read_to_string(&self.paths.pid_file)?;
        let pid: u32 = pid_str.trim().parse().context("Invalid PID in file")?;

        if self.is_process_running(pid)? {
            Ok(Some(pid))
        } else {
            // Clean up stale PID file
            fs::remove_file(&self.paths.pid_file).ok();
            Ok(None)
        }
    }

    /// Check if a process is running
    fn is_process_running(&self, pid: u32) -> Result<bool> {
        #[cfg(unix)]
        {
            use nix::sys::signal;
            use nix::unistd::Pid;

            // Signal 0: existence check only
            match signal::kill(Pid::from_raw(pid as i32), None) {
                Ok(_) => Ok(true),
                Err(nix::errno::Errno::ESRCH) => Ok(false),
                Err(e) => Err(anyhow::anyhow!("Failed to check process: {}", e)),
            }
        }

        #[cfg(windows)]
        {
            let output = Command::new("tasklist")
                .args(["/FI", &format!("PID eq {}", pid)])
                .output()?;

            Ok(String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
        }
    }
}
