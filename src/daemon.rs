//! Background daemon: runs the escalation sweep on a fixed interval.
//!
//! The daemon is just another trigger for the trigger-agnostic scheduler
//! in `escalation`; it reads the interval and policy from the workspace
//! config and shuts down cleanly on SIGTERM/SIGINT.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::db::Database;
use crate::escalation;

const PID_FILE: &str = "daemon.pid";

fn pid_path(cardflow_dir: &Path) -> std::path::PathBuf {
    cardflow_dir.join(PID_FILE)
}

fn read_pid(cardflow_dir: &Path) -> Option<i32> {
    fs::read_to_string(pid_path(cardflow_dir))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn process_alive(pid: i32) -> bool {
    // Signal 0 probes for existence without delivering anything
    unsafe { libc::kill(pid, 0) == 0 }
}

pub fn start(cardflow_dir: &Path) -> Result<()> {
    if let Some(pid) = read_pid(cardflow_dir) {
        if process_alive(pid) {
            bail!("Daemon already running (pid {})", pid);
        }
        // Stale pid file from a dead process
        let _ = fs::remove_file(pid_path(cardflow_dir));
    }

    let exe = std::env::current_exe().context("Failed to resolve cardflow binary path")?;
    let child = Command::new(exe)
        .args(["daemon", "run", "--dir"])
        .arg(cardflow_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to spawn daemon process")?;

    println!("Started daemon (pid {})", child.id());
    Ok(())
}

pub fn stop(cardflow_dir: &Path) -> Result<()> {
    let pid = match read_pid(cardflow_dir) {
        Some(pid) => pid,
        None => bail!("Daemon not running (no pid file)"),
    };

    if !process_alive(pid) {
        let _ = fs::remove_file(pid_path(cardflow_dir));
        bail!("Daemon not running (stale pid {})", pid);
    }

    if unsafe { libc::kill(pid, SIGTERM) } != 0 {
        bail!("Failed to signal daemon (pid {})", pid);
    }
    println!("Stopped daemon (pid {})", pid);
    Ok(())
}

pub fn status(cardflow_dir: &Path) -> Result<()> {
    match read_pid(cardflow_dir) {
        Some(pid) if process_alive(pid) => println!("Daemon running (pid {})", pid),
        Some(pid) => println!("Daemon not running (stale pid file, pid {})", pid),
        None => println!("Daemon not running."),
    }
    Ok(())
}

/// The daemon loop itself, invoked as `cardflow daemon run --dir <dir>`.
pub fn run_daemon(cardflow_dir: &Path) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;

    fs::write(pid_path(cardflow_dir), std::process::id().to_string())
        .context("Failed to write pid file")?;

    let config = Config::load(cardflow_dir)?;
    let db = Database::open(&cardflow_dir.join("cards.db"))?;
    let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    info!(interval_secs = interval.as_secs(), "escalation daemon started");

    while !shutdown.load(Ordering::Relaxed) {
        match escalation::run_sweep(&db, &config.policy(), "scheduler", Utc::now()) {
            Ok(report) => {
                info!(
                    scanned = report.scanned,
                    escalated = report.changes.len(),
                    failed = report.failures.len(),
                    "sweep complete"
                );
            }
            Err(e) => error!(error = %e, "sweep failed"),
        }

        // Sleep in short slices so shutdown signals land promptly
        let mut remaining = interval;
        while !shutdown.load(Ordering::Relaxed) && remaining > Duration::ZERO {
            let step = remaining.min(Duration::from_secs(1));
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }

    info!("escalation daemon shutting down");
    let _ = fs::remove_file(pid_path(cardflow_dir));
    Ok(())
}
