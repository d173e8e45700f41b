use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

/// Everything the consolidated interrupt handler must release, registered
/// as it is acquired. Interruption in any phase walks this one cleanup
/// path: report the in-flight critical operation, stop children, remove
/// scratch, release the lock.
#[derive(Default)]
struct CleanupState {
    critical: Option<String>,
    children: Vec<u32>,
    scratch_dirs: Vec<PathBuf>,
    lock_path: Option<PathBuf>,
    child_grace: Duration,
}

static CLEANUP: OnceLock<Mutex<CleanupState>> = OnceLock::new();
static INSTALLED: OnceLock<()> = OnceLock::new();

fn state() -> MutexGuard<'static, CleanupState> {
    CLEANUP
        .get_or_init(|| Mutex::new(CleanupState::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the SIGINT/SIGTERM handler. Later calls only refresh the child
/// grace period.
pub fn install_handler(child_grace: Duration) -> Result<()> {
    state().child_grace = child_grace;

    if INSTALLED.get().is_some() {
        return Ok(());
    }
    ctrlc::set_handler(|| {
        run_cleanup();
        std::process::exit(130);
    })
    .context("failed to install interrupt handler")?;
    let _ = INSTALLED.set(());
    Ok(())
}

/// Mark an operation that is unsafe to interrupt mid-way. The handler
/// reports exactly what was in flight.
pub fn set_critical(label: &str) {
    state().critical = Some(label.to_string());
}

pub fn clear_critical() {
    state().critical = None;
}

pub fn register_child(pid: u32) {
    state().children.push(pid);
}

pub fn unregister_child(pid: u32) {
    state().children.retain(|entry| *entry != pid);
}

pub fn register_scratch(dir: &Path) {
    state().scratch_dirs.push(dir.to_path_buf());
}

pub fn unregister_scratch(dir: &Path) {
    state().scratch_dirs.retain(|entry| entry != dir);
}

pub fn set_lock_path(path: Option<PathBuf>) {
    state().lock_path = path;
}

fn run_cleanup() {
    let snapshot = {
        let mut guard = state();
        std::mem::take(&mut *guard)
    };

    match &snapshot.critical {
        Some(operation) => eprintln!("\ninterrupted during critical operation: {operation}"),
        None => eprintln!("\ninterrupted, cleaning up"),
    }

    if !snapshot.children.is_empty() {
        signal_children(&snapshot.children, "-TERM");
        thread::sleep(snapshot.child_grace);
        signal_children(&snapshot.children, "-KILL");
    }

    for dir in &snapshot.scratch_dirs {
        let _ = fs::remove_dir_all(dir);
    }
    if let Some(lock_path) = &snapshot.lock_path {
        let _ = fs::remove_file(lock_path);
    }
}

fn signal_children(pids: &[u32], signal: &str) {
    for pid in pids {
        let _ = Command::new("kill")
            .arg(signal)
            .arg(pid.to_string())
            .status();
    }
}
