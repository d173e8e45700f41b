use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::run::{run_interactive_with_timeout, run_with_input_timeout, run_with_timeout};

/// One interactive elevation check with a bounded timeout. Success opens
/// the sudo timestamp window every later privileged call relies on; a
/// hang past the deadline is a failure, not a wait.
pub fn ensure_elevated(timeout: Duration) -> Result<()> {
    let outcome = run_interactive_with_timeout(
        Command::new("sudo").arg("-v"),
        timeout,
        "privilege elevation check",
    )?;
    if !outcome.success {
        return Err(anyhow!("privilege elevation was denied"));
    }
    Ok(())
}

/// Write `content` to a root-owned path through the elevation window.
/// The parent directory is created first; nothing is written on failure.
pub fn write_privileged_file(path: &Path, content: &str, timeout: Duration) -> Result<()> {
    if let Some(parent) = path.parent() {
        run_with_timeout(
            Command::new("sudo").args(["-n", "mkdir", "-p", "--"]).arg(parent),
            timeout,
            "create privileged directory",
        )?
        .require_success(&format!(
            "failed to create privileged directory: {}",
            parent.display()
        ))?;
    }

    run_with_input_timeout(
        Command::new("sudo").args(["-n", "tee", "--"]).arg(path),
        content.as_bytes(),
        timeout,
        "write privileged file",
    )?
    .require_success(&format!(
        "failed to write privileged file: {}",
        path.display()
    ))?;
    Ok(())
}

/// Copy a root-owned file preserving its permission bits. Used for the
/// mandatory backup before an override is replaced.
pub fn copy_privileged_file(src: &Path, dst: &Path, timeout: Duration) -> Result<()> {
    run_with_timeout(
        Command::new("sudo").args(["-n", "cp", "-p", "--"]).arg(src).arg(dst),
        timeout,
        "back up privileged file",
    )?
    .require_success(&format!(
        "failed to back up {} to {}",
        src.display(),
        dst.display()
    ))?;
    Ok(())
}

pub fn remove_privileged_file(path: &Path, timeout: Duration) -> Result<()> {
    run_with_timeout(
        Command::new("sudo").args(["-n", "rm", "-f", "--"]).arg(path),
        timeout,
        "remove privileged file",
    )?
    .require_success(&format!(
        "failed to remove privileged file: {}",
        path.display()
    ))?;
    Ok(())
}
