use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::interrupt;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Uniform result of one bounded subprocess run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    /// Promote a non-zero exit into an error carrying the captured output.
    pub fn require_success(self, label: &str) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        Err(anyhow!(
            "{label}: status={} stdout='{}' stderr='{}'",
            self.code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            self.stdout.trim(),
            self.stderr.trim()
        ))
    }
}

/// Run a command with captured output under a hard deadline. An expired
/// deadline kills the child and reports a timeout instead of hanging.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
    label: &str,
) -> Result<CommandOutcome> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = command
        .spawn()
        .with_context(|| format!("{label}: command failed to start"))?;
    finish_captured(child, timeout, label)
}

/// Like `run_with_timeout`, but feeds `input` to the child's stdin first.
pub fn run_with_input_timeout(
    command: &mut Command,
    input: &[u8],
    timeout: Duration,
    label: &str,
) -> Result<CommandOutcome> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .with_context(|| format!("{label}: command failed to start"))?;

    if let Some(mut stdin) = child.stdin.take() {
        // a child that exits early closes the pipe; its exit status is the
        // interesting failure, not the broken pipe
        let _ = stdin.write_all(input);
    }
    finish_captured(child, timeout, label)
}

/// Run a command that talks to the terminal (inherited stdio) under a hard
/// deadline. Used for the interactive elevation check.
pub fn run_interactive_with_timeout(
    command: &mut Command,
    timeout: Duration,
    label: &str,
) -> Result<CommandOutcome> {
    command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let mut child = command
        .spawn()
        .with_context(|| format!("{label}: command failed to start"))?;
    interrupt::register_child(child.id());
    let waited = wait_with_deadline(&mut child, timeout, label);
    interrupt::unregister_child(child.id());
    let status = waited?;
    Ok(CommandOutcome {
        success: status.0,
        code: status.1,
        stdout: String::new(),
        stderr: String::new(),
    })
}

fn finish_captured(mut child: Child, timeout: Duration, label: &str) -> Result<CommandOutcome> {
    interrupt::register_child(child.id());
    let waited = wait_with_deadline(&mut child, timeout, label);
    interrupt::unregister_child(child.id());
    let (success, code) = waited?;

    let mut stdout = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_string(&mut stdout)
            .with_context(|| format!("{label}: failed to read stdout"))?;
    }
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_string(&mut stderr)
            .with_context(|| format!("{label}: failed to read stderr"))?;
    }

    Ok(CommandOutcome {
        success,
        code,
        stdout,
        stderr,
    })
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    label: &str,
) -> Result<(bool, Option<i32>)> {
    let deadline = Instant::now() + timeout;
    loop {
        let polled = child
            .try_wait()
            .with_context(|| format!("{label}: failed to poll child"))?;
        if let Some(status) = polled {
            return Ok((status.success(), status.code()));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!(
                "{label}: timed out after {}s",
                timeout.as_secs()
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}
