use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Result};

use greetless_core::UnitActivity;

use crate::run::{run_with_timeout, CommandOutcome};

/// Whether a unit lives in the system manager or the user manager. System
/// mutations run through the elevation window; user units never need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitScope {
    System,
    User,
}

/// Thin client for the service manager. Four call categories (reload,
/// enable/disable, start, query), each bounded by one timeout so an
/// unresponsive manager is a clear failure, never a hang.
#[derive(Debug, Clone, Copy)]
pub struct ServiceManager {
    timeout: Duration,
}

impl ServiceManager {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn unit_activity(&self, scope: UnitScope, unit: &str) -> Result<UnitActivity> {
        validate_unit_name(unit)?;
        let outcome = self.systemctl(scope, false, &["is-active", "--", unit], "query unit state")?;
        match outcome.stdout.trim() {
            "active" | "activating" | "reloading" => Ok(UnitActivity::Active),
            "failed" => Ok(UnitActivity::Failed),
            _ => {
                // is-active prints "inactive" for unknown units too; `cat`
                // tells a present-but-stopped unit from a missing one.
                let present =
                    self.systemctl(scope, false, &["cat", "--", unit], "probe unit presence")?;
                if present.success {
                    Ok(UnitActivity::Inactive)
                } else {
                    Ok(UnitActivity::NotFound)
                }
            }
        }
    }

    pub fn is_enabled(&self, scope: UnitScope, unit: &str) -> Result<bool> {
        validate_unit_name(unit)?;
        let outcome =
            self.systemctl(scope, false, &["is-enabled", "--", unit], "query unit enablement")?;
        Ok(outcome.stdout.trim() == "enabled")
    }

    pub fn start(&self, scope: UnitScope, unit: &str) -> Result<()> {
        validate_unit_name(unit)?;
        self.systemctl(scope, scope == UnitScope::System, &["start", "--", unit], "start unit")?
            .require_success(&format!("failed to start {unit}"))?;
        Ok(())
    }

    pub fn set_enabled(&self, scope: UnitScope, unit: &str, enabled: bool) -> Result<()> {
        validate_unit_name(unit)?;
        let verb = if enabled { "enable" } else { "disable" };
        self.systemctl(scope, scope == UnitScope::System, &[verb, "--", unit], "change unit enablement")?
            .require_success(&format!("failed to {verb} {unit}"))?;
        Ok(())
    }

    pub fn daemon_reload(&self, scope: UnitScope) -> Result<()> {
        self.systemctl(scope, scope == UnitScope::System, &["daemon-reload"], "reload service manager")?
            .require_success("failed to reload service manager configuration")?;
        Ok(())
    }

    /// Best-effort check that a unit still parses after an override write.
    pub fn verify_unit(&self, unit: &str) -> Result<bool> {
        validate_unit_name(unit)?;
        let outcome = run_with_timeout(
            Command::new("systemd-analyze").args(["verify", "--", unit]),
            self.timeout,
            "verify unit",
        )?;
        Ok(outcome.success)
    }

    fn systemctl(
        &self,
        scope: UnitScope,
        privileged: bool,
        args: &[&str],
        label: &str,
    ) -> Result<CommandOutcome> {
        let mut command = if privileged {
            let mut command = Command::new("sudo");
            command.args(["-n", "systemctl"]);
            command
        } else {
            Command::new("systemctl")
        };
        if scope == UnitScope::User {
            command.arg("--user");
        }
        command.args(args);
        run_with_timeout(&mut command, self.timeout, label)
    }
}

fn validate_unit_name(unit: &str) -> Result<()> {
    let valid = !unit.is_empty()
        && unit
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '\\'));
    if valid {
        Ok(())
    } else {
        Err(anyhow!("invalid unit name: {unit}"))
    }
}
