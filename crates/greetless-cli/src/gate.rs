//! The staged testing gate and the critical confirmation gate. The first
//! verifies the new chain on a second virtual console while the original
//! login manager is still the active fallback; the second is the single
//! point where that fallback gets disabled.

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

use greetless_core::Policy;
use greetless_system::{clear_critical, set_critical, ServiceManager, UnitScope};

use crate::prompts;
use crate::render::Renderer;

/// Secondary, low-risk login surface used for staged testing.
pub const GETTY_TEST_UNIT: &str = "getty@tty2.service";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    NotStarted,
    AwaitingSecondaryLogin,
    AwaitingResult,
    Troubleshooting,
    Passed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    SurfaceStarted,
    ManualFallbackAccepted,
    ManualFallbackDeclined,
    OperatorReady,
    ResultPassed,
    ResultFailed,
    MenuRetry,
    /// Viewed the log or edited the launcher; the menu comes back.
    MenuStay,
    MenuAbort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Passed,
    /// Operator explicitly skipped the gate; logged as a deviation.
    Skipped,
    /// Testing never passed; the system stays installed but not cut over.
    Aborted,
}

/// Pure transition function for the testing gate. `failures` counts failed
/// test results seen before this event; reaching `max_failures` aborts
/// instead of opening another troubleshooting round.
pub fn next_phase(
    phase: GatePhase,
    event: GateEvent,
    failures: u32,
    max_failures: u32,
) -> GatePhase {
    match (phase, event) {
        (GatePhase::NotStarted, GateEvent::SurfaceStarted)
        | (GatePhase::NotStarted, GateEvent::ManualFallbackAccepted) => {
            GatePhase::AwaitingSecondaryLogin
        }
        (GatePhase::NotStarted, GateEvent::ManualFallbackDeclined) => GatePhase::Aborted,
        (GatePhase::AwaitingSecondaryLogin, GateEvent::OperatorReady) => GatePhase::AwaitingResult,
        (GatePhase::AwaitingResult, GateEvent::ResultPassed) => GatePhase::Passed,
        (GatePhase::AwaitingResult, GateEvent::ResultFailed) => {
            if failures + 1 >= max_failures {
                GatePhase::Aborted
            } else {
                GatePhase::Troubleshooting
            }
        }
        (GatePhase::Troubleshooting, GateEvent::MenuRetry) => GatePhase::AwaitingSecondaryLogin,
        (GatePhase::Troubleshooting, GateEvent::MenuStay) => GatePhase::Troubleshooting,
        (GatePhase::Troubleshooting, GateEvent::MenuAbort) => GatePhase::Aborted,
        (unchanged, _) => unchanged,
    }
}

/// Drive the staged testing gate interactively until it passes or aborts.
pub fn run_staged_test(
    render: Renderer,
    services: &ServiceManager,
    policy: &Policy,
    launcher_path: &Path,
    launcher_log: &Path,
) -> Result<GateOutcome> {
    render.section("Staged testing");
    render.note("The new login chain is verified on a second console while");
    render.note("the current login manager stays enabled as the fallback.");

    let mut phase = GatePhase::NotStarted;
    let mut failures: u32 = 0;

    loop {
        match phase {
            GatePhase::NotStarted => {
                let started = render.with_spinner("starting the test console", || {
                    services.start(UnitScope::System, GETTY_TEST_UNIT)
                });
                let event = match started {
                    Ok(()) => {
                        render.status(&format!("started {GETTY_TEST_UNIT}"));
                        GateEvent::SurfaceStarted
                    }
                    Err(err) => {
                        render.warn(&format!("could not start the test console: {err:#}"));
                        if prompts::confirm(
                            "Continue with manual test instructions instead?",
                            false,
                        )? {
                            render.warn("proceeding without a managed test console (deviation)");
                            render.note("switch to a spare console yourself (e.g. Ctrl+Alt+F2)");
                            GateEvent::ManualFallbackAccepted
                        } else {
                            GateEvent::ManualFallbackDeclined
                        }
                    }
                };
                phase = next_phase(phase, event, failures, policy.test_max_attempts);
            }
            GatePhase::AwaitingSecondaryLogin => {
                render.note("1. Switch to the test console (Ctrl+Alt+F2).");
                render.note("2. Log in with the autologin account.");
                render.note("3. The locker should appear; unlocking should reach the desktop.");
                render.note("4. Switch back here (Ctrl+Alt+F1 or your current console).");
                prompts::pause("Run the test, then come back")?;
                phase = next_phase(
                    phase,
                    GateEvent::OperatorReady,
                    failures,
                    policy.test_max_attempts,
                );
            }
            GatePhase::AwaitingResult => {
                let passed = prompts::confirm(
                    "Did the locker and compositor come up correctly on the test console?",
                    true,
                )?;
                let event = if passed {
                    GateEvent::ResultPassed
                } else {
                    GateEvent::ResultFailed
                };
                phase = next_phase(phase, event, failures, policy.test_max_attempts);
                if !passed {
                    failures += 1;
                }
            }
            GatePhase::Troubleshooting => {
                let action = prompts::select_keyed(
                    "Troubleshooting",
                    &[
                        ("log".to_string(), "View the session launcher log".to_string()),
                        ("edit".to_string(), "Edit the installed launcher".to_string()),
                        ("retry".to_string(), "Retry the test".to_string()),
                        ("abort".to_string(), "Exit the installer".to_string()),
                    ],
                    "retry",
                )?;
                let event = match action.as_str() {
                    "log" => {
                        show_log_tail(render, launcher_log);
                        GateEvent::MenuStay
                    }
                    "edit" => {
                        edit_launcher(render, launcher_path);
                        GateEvent::MenuStay
                    }
                    "abort" => GateEvent::MenuAbort,
                    _ => GateEvent::MenuRetry,
                };
                phase = next_phase(phase, event, failures, policy.test_max_attempts);
            }
            GatePhase::Passed => {
                render.status("staged testing passed");
                return Ok(GateOutcome::Passed);
            }
            GatePhase::Aborted => {
                if failures >= policy.test_max_attempts {
                    render.warn(&format!(
                        "giving up after {failures} failed test rounds"
                    ));
                }
                return Ok(GateOutcome::Aborted);
            }
        }
    }
}

/// The single irreversible action: disable the fallback login manager.
/// Returns whether it was disabled.
pub fn run_critical_gate(
    render: Renderer,
    services: &ServiceManager,
    display_manager: &str,
) -> Result<bool> {
    render.section("Point of no return");
    render.note(&format!(
        "This disables {display_manager}. After the next boot the console"
    ));
    render.note("autologin chain is the only login path on this machine.");

    let answer = prompts::typed_phrase(&format!(
        "Type 'yes' (exactly) to disable {display_manager}, anything else to keep it"
    ))?;
    if !prompts::critical_phrase_accepted(&answer) {
        render.note(&format!("{display_manager} stays enabled"));
        return Ok(false);
    }

    set_critical("disabling the fallback login manager");
    let disabled = render.with_spinner("disabling the fallback login manager", || {
        services.set_enabled(UnitScope::System, display_manager, false)
    });
    clear_critical();
    disabled?;

    render.status(&format!("{display_manager} disabled"));
    Ok(true)
}

fn show_log_tail(render: Renderer, launcher_log: &Path) {
    match fs::read_to_string(launcher_log) {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(40);
            render.note(&format!("--- {} (last {} lines)", launcher_log.display(), lines.len() - start));
            for line in &lines[start..] {
                println!("  {line}");
            }
        }
        Err(_) => render.note(&format!(
            "no launcher log at {} yet; the chain may not have started",
            launcher_log.display()
        )),
    }
}

fn edit_launcher(render: Renderer, launcher_path: &Path) {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let result = Command::new(&editor)
        .arg(launcher_path)
        .status()
        .with_context(|| format!("failed to launch editor: {editor}"));
    match result {
        Ok(status) if status.success() => {}
        Ok(status) => render.warn(&format!("editor exited with {status}")),
        Err(err) => render.warn(&format!("{err:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::{next_phase, GateEvent, GatePhase};

    const MAX: u32 = 5;

    #[test]
    fn happy_path_reaches_passed() {
        let mut phase = GatePhase::NotStarted;
        phase = next_phase(phase, GateEvent::SurfaceStarted, 0, MAX);
        assert_eq!(phase, GatePhase::AwaitingSecondaryLogin);
        phase = next_phase(phase, GateEvent::OperatorReady, 0, MAX);
        assert_eq!(phase, GatePhase::AwaitingResult);
        phase = next_phase(phase, GateEvent::ResultPassed, 0, MAX);
        assert_eq!(phase, GatePhase::Passed);
    }

    #[test]
    fn four_failures_then_operator_exit_aborts() {
        let mut phase = GatePhase::NotStarted;
        phase = next_phase(phase, GateEvent::SurfaceStarted, 0, MAX);

        for failures_before in 0..4u32 {
            phase = next_phase(phase, GateEvent::OperatorReady, failures_before, MAX);
            assert_eq!(phase, GatePhase::AwaitingResult);
            phase = next_phase(phase, GateEvent::ResultFailed, failures_before, MAX);
            assert_eq!(phase, GatePhase::Troubleshooting, "round {failures_before}");
            if failures_before < 3 {
                phase = next_phase(phase, GateEvent::MenuRetry, failures_before + 1, MAX);
                assert_eq!(phase, GatePhase::AwaitingSecondaryLogin);
            }
        }

        // on the troubleshooting prompt after the fourth failure the
        // operator exits the installer
        phase = next_phase(phase, GateEvent::MenuAbort, 4, MAX);
        assert_eq!(phase, GatePhase::Aborted);
    }

    #[test]
    fn failure_at_the_limit_aborts_instead_of_looping() {
        let phase = next_phase(GatePhase::AwaitingResult, GateEvent::ResultFailed, MAX - 1, MAX);
        assert_eq!(phase, GatePhase::Aborted);
    }

    #[test]
    fn menu_actions_stay_in_troubleshooting_until_retry_or_abort() {
        let stay = next_phase(GatePhase::Troubleshooting, GateEvent::MenuStay, 1, MAX);
        assert_eq!(stay, GatePhase::Troubleshooting);
        let retry = next_phase(GatePhase::Troubleshooting, GateEvent::MenuRetry, 1, MAX);
        assert_eq!(retry, GatePhase::AwaitingSecondaryLogin);
        let abort = next_phase(GatePhase::Troubleshooting, GateEvent::MenuAbort, 1, MAX);
        assert_eq!(abort, GatePhase::Aborted);
    }

    #[test]
    fn declining_the_manual_fallback_aborts_the_gate() {
        let phase = next_phase(GatePhase::NotStarted, GateEvent::ManualFallbackDeclined, 0, MAX);
        assert_eq!(phase, GatePhase::Aborted);
    }
}
