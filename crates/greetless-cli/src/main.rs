mod flows;
mod gate;
mod prompts;
mod render;

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use greetless_core::{load_policy, normalize, Policy};
use greetless_installer::{default_home, TargetLayout};
use greetless_system::{install_handler, set_lock_path, InstanceLock, ServiceManager};

use flows::{Ctx, FlowOutcome, Roots};
use render::Renderer;

/// Migrate the boot path from a graphical login manager to console
/// autologin, then the compositor with the screen locker as the login
/// surface. Runs as an interactive installer by default.
#[derive(Parser, Debug)]
#[command(name = "greetless", version, about, long_about = None)]
struct Cli {
    /// Preview detection and the planned changes, then exit without
    /// touching anything
    #[arg(long)]
    dry_run: bool,

    /// Refresh an existing installation (delegates to install when none
    /// is found)
    #[arg(long, conflicts_with = "dry_run")]
    update: bool,

    /// Reverse the installation
    #[arg(long, conflicts_with_all = ["dry_run", "update"])]
    uninstall: bool,

    /// Skip the staged testing gate (discouraged; asks for an extra
    /// explicit confirmation)
    #[arg(long)]
    skip_test: bool,

    /// Force plain, unstyled output
    #[arg(long)]
    plain: bool,

    /// TOML policy file tuning thresholds and timeouts
    #[arg(long, value_name = "FILE")]
    policy: Option<String>,

    /// Print a completion script for the given shell and exit
    #[arg(long, value_name = "SHELL", value_enum)]
    completions: Option<Shell>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "greetless", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(FlowOutcome::Completed) | Ok(FlowOutcome::Cancelled) => ExitCode::SUCCESS,
        Ok(FlowOutcome::Partial) => ExitCode::from(3),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<FlowOutcome> {
    let render = Renderer::new(cli.plain);
    let layout = layout_from_env()?;
    let policy = match &cli.policy {
        Some(raw) => load_policy(&normalize(raw, layout.home()))?,
        None => Policy::default(),
    };

    install_handler(Duration::from_secs(policy.child_grace_secs))?;

    let roots = Roots::from_env();

    let lock = InstanceLock::acquire(&roots.lock_dir)?;
    set_lock_path(Some(lock.path().to_path_buf()));

    let ctx = Ctx {
        layout,
        roots,
        services: ServiceManager::new(Duration::from_secs(policy.service_timeout_secs)),
        policy,
        render,
        skip_test: cli.skip_test,
    };

    let outcome = if cli.dry_run {
        flows::run_dry_run(&ctx)
    } else if cli.update {
        flows::run_update(&ctx)
    } else if cli.uninstall {
        flows::run_uninstall(&ctx)
    } else {
        flows::run_install(&ctx)
    };

    set_lock_path(None);
    drop(lock);
    outcome
}

/// Resolve the target layout, honoring the environment overrides the
/// integration tests use to point at fabricated trees. Every supplied
/// path goes through the normalizer, so `~/x` and `file://` spellings
/// land on the same canonical absolute form.
fn layout_from_env() -> Result<TargetLayout> {
    let home = match env::var("GREETLESS_HOME") {
        Ok(raw) => {
            let base = default_home().unwrap_or_else(|_| PathBuf::from("/"));
            normalize(&raw, &base)
        }
        Err(_) => default_home()?,
    };
    let state_dir = env_path("GREETLESS_STATE_DIR", &home)
        .unwrap_or_else(|| home.join(".local").join("state").join("greetless"));
    let config_root = env_path("GREETLESS_CONFIG_ROOT", &home)
        .unwrap_or_else(|| home.join(".config").join("hypr"));
    let payload_dir = env_path("GREETLESS_PAYLOAD_DIR", &home)
        .unwrap_or_else(|| PathBuf::from("/usr/share/greetless/payload"));

    Ok(TargetLayout::new(home, state_dir, config_root, payload_dir))
}

fn env_path(key: &str, home: &Path) -> Option<PathBuf> {
    env::var(key).ok().map(|raw| normalize(&raw, home))
}
