//! The install / update / uninstall / dry-run orchestrators. Each one is a
//! phase sequence over the same explicit state: detect, confirm, mutate,
//! gate, persist. Interruption or an operator "no" at any point leaves one
//! of a small set of well-defined partial states, never a corrupt one.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Result};

use greetless_core::{
    account_exists, display_outputs, enumerate_gpus, files_with_autostart, load_record,
    scan_config_files, selectable_vendors, suggest_session_method, unknown_drivers,
    vendors_with_duplicates, write_record, ConfirmedState, DetectedState, DisplayChoice,
    GpuChoice, InstallRecord, Policy, SessionMethod, UnitActivity,
};
use greetless_installer::{
    append_line_atomic, autologin_dropin, dropin_names_account, enable_vendor_block,
    insert_display_override, publish_content, read_payload, remove_user_artifacts, session_unit,
    InstallOutcome, TargetLayout, BACKUP_MARKER,
};
use greetless_system::{
    clear_critical, copy_privileged_file, ensure_elevated, register_scratch,
    remove_privileged_file, run_with_timeout, set_critical, write_privileged_file, ServiceManager,
    UnitScope,
};

use crate::gate::{self, GateOutcome};
use crate::prompts;
use crate::render::Renderer;

/// Screen-locker binary the startup directive must launch.
pub const LOCKER_BIN: &str = "hyprlock";

const AUTOSTART_LINE: &str = "exec-once = hyprlock";

/// Fallback login manager candidates, probed in this order.
const DISPLAY_MANAGER_CANDIDATES: &[&str] = &[
    "sddm.service",
    "gdm.service",
    "gdm3.service",
    "lightdm.service",
    "greetd.service",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    Completed,
    /// Operator declined a confirmation; clean early exit, nothing broken.
    Cancelled,
    /// Installed but not cut over, by the operator's own choice.
    Partial,
}

/// Detection roots, overridable through the environment so tests can point
/// the whole engine at a fabricated tree.
#[derive(Debug, Clone)]
pub struct Roots {
    pub drm_root: PathBuf,
    pub dev_dri: PathBuf,
    pub passwd: PathBuf,
    pub lock_dir: PathBuf,
    pub default_identity: Option<String>,
}

impl Roots {
    pub fn from_env() -> Self {
        Self {
            drm_root: path_from_env("GREETLESS_DRM_ROOT", "/sys/class/drm"),
            dev_dri: path_from_env("GREETLESS_DEV_DRI", "/dev/dri"),
            passwd: path_from_env("GREETLESS_PASSWD", "/etc/passwd"),
            lock_dir: env::var_os("GREETLESS_LOCK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(greetless_system::default_lock_dir),
            default_identity: env::var("GREETLESS_USER")
                .ok()
                .or_else(|| env::var("USER").ok()),
        }
    }
}

fn path_from_env(key: &str, default: &str) -> PathBuf {
    env::var_os(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

pub struct Ctx {
    pub layout: TargetLayout,
    pub roots: Roots,
    pub policy: Policy,
    pub services: ServiceManager,
    pub render: Renderer,
    pub skip_test: bool,
}

impl Ctx {
    fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.policy.service_timeout_secs)
    }

    fn elevation_timeout(&self) -> Duration {
        Duration::from_secs(self.policy.elevation_timeout_secs)
    }
}

// ---------------------------------------------------------------- detection

/// Assemble the detected-state snapshot. Read-only: nothing here mutates
/// persistent state. Service-manager probes degrade to "not found" with a
/// warning instead of blocking detection.
pub fn detect(ctx: &Ctx) -> Result<DetectedState> {
    let gpus = enumerate_gpus(&ctx.roots.drm_root)?;
    let outputs = display_outputs(&gpus, &ctx.roots.dev_dri);
    let config_files = scan_config_files(ctx.layout.config_root())?;
    let autostart_files = files_with_autostart(&config_files, LOCKER_BIN)?;

    let session_activity = match ctx
        .services
        .unit_activity(UnitScope::User, ctx.layout.session_unit_name())
    {
        Ok(activity) => activity,
        Err(err) => {
            ctx.render.warn(&format!(
                "could not probe the session unit ({err:#}); assuming it is absent"
            ));
            UnitActivity::NotFound
        }
    };

    let prior_record = match load_record(&ctx.layout.record_path())? {
        Some((record, warnings)) => {
            for warning in warnings {
                ctx.render.warn(&warning);
            }
            Some(record)
        }
        None => None,
    };

    Ok(DetectedState {
        identity: ctx.roots.default_identity.clone().unwrap_or_default(),
        gpus,
        display_outputs: outputs,
        config_files,
        autostart_files,
        suggested_method: suggest_session_method(session_activity),
        display_manager: detect_display_manager(ctx),
        prior_record,
    })
}

fn detect_display_manager(ctx: &Ctx) -> Option<String> {
    for unit in DISPLAY_MANAGER_CANDIDATES {
        match ctx.services.unit_activity(UnitScope::System, unit) {
            Ok(UnitActivity::NotFound) | Err(_) => continue,
            Ok(_) => return Some((*unit).to_string()),
        }
    }
    None
}

fn render_detected(ctx: &Ctx, detected: &DetectedState) {
    let render = ctx.render;

    if detected.identity.is_empty() {
        render.note("autologin account: (none detected)");
    } else {
        let known = account_exists(&ctx.roots.passwd, &detected.identity).unwrap_or(false);
        let validity = if known { "exists" } else { "NOT FOUND in passwd" };
        render.note(&format!(
            "autologin account: {} ({validity})",
            detected.identity
        ));
    }

    if detected.gpus.is_empty() {
        render.note("GPUs: none found");
    }
    for gpu in &detected.gpus {
        let classified = match gpu.vendor {
            Some(vendor) => vendor.name(),
            None => "unrecognized",
        };
        render.note(&format!("GPU {}: {} ({classified})", gpu.node, gpu.driver));
    }
    for gpu in unknown_drivers(&detected.gpus) {
        render.warn(&format!(
            "driver '{}' on {} is not in the vendor table; it will not be selectable",
            gpu.driver, gpu.node
        ));
    }
    if !vendors_with_duplicates(&detected.gpus).is_empty() {
        render.warn("multiple devices share a vendor; display selection will be required");
    }

    if detected.display_outputs.is_empty() {
        render.note("display outputs: none");
    } else {
        render.note(&format!(
            "display outputs: {}",
            detected.display_outputs.join(", ")
        ));
    }

    render.note(&format!(
        "compositor config files: {} under {}",
        detected.config_files.len(),
        ctx.layout.config_root().display()
    ));
    for file in &detected.autostart_files {
        render.note(&format!(
            "locker startup directive already present: {}",
            file.display()
        ));
    }

    render.note(&format!(
        "suggested session method: {}",
        detected.suggested_method.describe()
    ));
    match &detected.display_manager {
        Some(unit) => render.note(&format!("fallback login manager: {unit}")),
        None => render.note("fallback login manager: none detected"),
    }
    if let Some(record) = &detected.prior_record {
        render.note(&format!(
            "prior install record: method={} gpu={} display={}",
            record
                .session_method
                .map(|method| method.tag())
                .unwrap_or("?"),
            record.gpu_type.map(|gpu| gpu.tag()).unwrap_or("?"),
            record
                .display_path
                .as_ref()
                .map(|display| display.tag())
                .unwrap_or("?"),
        ));
    }
}

// ------------------------------------------------------------- confirmation

fn confirm_state(ctx: &Ctx, detected: &DetectedState) -> Result<Option<ConfirmedState>> {
    ctx.render.section("Confirm");

    let identity = confirm_identity(ctx, &detected.identity)?;
    let gpu = confirm_gpu(ctx, detected)?;
    let display = confirm_display(ctx, detected)?;
    let session_method = confirm_method(detected)?;
    let autostart_target = confirm_autostart(ctx, detected)?;

    let confirmed = ConfirmedState {
        identity,
        session_method,
        gpu,
        display,
        display_manager: detected.display_manager.clone(),
        autostart_target,
    };

    if present_summary(ctx, &confirmed)? {
        Ok(Some(confirmed))
    } else {
        Ok(None)
    }
}

fn confirm_identity(ctx: &Ctx, detected: &str) -> Result<String> {
    let mut candidate = detected.to_string();
    loop {
        if !candidate.is_empty() && account_exists(&ctx.roots.passwd, &candidate)? {
            if prompts::confirm(
                &format!("Use account '{candidate}' for console autologin?"),
                true,
            )? {
                return Ok(candidate);
            }
        } else if !candidate.is_empty() {
            ctx.render
                .warn(&format!("account '{candidate}' does not exist"));
        }
        candidate = prompts::input_with_default("Autologin account", &candidate)?;
    }
}

fn confirm_gpu(ctx: &Ctx, detected: &DetectedState) -> Result<GpuChoice> {
    let vendors = selectable_vendors(&detected.gpus);
    if vendors.is_empty() {
        ctx.render
            .note("no recognized GPU vendor; driver directives stay disabled (auto)");
        return Ok(GpuChoice::Auto);
    }

    let mut entries: Vec<(String, String)> = vendors
        .iter()
        .map(|vendor| {
            let devices: Vec<&str> = detected
                .gpus
                .iter()
                .filter(|gpu| gpu.vendor == Some(*vendor))
                .map(|gpu| gpu.node.as_str())
                .collect();
            (
                vendor.tag().to_string(),
                format!("{} ({})", vendor.name(), devices.join(", ")),
            )
        })
        .collect();
    entries.push((
        "auto".to_string(),
        "auto (leave every driver directive disabled)".to_string(),
    ));

    let default_key = detected
        .prior_record
        .as_ref()
        .and_then(|record| record.gpu_type)
        .map(|gpu| gpu.tag().to_string())
        .filter(|tag| entries.iter().any(|(key, _)| key == tag))
        .unwrap_or_else(|| vendors[0].tag().to_string());

    let key = prompts::select_keyed("GPU driver directives to enable", &entries, &default_key)?;
    Ok(GpuChoice::from_tag(&key).unwrap_or(GpuChoice::Auto))
}

fn confirm_display(ctx: &Ctx, detected: &DetectedState) -> Result<DisplayChoice> {
    if detected.display_outputs.is_empty() {
        ctx.render
            .note("no display outputs enumerated; the session will pick one itself");
        return Ok(DisplayChoice::Auto);
    }

    let selection_required = !vendors_with_duplicates(&detected.gpus).is_empty();
    if !selection_required
        && prompts::confirm("Let the session pick the display device automatically?", true)?
    {
        return Ok(DisplayChoice::Auto);
    }
    if selection_required {
        ctx.render
            .note("duplicate GPU vendors make an explicit display device mandatory");
    }

    let entries: Vec<(String, String)> = detected
        .display_outputs
        .iter()
        .map(|path| (path.clone(), path.clone()))
        .collect();
    let default_key = detected
        .prior_record
        .as_ref()
        .and_then(|record| record.display_path.as_ref())
        .and_then(|display| match display {
            DisplayChoice::Device(path) => Some(path.clone()),
            DisplayChoice::Auto => None,
        })
        .filter(|path| detected.display_outputs.contains(path))
        .unwrap_or_else(|| detected.display_outputs[0].clone());

    let key = prompts::select_keyed("Display device for the session", &entries, &default_key)?;
    Ok(DisplayChoice::Device(key))
}

fn confirm_method(detected: &DetectedState) -> Result<SessionMethod> {
    let default = detected
        .prior_record
        .as_ref()
        .and_then(|record| record.session_method)
        .unwrap_or(detected.suggested_method);

    let entries = vec![
        (
            SessionMethod::Direct.tag().to_string(),
            SessionMethod::Direct.describe().to_string(),
        ),
        (
            SessionMethod::Managed.tag().to_string(),
            SessionMethod::Managed.describe().to_string(),
        ),
    ];
    let key = prompts::select_keyed("Session method", &entries, default.tag())?;
    Ok(SessionMethod::from_tag(&key).unwrap_or(default))
}

fn confirm_autostart(ctx: &Ctx, detected: &DetectedState) -> Result<Option<PathBuf>> {
    if !detected.autostart_files.is_empty() {
        ctx.render.note(
            "the locker startup directive is already present; it will not be added twice",
        );
        return Ok(None);
    }
    if detected.config_files.is_empty() {
        ctx.render.warn(&format!(
            "no compositor config files under {}; add '{AUTOSTART_LINE}' yourself",
            ctx.layout.config_root().display()
        ));
        return Ok(None);
    }

    if !prompts::confirm(
        &format!("Append '{AUTOSTART_LINE}' to the compositor configuration?"),
        true,
    )? {
        return Ok(None);
    }

    if detected.config_files.len() == 1 {
        return Ok(Some(detected.config_files[0].clone()));
    }
    let entries: Vec<(String, String)> = detected
        .config_files
        .iter()
        .map(|path| {
            (
                path.display().to_string(),
                path.display().to_string(),
            )
        })
        .collect();
    let key = prompts::select_keyed(
        "Config file to receive the directive",
        &entries,
        &entries[0].0,
    )?;
    Ok(Some(PathBuf::from(key)))
}

fn present_summary(ctx: &Ctx, confirmed: &ConfirmedState) -> Result<bool> {
    let render = ctx.render;
    render.section("Summary");
    render.note(&format!("autologin account:  {}", confirmed.identity));
    render.note(&format!("session method:     {}", confirmed.session_method.tag()));
    render.note(&format!("GPU directives:     {}", confirmed.gpu.tag()));
    render.note(&format!("display device:     {}", confirmed.display.tag()));
    match &confirmed.display_manager {
        Some(unit) => render.note(&format!("fallback to replace: {unit}")),
        None => render.note("fallback to replace: none detected"),
    }
    match &confirmed.autostart_target {
        Some(path) => render.note(&format!("startup directive:   {}", path.display())),
        None => render.note("startup directive:   unchanged"),
    }
    render.note(&format!(
        "launcher:            {}",
        ctx.layout.launcher_path().display()
    ));
    render.note(&format!(
        "login hook:          {}",
        ctx.layout.login_hook_path().display()
    ));

    prompts::confirm("Proceed with these settings?", true)
}

// ----------------------------------------------------------------- mutation

fn install_artifacts(ctx: &Ctx, confirmed: &ConfirmedState) -> Result<()> {
    ctx.layout.ensure_base_dirs()?;
    register_scratch(&ctx.layout.scratch_dir());

    // read both payloads up front: environment failures surface before the
    // first byte is mutated
    let mut launcher = read_payload(&ctx.layout.payload_launcher_path())?;
    let hook = read_payload(&ctx.layout.payload_login_hook_path())?;

    if let GpuChoice::Vendor(vendor) = confirmed.gpu {
        launcher = enable_vendor_block(&launcher, vendor.tag())?;
    }
    if let DisplayChoice::Device(device) = &confirmed.display {
        launcher = insert_display_override(&launcher, device)?;
    }

    let scratch = ctx.layout.scratch_dir();
    let outcome = publish_content(
        &scratch,
        &ctx.layout.launcher_path(),
        launcher.as_bytes(),
        0o755,
    )?;
    report_outcome(ctx, "launcher", &ctx.layout.launcher_path(), &outcome);

    let outcome = publish_content(
        &scratch,
        &ctx.layout.login_hook_path(),
        hook.as_bytes(),
        0o644,
    )?;
    report_outcome(ctx, "login hook", &ctx.layout.login_hook_path(), &outcome);

    if confirmed.session_method == SessionMethod::Managed {
        let unit_content = session_unit(&ctx.layout.launcher_path());
        let unit_path = ctx.layout.session_unit_path();
        let outcome = publish_content(&scratch, &unit_path, unit_content.as_bytes(), 0o644)?;
        report_outcome(ctx, "session unit", &unit_path, &outcome);

        ctx.render.with_spinner("reloading user service manager", || {
            ctx.services.daemon_reload(UnitScope::User)
        })?;
        ctx.services
            .set_enabled(UnitScope::User, ctx.layout.session_unit_name(), true)?;
        ctx.render
            .status(&format!("enabled {}", ctx.layout.session_unit_name()));
    }

    if let Some(target) = &confirmed.autostart_target {
        let outcome = append_line_atomic(&scratch, target, AUTOSTART_LINE)?;
        report_outcome(ctx, "startup directive", target, &outcome);
    }

    Ok(())
}

fn report_outcome(ctx: &Ctx, what: &str, path: &Path, outcome: &InstallOutcome) {
    match outcome {
        InstallOutcome::Installed => {
            ctx.render.status(&format!("installed {what}: {}", path.display()));
        }
        InstallOutcome::AlreadyCurrent => {
            ctx.render
                .status(&format!("{what} already current: {}", path.display()));
        }
        InstallOutcome::Replaced {
            backup: Some(backup),
        } => {
            ctx.render.warn(&format!(
                "existing {what} differed; previous version kept at {}",
                backup.display()
            ));
            ctx.render
                .status(&format!("replaced {what}: {}", path.display()));
        }
        InstallOutcome::Replaced { backup: None } => {
            ctx.render
                .status(&format!("replaced {what}: {}", path.display()));
        }
    }
}

// ------------------------------------------------------- privileged phase

/// Write the autologin override through the elevation window. Returns
/// whether it was configured; declining is a clean skip with manual steps.
fn configure_autologin(ctx: &Ctx, confirmed: &ConfirmedState) -> Result<bool> {
    let render = ctx.render;
    let dropin_path = ctx.layout.autologin_dropin_path();

    render.section("Console autologin (privileged)");
    render.note(&format!("override to write: {}", dropin_path.display()));

    if !prompts::confirm("Write the autologin override now (requires sudo)?", false)? {
        print_manual_autologin_steps(ctx, &confirmed.identity);
        return Ok(false);
    }

    ensure_elevated(ctx.elevation_timeout())?;

    // the account is re-validated at the moment of use, not trusted from
    // the snapshot taken minutes earlier
    if !account_exists(&ctx.roots.passwd, &confirmed.identity)? {
        return Err(anyhow!(
            "account '{}' vanished since detection; aborting the privileged phase",
            confirmed.identity
        ));
    }
    let dropin = autologin_dropin(&confirmed.identity)?;

    if dropin_path.exists() {
        let backup_path = privileged_backup_path(&dropin_path)?;
        copy_privileged_file(&dropin_path, &backup_path, ctx.service_timeout())?;
        render.status(&format!(
            "backed up existing override to {}",
            backup_path.display()
        ));
    }

    set_critical("writing the autologin override");
    let written = write_privileged_file(&dropin_path, &dropin, ctx.service_timeout());
    clear_critical();
    written?;
    render.status(&format!("wrote {}", dropin_path.display()));

    render.with_spinner("reloading service manager", || {
        ctx.services.daemon_reload(UnitScope::System)
    })?;

    match ctx.services.verify_unit("getty@tty1.service") {
        Ok(true) => render.status("getty@tty1.service still parses"),
        Ok(false) => render.warn("unit verification reported issues for getty@tty1.service"),
        Err(err) => render.warn(&format!("could not verify getty@tty1.service: {err:#}")),
    }

    Ok(true)
}

fn privileged_backup_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("override path has no file name: {}", path.display()))?;
    let timestamp = greetless_installer::current_unix_timestamp()?;
    Ok(path.with_file_name(format!("{file_name}{BACKUP_MARKER}{timestamp}")))
}

fn print_manual_autologin_steps(ctx: &Ctx, identity: &str) {
    let render = ctx.render;
    render.note("to configure console autologin by hand:");
    render.note(&format!(
        "  sudo mkdir -p {}",
        ctx.layout
            .autologin_dropin_path()
            .parent()
            .unwrap_or_else(|| Path::new("/etc/systemd/system"))
            .display()
    ));
    render.note(&format!(
        "  sudoedit {}",
        ctx.layout.autologin_dropin_path().display()
    ));
    render.note("with the content:");
    render.note("    [Service]");
    render.note("    ExecStart=");
    render.note(&format!(
        "    ExecStart=-/sbin/agetty --autologin {identity} --noclear %I $TERM"
    ));
    render.note("  sudo systemctl daemon-reload");
}

// -------------------------------------------------------------------- gates

fn staged_gate(ctx: &Ctx) -> Result<GateOutcome> {
    if ctx.skip_test {
        if !ctx.policy.allow_skip_testing {
            ctx.render
                .warn("policy forbids skipping the staged testing gate");
        } else if prompts::confirm(
            "Really skip staged testing? The new chain will be unverified.",
            false,
        )? {
            ctx.render
                .warn("staged testing skipped at the operator's request (deviation)");
            return Ok(GateOutcome::Skipped);
        }
    }

    gate::run_staged_test(
        ctx.render,
        &ctx.services,
        &ctx.policy,
        &ctx.layout.launcher_path(),
        &ctx.layout.launcher_log_path(),
    )
}

fn offer_reboot(ctx: &Ctx) -> Result<()> {
    if prompts::confirm("Reboot now?", false)? {
        let requested = run_with_timeout(
            Command::new("systemctl").arg("reboot"),
            ctx.service_timeout(),
            "reboot request",
        )
        .and_then(|outcome| outcome.require_success("reboot request failed"));
        if requested.is_err() {
            ctx.render
                .warn("could not reboot automatically; run: systemctl reboot");
        }
    } else {
        ctx.render
            .note("the new boot chain takes effect on the next boot");
    }
    Ok(())
}

// -------------------------------------------------------------------- modes

pub fn run_install(ctx: &Ctx) -> Result<FlowOutcome> {
    preflight(&["systemctl"])?;
    read_payload(&ctx.layout.payload_launcher_path())?;
    read_payload(&ctx.layout.payload_login_hook_path())?;

    ctx.render.section("Detection");
    let detected = detect(ctx)?;
    render_detected(ctx, &detected);

    let Some(confirmed) = confirm_state(ctx, &detected)? else {
        ctx.render.note("nothing was changed");
        return Ok(FlowOutcome::Cancelled);
    };

    ctx.render.section("Installing artifacts");
    install_artifacts(ctx, &confirmed)?;

    write_record(&ctx.layout.record_path(), &confirmed.to_record())?;
    ctx.render.status(&format!(
        "recorded choices: {}",
        ctx.layout.record_path().display()
    ));

    let autologin_configured = match configure_autologin(ctx, &confirmed) {
        Ok(configured) => configured,
        Err(err) => {
            // user-space artifacts stay installed; only the privileged
            // phase is aborted
            ctx.render.warn(&format!("privileged phase failed: {err:#}"));
            print_manual_autologin_steps(ctx, &confirmed.identity);
            return Err(err);
        }
    };

    match staged_gate(ctx)? {
        GateOutcome::Passed | GateOutcome::Skipped => {}
        GateOutcome::Aborted => {
            ctx.render.warn(
                "installed but not cut over; the fallback login manager stays enabled",
            );
            return Ok(FlowOutcome::Partial);
        }
    }

    match &confirmed.display_manager {
        Some(display_manager) if autologin_configured => {
            if gate::run_critical_gate(ctx.render, &ctx.services, display_manager)? {
                offer_reboot(ctx)?;
            }
        }
        Some(display_manager) => {
            ctx.render.note(&format!(
                "autologin was not configured; {display_manager} stays enabled"
            ));
        }
        None => {
            ctx.render
                .note("no fallback login manager was detected; nothing to disable");
        }
    }

    Ok(FlowOutcome::Completed)
}

pub fn run_dry_run(ctx: &Ctx) -> Result<FlowOutcome> {
    ctx.render.section("Detection (dry run)");
    let detected = detect(ctx)?;
    render_detected(ctx, &detected);

    ctx.render.section("Planned changes");
    for (what, path) in [
        ("launcher", ctx.layout.launcher_path()),
        ("login hook", ctx.layout.login_hook_path()),
        ("install record", ctx.layout.record_path()),
        ("autologin override", ctx.layout.autologin_dropin_path()),
    ] {
        ctx.render.note(&format!("{what} -> {}", path.display()));
    }
    if detected.suggested_method == SessionMethod::Managed {
        ctx.render.note(&format!(
            "session unit -> {}",
            ctx.layout.session_unit_path().display()
        ));
    }
    if detected.autostart_files.is_empty() {
        ctx.render
            .note(&format!("startup directive -> '{AUTOSTART_LINE}'"));
    }

    for payload in [
        ctx.layout.payload_launcher_path(),
        ctx.layout.payload_login_hook_path(),
    ] {
        if payload.exists() {
            ctx.render.note(&format!("payload present: {}", payload.display()));
        } else {
            ctx.render
                .warn(&format!("payload MISSING: {}", payload.display()));
        }
    }

    ctx.render.note("dry run: no changes were made");
    Ok(FlowOutcome::Completed)
}

pub fn run_update(ctx: &Ctx) -> Result<FlowOutcome> {
    preflight(&["systemctl"])?;

    let previously_installed = ctx.layout.launcher_path().exists()
        || ctx.layout.login_hook_path().exists()
        || load_record(&ctx.layout.record_path())?.is_some();
    if !previously_installed {
        ctx.render
            .note("no prior installation detected; running a full install");
        return run_install(ctx);
    }

    ctx.render.section("Update: detection");
    let detected = detect(ctx)?;
    render_detected(ctx, &detected);

    let Some(confirmed) = confirm_state(ctx, &detected)? else {
        ctx.render.note("nothing was changed");
        return Ok(FlowOutcome::Cancelled);
    };

    ctx.render.section("Refreshing artifacts");
    install_artifacts(ctx, &confirmed)?;

    write_record(&ctx.layout.record_path(), &confirmed.to_record())?;
    ctx.render.status(&format!(
        "recorded choices: {}",
        ctx.layout.record_path().display()
    ));

    verify_autologin_override(ctx, &confirmed)?;
    Ok(FlowOutcome::Completed)
}

/// Verify the privileged override instead of blindly rewriting it,
/// offering reconfiguration only when it is missing or malformed.
fn verify_autologin_override(ctx: &Ctx, confirmed: &ConfirmedState) -> Result<()> {
    let dropin_path = ctx.layout.autologin_dropin_path();
    match fs::read_to_string(&dropin_path) {
        Ok(content) if dropin_names_account(&content, &confirmed.identity) => {
            ctx.render.status(&format!(
                "autologin override verified: {}",
                dropin_path.display()
            ));
            Ok(())
        }
        Ok(_) => {
            ctx.render.warn(&format!(
                "autologin override does not grant '{}'",
                confirmed.identity
            ));
            configure_autologin(ctx, confirmed).map(|_| ())
        }
        Err(_) => {
            ctx.render.warn(&format!(
                "autologin override missing or unreadable: {}",
                dropin_path.display()
            ));
            configure_autologin(ctx, confirmed).map(|_| ())
        }
    }
}

pub fn run_uninstall(ctx: &Ctx) -> Result<FlowOutcome> {
    preflight(&["systemctl"])?;
    let render = ctx.render;

    render.section("Uninstall");
    let record = match load_record(&ctx.layout.record_path())? {
        Some((record, warnings)) => {
            for warning in warnings {
                render.warn(&warning);
            }
            Some(record)
        }
        None => None,
    };

    let managed = record
        .as_ref()
        .and_then(|record: &InstallRecord| record.session_method)
        == Some(SessionMethod::Managed)
        || ctx.layout.session_unit_path().exists();

    render.note("this removes:");
    render.note(&format!("  {}", ctx.layout.launcher_path().display()));
    render.note(&format!("  {}", ctx.layout.login_hook_path().display()));
    if managed {
        render.note(&format!("  {}", ctx.layout.session_unit_path().display()));
    }
    render.note(&format!("  {}", ctx.layout.record_path().display()));
    render.note("  any backups left by prior installs");

    if !prompts::confirm("Remove these greetless artifacts?", false)? {
        render.note("nothing was changed");
        return Ok(FlowOutcome::Cancelled);
    }

    if managed {
        // disable before delete, so the manager never points at a unit
        // file that is about to disappear
        if let Err(err) = ctx
            .services
            .set_enabled(UnitScope::User, ctx.layout.session_unit_name(), false)
        {
            render.warn(&format!("could not disable the session unit: {err:#}"));
        }
    }

    let report = remove_user_artifacts(&ctx.layout)?;
    for path in &report.removed {
        render.status(&format!("removed {}", path.display()));
    }
    for path in &report.absent {
        render.note(&format!("already absent: {}", path.display()));
    }
    if report.record_removed {
        render.status("removed the install record");
    }
    for backup in &report.swept_backups {
        render.status(&format!("swept backup {}", backup.display()));
    }

    if managed {
        if let Err(err) = ctx.services.daemon_reload(UnitScope::User) {
            render.warn(&format!("could not reload the user manager: {err:#}"));
        }
    }

    let dropin_path = ctx.layout.autologin_dropin_path();
    if dropin_path.exists() {
        if prompts::confirm(
            "Also remove the privileged autologin override (requires sudo)?",
            false,
        )? {
            ensure_elevated(ctx.elevation_timeout())?;
            set_critical("removing the autologin override");
            let removed = remove_privileged_file(&dropin_path, ctx.service_timeout());
            clear_critical();
            removed?;
            render.status(&format!("removed {}", dropin_path.display()));
            render.with_spinner("reloading service manager", || {
                ctx.services.daemon_reload(UnitScope::System)
            })?;
        } else {
            render.note(&format!("left in place: {}", dropin_path.display()));
        }
    }

    if let Some(display_manager) = detect_display_manager(ctx) {
        let enabled = ctx
            .services
            .is_enabled(UnitScope::System, &display_manager)
            .unwrap_or(false);
        if !enabled
            && prompts::confirm(
                &format!("Re-enable {display_manager} (requires sudo)?"),
                false,
            )?
        {
            ensure_elevated(ctx.elevation_timeout())?;
            ctx.services
                .set_enabled(UnitScope::System, &display_manager, true)?;
            render.status(&format!("{display_manager} enabled"));
        }
    }

    render.section("Remaining manual steps");
    render.note(&format!(
        "remove any '{AUTOSTART_LINE}' line from your compositor config"
    ));
    render.note("remove any reference to the login hook from your shell profile");

    offer_reboot(ctx)?;
    Ok(FlowOutcome::Completed)
}

fn preflight(required: &[&str]) -> Result<()> {
    for program in required {
        which::which(program).map_err(|_| {
            anyhow!("required program not found on PATH: {program}")
        })?;
    }
    Ok(())
}
