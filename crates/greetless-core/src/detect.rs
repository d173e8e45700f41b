use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::state::{GpuDevice, SessionMethod};
use crate::vendor::GpuVendor;

/// Observed state of a service unit, as reported by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitActivity {
    Active,
    Inactive,
    Failed,
    NotFound,
}

/// Enumerate DRM card devices under the sysfs root.
///
/// Only bare card nodes count (`card0`, `card1`, ...); connector entries
/// like `card0-HDMI-A-1` belong to their card. Entries come back ordered by
/// card index, which is the order the rest of the OS presents them in, so
/// menu positions stay predictable across runs.
pub fn enumerate_gpus(drm_root: &Path) -> Result<Vec<GpuDevice>> {
    if !drm_root.exists() {
        return Ok(Vec::new());
    }

    let mut cards: Vec<(u32, String, PathBuf)> = Vec::new();
    let entries = fs::read_dir(drm_root)
        .with_context(|| format!("failed to read {}", drm_root.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy().to_string();
        let Some(index) = card_index(&name) else {
            continue;
        };
        cards.push((index, name, entry.path()));
    }
    cards.sort_by_key(|(index, _, _)| *index);

    let mut gpus = Vec::with_capacity(cards.len());
    for (_, node, path) in cards {
        let driver = read_driver_name(&path);
        let vendor = GpuVendor::from_driver(&driver);
        gpus.push(GpuDevice {
            node,
            driver,
            vendor,
        });
    }
    Ok(gpus)
}

fn card_index(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("card")?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

fn read_driver_name(card_path: &Path) -> String {
    let driver_link = card_path.join("device").join("driver");
    match fs::read_link(&driver_link) {
        Ok(target) => target
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Candidate compositor config files under the config root, found by name
/// pattern (`*.conf`), sorted for stable presentation. A missing config
/// root is not an error.
pub fn scan_config_files(config_root: &Path) -> Result<Vec<PathBuf>> {
    if !config_root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let entries = fs::read_dir(config_root)
        .with_context(|| format!("failed to read {}", config_root.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("conf") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Subset of `files` already carrying a startup directive for `locker`.
pub fn files_with_autostart(files: &[PathBuf], locker: &str) -> Result<Vec<PathBuf>> {
    let mut hits = Vec::new();
    for file in files {
        let content = fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        if has_autostart_line(&content, locker) {
            hits.push(file.clone());
        }
    }
    Ok(hits)
}

/// True when any non-comment line is an `exec-once` directive launching
/// `locker`, tolerating an absolute path, trailing arguments and shell
/// terminators.
pub fn has_autostart_line(content: &str, locker: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        if line.starts_with('#') {
            return false;
        }
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        if key.trim() != "exec-once" {
            return false;
        }
        let Some(first) = value.split_whitespace().next() else {
            return false;
        };
        let first = first.trim_end_matches([';', '&']);
        first == locker || first.ends_with(&format!("/{locker}"))
    })
}

/// Check `name` against the passwd database. Re-run immediately before any
/// use of the account in a privileged write.
pub fn account_exists(passwd_path: &Path, name: &str) -> Result<bool> {
    let raw = fs::read_to_string(passwd_path)
        .with_context(|| format!("failed to read {}", passwd_path.display()))?;
    Ok(raw
        .lines()
        .any(|line| line.split(':').next() == Some(name)))
}

/// Strip control characters, whitespace and field separators from an
/// account name before it is embedded in a service override.
pub fn scrub_account_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !c.is_whitespace() && *c != ':')
        .collect()
}

/// Suggest a session method from the managed unit's observed state. A
/// failed unit never suggests the managed method; the operator confirms
/// either way.
pub fn suggest_session_method(activity: UnitActivity) -> SessionMethod {
    match activity {
        UnitActivity::Active => SessionMethod::Managed,
        UnitActivity::Inactive | UnitActivity::Failed | UnitActivity::NotFound => {
            SessionMethod::Direct
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        account_exists, enumerate_gpus, files_with_autostart, has_autostart_line,
        scan_config_files, scrub_account_name, suggest_session_method, UnitActivity,
    };
    use crate::state::SessionMethod;
    use crate::vendor::GpuVendor;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn scratch_dir(label: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "greetless-detect-{label}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("must create scratch dir");
        dir
    }

    #[cfg(unix)]
    fn fake_card(drm_root: &Path, node: &str, driver: &str) {
        let device = drm_root.join(node).join("device");
        fs::create_dir_all(&device).expect("must create device dir");
        let driver_dir = drm_root.join("drivers").join(driver);
        fs::create_dir_all(&driver_dir).expect("must create driver dir");
        std::os::unix::fs::symlink(&driver_dir, device.join("driver"))
            .expect("must create driver symlink");
    }

    #[cfg(unix)]
    #[test]
    fn enumerates_cards_in_index_order_skipping_connectors() {
        let drm_root = scratch_dir("enumerate");
        fake_card(&drm_root, "card1", "nvidia");
        fake_card(&drm_root, "card0", "amdgpu");
        fs::create_dir_all(drm_root.join("card0-HDMI-A-1")).expect("must create connector");
        fs::create_dir_all(drm_root.join("renderD128")).expect("must create render node");

        let gpus = enumerate_gpus(&drm_root).expect("must enumerate");
        let summary: Vec<(String, String)> = gpus
            .iter()
            .map(|gpu| (gpu.node.clone(), gpu.driver.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("card0".to_string(), "amdgpu".to_string()),
                ("card1".to_string(), "nvidia".to_string()),
            ]
        );
        assert_eq!(gpus[0].vendor, Some(GpuVendor::Amd));
        assert_eq!(gpus[1].vendor, Some(GpuVendor::Nvidia));

        let _ = fs::remove_dir_all(&drm_root);
    }

    #[test]
    fn missing_drm_root_yields_empty_inventory() {
        let gpus = enumerate_gpus(Path::new("/nonexistent/greetless-drm"))
            .expect("must tolerate missing root");
        assert!(gpus.is_empty());
    }

    #[test]
    fn autostart_detection_skips_comments_and_tolerates_arguments() {
        assert!(has_autostart_line("exec-once = hyprlock", "hyprlock"));
        assert!(has_autostart_line("exec-once=hyprlock --immediate", "hyprlock"));
        assert!(has_autostart_line(
            "exec-once = /usr/bin/hyprlock;",
            "hyprlock"
        ));
        assert!(!has_autostart_line("# exec-once = hyprlock", "hyprlock"));
        assert!(!has_autostart_line("exec-once = waybar", "hyprlock"));
        assert!(!has_autostart_line("exec = hyprlock", "hyprlock"));
        assert!(!has_autostart_line("exec-once = hyprlock-wrapper", "hyprlock"));
    }

    #[test]
    fn config_scan_finds_conf_files_and_autostart_subset() {
        let config_root = scratch_dir("config-scan");
        fs::write(
            config_root.join("hyprland.conf"),
            "monitor=,preferred,auto,1\nexec-once = hyprlock\n",
        )
        .expect("must write config");
        fs::write(config_root.join("extra.conf"), "# empty\n").expect("must write config");
        fs::write(config_root.join("notes.txt"), "ignored\n").expect("must write noise");

        let files = scan_config_files(&config_root).expect("must scan");
        assert_eq!(files.len(), 2);

        let with_autostart = files_with_autostart(&files, "hyprlock").expect("must scan lines");
        assert_eq!(with_autostart.len(), 1);
        assert!(with_autostart[0].ends_with("hyprland.conf"));

        let _ = fs::remove_dir_all(&config_root);
    }

    #[test]
    fn account_lookup_matches_exact_name() {
        let dir = scratch_dir("passwd");
        let passwd = dir.join("passwd");
        fs::write(
            &passwd,
            "root:x:0:0::/root:/bin/bash\nalice:x:1000:1000::/home/alice:/bin/zsh\n",
        )
        .expect("must write passwd");

        assert!(account_exists(&passwd, "alice").expect("must read passwd"));
        assert!(!account_exists(&passwd, "alic").expect("must read passwd"));
        assert!(!account_exists(&passwd, "bob").expect("must read passwd"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn account_scrubbing_removes_injection_vectors() {
        assert_eq!(scrub_account_name("alice"), "alice");
        assert_eq!(scrub_account_name("al\nice"), "alice");
        assert_eq!(scrub_account_name("a lice:evil\t"), "aliceevil");
    }

    #[test]
    fn failed_unit_never_suggests_managed() {
        assert_eq!(
            suggest_session_method(UnitActivity::Active),
            SessionMethod::Managed
        );
        for activity in [
            UnitActivity::Inactive,
            UnitActivity::Failed,
            UnitActivity::NotFound,
        ] {
            assert_eq!(suggest_session_method(activity), SessionMethod::Direct);
        }
    }
}
