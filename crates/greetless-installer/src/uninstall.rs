use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use greetless_core::remove_record;

use crate::backup::sweep_backups;
use crate::layout::TargetLayout;

/// What an uninstall pass removed, for faithful reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemovalReport {
    pub removed: Vec<PathBuf>,
    pub absent: Vec<PathBuf>,
    pub swept_backups: Vec<PathBuf>,
    pub record_removed: bool,
}

/// Remove every user-space artifact: launcher, login hook, managed-session
/// unit file, persisted record, leftover backups and the scratch dir.
/// Idempotent: running against a clean system reports everything absent.
pub fn remove_user_artifacts(layout: &TargetLayout) -> Result<RemovalReport> {
    let mut report = RemovalReport::default();

    for path in [
        layout.launcher_path(),
        layout.login_hook_path(),
        layout.session_unit_path(),
    ] {
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove artifact: {}", path.display()))?;
            report.removed.push(path);
        } else {
            report.absent.push(path);
        }
    }

    report.record_removed = remove_record(&layout.record_path())?;
    report.swept_backups = sweep_backups(&layout.backup_search_dirs())?;

    let scratch = layout.scratch_dir();
    if scratch.exists() {
        let _ = fs::remove_dir_all(&scratch);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::remove_user_artifacts;
    use crate::backup::BACKUP_MARKER;
    use crate::layout::TargetLayout;
    use greetless_core::{load_record, write_record, DisplayChoice, GpuChoice, InstallRecord, SessionMethod};
    use std::fs;
    use std::path::PathBuf;

    fn scratch_home(label: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let home = std::env::temp_dir().join(format!(
            "greetless-uninstall-{label}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&home).expect("must create home");
        home
    }

    #[test]
    fn uninstall_is_the_left_inverse_of_install() {
        let home = scratch_home("inverse");
        let layout = TargetLayout::for_home(&home, home.join("payload"));
        layout.ensure_base_dirs().expect("must create dirs");

        fs::write(layout.launcher_path(), b"#!/bin/sh\n").expect("must install launcher");
        fs::write(layout.login_hook_path(), b"hook\n").expect("must install hook");
        fs::create_dir_all(layout.user_unit_dir()).expect("must create unit dir");
        fs::write(layout.session_unit_path(), b"[Unit]\n").expect("must install unit");
        write_record(
            &layout.record_path(),
            &InstallRecord {
                session_method: Some(SessionMethod::Direct),
                gpu_type: Some(GpuChoice::Auto),
                display_path: Some(DisplayChoice::Auto),
            },
        )
        .expect("must write record");
        let stale_backup = layout
            .bin_dir()
            .join(format!("greetless-session{BACKUP_MARKER}1700000000"));
        fs::write(&stale_backup, b"old").expect("must write stale backup");

        let report = remove_user_artifacts(&layout).expect("must uninstall");
        assert_eq!(report.removed.len(), 3);
        assert!(report.record_removed);
        assert_eq!(report.swept_backups, vec![stale_backup]);

        assert!(!layout.launcher_path().exists());
        assert!(!layout.login_hook_path().exists());
        assert!(!layout.session_unit_path().exists());
        assert!(load_record(&layout.record_path())
            .expect("must tolerate absence")
            .is_none());

        let _ = fs::remove_dir_all(&home);
    }

    #[test]
    fn uninstall_on_a_clean_system_reports_everything_absent() {
        let home = scratch_home("clean");
        let layout = TargetLayout::for_home(&home, home.join("payload"));

        let report = remove_user_artifacts(&layout).expect("must tolerate clean system");
        assert!(report.removed.is_empty());
        assert_eq!(report.absent.len(), 3);
        assert!(!report.record_removed);
        assert!(report.swept_backups.is_empty());

        let _ = fs::remove_dir_all(&home);
    }
}
