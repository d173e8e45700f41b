use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

/// Marker embedded in every backup file name; the uninstall sweep removes
/// anything carrying it.
pub const BACKUP_MARKER: &str = ".greetless-bak-";

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}

/// Timestamped sibling copy of a regular file, permission bits preserved.
/// Returns the backup path, or `None` when there was nothing to back up.
pub fn backup_file(path: &Path) -> Result<Option<PathBuf>> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", path.display()));
        }
    };
    if !metadata.is_file() {
        return Ok(None);
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .context("backup target has no file name")?;
    let timestamp = current_unix_timestamp()?;

    let mut backup = path.with_file_name(format!("{file_name}{BACKUP_MARKER}{timestamp}"));
    let mut counter = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{file_name}{BACKUP_MARKER}{timestamp}-{counter}"));
        counter += 1;
    }

    fs::copy(path, &backup).with_context(|| {
        format!(
            "failed to back up {} to {}",
            path.display(),
            backup.display()
        )
    })?;
    Ok(Some(backup))
}

/// Delete every backup this tool left in `dirs`. Returns the removed paths,
/// sorted for stable reporting.
pub fn sweep_backups(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        let entries =
            fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if !name.to_string_lossy().contains(BACKUP_MARKER) {
                continue;
            }
            let path = entry.path();
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove backup: {}", path.display()))?;
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::{backup_file, sweep_backups, BACKUP_MARKER};
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(label: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "greetless-backup-{label}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("must create scratch dir");
        dir
    }

    #[test]
    fn backup_copies_content_and_permissions() {
        let dir = scratch_dir("copy");
        let original = dir.join("launcher");
        fs::write(&original, b"#!/bin/sh\n").expect("must write original");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&original, fs::Permissions::from_mode(0o755))
                .expect("must set permissions");
        }

        let backup = backup_file(&original)
            .expect("must back up")
            .expect("backup should exist");
        assert!(backup.to_string_lossy().contains(BACKUP_MARKER));
        assert_eq!(fs::read(&backup).expect("must read backup"), b"#!/bin/sh\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&backup)
                .expect("must stat backup")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_source_backs_up_to_nothing() {
        let dir = scratch_dir("missing");
        let absent = dir.join("absent");
        assert!(backup_file(&absent).expect("must tolerate absence").is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn same_second_backups_do_not_collide() {
        let dir = scratch_dir("collide");
        let original = dir.join("hook.sh");
        fs::write(&original, b"a").expect("must write original");

        let first = backup_file(&original).expect("must back up").expect("first");
        fs::write(&original, b"b").expect("must rewrite original");
        let second = backup_file(&original).expect("must back up").expect("second");

        assert_ne!(first, second);
        assert!(first.exists() && second.exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn sweep_removes_only_marked_files() {
        let dir = scratch_dir("sweep");
        let backup = dir.join(format!("launcher{BACKUP_MARKER}1700000000"));
        let keeper = dir.join("launcher");
        fs::write(&backup, b"old").expect("must write backup");
        fs::write(&keeper, b"new").expect("must write keeper");

        let removed = sweep_backups(&[dir.clone()]).expect("must sweep");
        assert_eq!(removed, vec![backup.clone()]);
        assert!(!backup.exists());
        assert!(keeper.exists());

        let missing = dir.join("not-there");
        assert!(sweep_backups(&[missing]).expect("must tolerate absence").is_empty());

        let _ = fs::remove_dir_all(&dir);
    }
}
