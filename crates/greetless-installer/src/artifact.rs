use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

use crate::backup::backup_file;

/// What publishing an artifact did to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Fresh install, nothing was at the destination.
    Installed,
    /// Destination already matched the staged content byte for byte and
    /// was left untouched.
    AlreadyCurrent,
    /// Destination differed and was backed up before being replaced.
    Replaced { backup: Option<PathBuf> },
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Read a payload file, reporting absence as the environment failure it is.
pub fn read_payload(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| {
        format!(
            "payload file is missing or unreadable: {} \
             (reinstall the greetless payload package)",
            path.display()
        )
    })
}

/// Publish `content` at `dest` with write-to-temporary-then-publish.
///
/// The temporary lives in the caller's scratch directory; on any failure
/// before the final rename it is removed and the destination is untouched,
/// so a partial write is never visible at the destination path. A symlink
/// occupying the destination is removed before publish rather than
/// followed.
pub fn publish_content(
    scratch_dir: &Path,
    dest: &Path,
    content: &[u8],
    mode: u32,
) -> Result<InstallOutcome> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::create_dir_all(scratch_dir)
        .with_context(|| format!("failed to create scratch dir: {}", scratch_dir.display()))?;

    let existing = match fs::symlink_metadata(dest) {
        Ok(metadata) => Some(metadata),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", dest.display()));
        }
    };

    let dest_is_symlink = existing
        .as_ref()
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false);
    let dest_is_file = existing
        .as_ref()
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);

    if dest_is_file {
        let current = fs::read(dest)
            .with_context(|| format!("failed to read existing artifact: {}", dest.display()))?;
        if sha256_hex(&current) == sha256_hex(content) {
            return Ok(InstallOutcome::AlreadyCurrent);
        }
    }

    let staged = stage_temp_file(scratch_dir, content, mode)?;

    // Back up only after staging succeeded, so a staging failure leaves no
    // backup churn behind. Only regular files are preserved; a symlink at
    // the destination is removed, not archived.
    let backup = if dest_is_file {
        match backup_file(dest) {
            Ok(backup) => backup,
            Err(err) => {
                let _ = fs::remove_file(&staged);
                return Err(err);
            }
        }
    } else {
        None
    };

    if dest_is_symlink {
        if let Err(err) = fs::remove_file(dest) {
            let _ = fs::remove_file(&staged);
            return Err(err).with_context(|| {
                format!("failed to remove symlink at destination: {}", dest.display())
            });
        }
    }

    if let Err(err) = fs::rename(&staged, dest) {
        let _ = fs::remove_file(&staged);
        return Err(err)
            .with_context(|| format!("failed to publish artifact: {}", dest.display()));
    }

    Ok(match existing {
        Some(_) => InstallOutcome::Replaced { backup },
        None => InstallOutcome::Installed,
    })
}

fn stage_temp_file(scratch_dir: &Path, content: &[u8], mode: u32) -> Result<PathBuf> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_nanos();
    let staged = scratch_dir.join(format!("stage-{}-{nanos}", std::process::id()));

    let write_result = (|| -> Result<()> {
        fs::write(&staged, content)
            .with_context(|| format!("failed to stage artifact: {}", staged.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staged, fs::Permissions::from_mode(mode)).with_context(|| {
                format!("failed to set staged permissions: {}", staged.display())
            })?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&staged);
        return Err(err);
    }
    Ok(staged)
}

/// Append a startup directive line to a config file, through the same
/// backup-then-atomic-publish path the artifacts use.
pub fn append_line_atomic(scratch_dir: &Path, dest: &Path, line: &str) -> Result<InstallOutcome> {
    let current = fs::read_to_string(dest)
        .with_context(|| format!("failed to read {}", dest.display()))?;
    if current.lines().any(|existing| existing.trim() == line.trim()) {
        return Ok(InstallOutcome::AlreadyCurrent);
    }

    let mut next = current;
    if !next.is_empty() && !next.ends_with('\n') {
        next.push('\n');
    }
    next.push_str(line.trim_end());
    next.push('\n');

    let mode = current_mode(dest)?;
    publish_content(scratch_dir, dest, next.as_bytes(), mode)
}

#[cfg(unix)]
fn current_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let metadata =
        fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    Ok(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn current_mode(_path: &Path) -> Result<u32> {
    Ok(0o644)
}

#[cfg(test)]
mod tests {
    use super::{append_line_atomic, publish_content, read_payload, sha256_hex, InstallOutcome};
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(label: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "greetless-artifact-{label}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("must create scratch dir");
        dir
    }

    #[test]
    fn fresh_publish_installs_with_requested_mode() {
        let dir = scratch_dir("fresh");
        let scratch = dir.join("tmp");
        let dest = dir.join("bin").join("greetless-session");

        let outcome =
            publish_content(&scratch, &dest, b"#!/bin/sh\n", 0o755).expect("must publish");
        assert_eq!(outcome, InstallOutcome::Installed);
        assert_eq!(fs::read(&dest).expect("must read dest"), b"#!/bin/sh\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dest).expect("must stat").permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn identical_content_is_left_untouched() {
        let dir = scratch_dir("current");
        let scratch = dir.join("tmp");
        let dest = dir.join("launcher");
        fs::write(&dest, b"same").expect("must seed dest");

        let outcome = publish_content(&scratch, &dest, b"same", 0o755).expect("must publish");
        assert_eq!(outcome, InstallOutcome::AlreadyCurrent);

        // no backup churn for an unchanged artifact
        let siblings: Vec<_> = fs::read_dir(&dir)
            .expect("must list")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains("greetless-bak"))
            .collect();
        assert!(siblings.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn differing_destination_is_backed_up_then_replaced() {
        let dir = scratch_dir("replace");
        let scratch = dir.join("tmp");
        let dest = dir.join("launcher");
        fs::write(&dest, b"old").expect("must seed dest");

        let outcome = publish_content(&scratch, &dest, b"new", 0o755).expect("must publish");
        match outcome {
            InstallOutcome::Replaced {
                backup: Some(backup),
            } => {
                assert_eq!(fs::read(&dest).expect("must read dest"), b"new");
                assert_eq!(fs::read(&backup).expect("must read backup"), b"old");
            }
            other => panic!("expected a backed-up replacement, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_at_destination_is_removed_not_followed() {
        let dir = scratch_dir("symlink");
        let scratch = dir.join("tmp");
        let target = dir.join("victim");
        fs::write(&target, b"victim content").expect("must write victim");
        let dest = dir.join("launcher");
        std::os::unix::fs::symlink(&target, &dest).expect("must create symlink");

        let outcome = publish_content(&scratch, &dest, b"new", 0o755).expect("must publish");
        assert_eq!(outcome, InstallOutcome::Replaced { backup: None });
        assert_eq!(fs::read(&dest).expect("must read dest"), b"new");
        // the symlink target is untouched
        assert_eq!(fs::read(&target).expect("must read victim"), b"victim content");
        assert!(!fs::symlink_metadata(&dest)
            .expect("must stat dest")
            .file_type()
            .is_symlink());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_publish_leaves_destination_and_scratch_clean() {
        let dir = scratch_dir("atomic");
        let scratch = dir.join("tmp");
        // a directory at the destination makes the final rename fail after
        // staging has already succeeded
        let dest = dir.join("launcher");
        fs::create_dir_all(dest.join("occupied")).expect("must occupy dest");

        let err = publish_content(&scratch, &dest, b"new", 0o755).expect_err("must fail");
        assert!(err.to_string().contains("failed to publish artifact"));
        assert!(dest.join("occupied").exists());

        let leftovers: Vec<_> = fs::read_dir(&scratch)
            .expect("must list scratch")
            .filter_map(|entry| entry.ok())
            .collect();
        assert!(leftovers.is_empty(), "staged temp file must be cleaned up");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn append_line_is_idempotent() {
        let dir = scratch_dir("append");
        let scratch = dir.join("tmp");
        let conf = dir.join("hyprland.conf");
        fs::write(&conf, "monitor=,preferred,auto,1\n").expect("must seed conf");

        let first = append_line_atomic(&scratch, &conf, "exec-once = hyprlock")
            .expect("must append");
        assert!(matches!(first, InstallOutcome::Replaced { .. }));
        let second = append_line_atomic(&scratch, &conf, "exec-once = hyprlock")
            .expect("must no-op");
        assert_eq!(second, InstallOutcome::AlreadyCurrent);

        let content = fs::read_to_string(&conf).expect("must read conf");
        assert_eq!(
            content
                .lines()
                .filter(|line| line.trim() == "exec-once = hyprlock")
                .count(),
            1
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_payload_is_an_environment_error() {
        let err = read_payload(std::path::Path::new("/nonexistent/greetless-payload"))
            .expect_err("must fail");
        assert!(err.to_string().contains("missing or unreadable"));
    }

    #[test]
    fn fingerprints_differ_on_content() {
        assert_ne!(sha256_hex(b"a"), sha256_hex(b"b"));
        assert_eq!(sha256_hex(b"a"), sha256_hex(b"a"));
    }
}
