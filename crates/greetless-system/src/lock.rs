use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fs4::FileExt;

/// Exclusive single-instance guard scoped to the invoking user. Two runs
/// racing on the same override files is the one concurrency hazard in
/// scope, so acquisition is non-blocking and failure is hard.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

/// Per-user runtime directory when available, shared temp otherwise.
pub fn default_lock_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

impl InstanceLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create lock directory: {}", dir.display()))?;
        let path = dir.join("greetless.lock");

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock file: {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                return Err(anyhow!(
                    "another greetless run holds the lock: {}",
                    path.display()
                ));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to lock {}", path.display()));
            }
        }

        // The holder's pid, for a human inspecting a contended lock.
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = fs::remove_file(&self.path);
    }
}
