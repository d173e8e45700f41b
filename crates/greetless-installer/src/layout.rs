use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Every path the installer touches, derived from four roots so tests can
/// point the whole tree at a scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    home: PathBuf,
    state_dir: PathBuf,
    config_root: PathBuf,
    payload_dir: PathBuf,
}

pub fn default_home() -> Result<PathBuf> {
    dirs::home_dir().context("could not resolve the invoking user's home directory")
}

impl TargetLayout {
    pub fn new(
        home: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
        config_root: impl Into<PathBuf>,
        payload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            home: home.into(),
            state_dir: state_dir.into(),
            config_root: config_root.into(),
            payload_dir: payload_dir.into(),
        }
    }

    /// Conventional roots for a given home directory.
    pub fn for_home(home: impl Into<PathBuf>, payload_dir: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let state_dir = home.join(".local").join("state").join("greetless");
        let config_root = home.join(".config").join("hypr");
        Self::new(home, state_dir, config_root, payload_dir)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    pub fn payload_dir(&self) -> &Path {
        &self.payload_dir
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.home.join(".local").join("bin")
    }

    /// Launcher script bringing up compositor plus locker.
    pub fn launcher_path(&self) -> PathBuf {
        self.bin_dir().join("greetless-session")
    }

    /// Shell login hook starting the launcher on the autologin console.
    pub fn login_hook_path(&self) -> PathBuf {
        self.home.join(".config").join("greetless").join("login-hook.sh")
    }

    pub fn payload_launcher_path(&self) -> PathBuf {
        self.payload_dir.join("greetless-session")
    }

    pub fn payload_login_hook_path(&self) -> PathBuf {
        self.payload_dir.join("login-hook.sh")
    }

    pub fn record_path(&self) -> PathBuf {
        self.state_dir.join("install.record")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.state_dir.join("tmp")
    }

    pub fn launcher_log_path(&self) -> PathBuf {
        self.state_dir.join("session.log")
    }

    pub fn user_unit_dir(&self) -> PathBuf {
        self.home.join(".config").join("systemd").join("user")
    }

    /// Managed-method user unit supervising the session.
    pub fn session_unit_path(&self) -> PathBuf {
        self.user_unit_dir().join("greetless-session.service")
    }

    pub fn session_unit_name(&self) -> &'static str {
        "greetless-session.service"
    }

    /// Root-owned autologin drop-in for the primary console.
    pub fn autologin_dropin_path(&self) -> PathBuf {
        PathBuf::from("/etc/systemd/system/getty@tty1.service.d/greetless-autologin.conf")
    }

    /// Directories the uninstall backup sweep scans.
    pub fn backup_search_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.bin_dir(),
            self.home.join(".config").join("greetless"),
            self.user_unit_dir(),
            self.config_root.clone(),
        ]
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [
            self.bin_dir(),
            self.home.join(".config").join("greetless"),
            self.state_dir.clone(),
            self.scratch_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::TargetLayout;
    use std::path::Path;

    #[test]
    fn conventional_paths_hang_off_the_home_root() {
        let layout = TargetLayout::for_home("/home/alice", "/usr/share/greetless/payload");
        assert_eq!(
            layout.launcher_path(),
            Path::new("/home/alice/.local/bin/greetless-session")
        );
        assert_eq!(
            layout.login_hook_path(),
            Path::new("/home/alice/.config/greetless/login-hook.sh")
        );
        assert_eq!(
            layout.record_path(),
            Path::new("/home/alice/.local/state/greetless/install.record")
        );
        assert_eq!(
            layout.session_unit_path(),
            Path::new("/home/alice/.config/systemd/user/greetless-session.service")
        );
        assert_eq!(layout.scratch_dir(), layout.state_dir().join("tmp"));
    }
}
