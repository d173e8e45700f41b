use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Tunable thresholds and timeouts. The shipped defaults work everywhere;
/// a policy file overrides individual fields without restating the rest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Troubleshooting rounds the staged testing gate allows before it
    /// fails hard and leaves the system installed but not cut over.
    pub test_max_attempts: u32,
    /// Whether `--skip-test` is honored at all.
    pub allow_skip_testing: bool,
    /// Upper bound on the interactive privilege-elevation check.
    pub elevation_timeout_secs: u64,
    /// Upper bound on every individual service-manager call.
    pub service_timeout_secs: u64,
    /// Grace period between TERM and KILL when the interrupt handler
    /// tears down spawned children.
    pub child_grace_secs: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            test_max_attempts: 5,
            allow_skip_testing: true,
            elevation_timeout_secs: 90,
            service_timeout_secs: 20,
            child_grace_secs: 2,
        }
    }
}

pub fn load_policy(path: &Path) -> Result<Policy> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse policy file: {}", path.display()))
}
