use std::path::Path;

use anyhow::{anyhow, Result};

use greetless_core::scrub_account_name;

/// Drop-in granting console autologin to exactly one account. The name is
/// re-validated here, immediately before embedding, so a stale or tampered
/// detected value cannot smuggle directives into the unit.
pub fn autologin_dropin(account: &str) -> Result<String> {
    let scrubbed = scrub_account_name(account);
    if scrubbed.is_empty() || scrubbed != account {
        return Err(anyhow!(
            "account name failed validation for the autologin override: {account:?}"
        ));
    }

    Ok(format!(
        "[Service]\n\
         ExecStart=\n\
         ExecStart=-/sbin/agetty --autologin {scrubbed} --noclear %I $TERM\n"
    ))
}

/// Managed-method user unit supervising the session launcher.
pub fn session_unit(launcher_path: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=greetless compositor session\n\
         After=default.target\n\
         \n\
         [Service]\n\
         ExecStart={}\n\
         Restart=on-failure\n\
         RestartSec=2\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        launcher_path.display()
    )
}

/// Whether an existing drop-in already grants autologin to `account`.
/// Update uses this to verify the override instead of blindly rewriting it.
pub fn dropin_names_account(content: &str, account: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        line.starts_with("ExecStart=-") && line.contains(&format!("--autologin {account} "))
    })
}
