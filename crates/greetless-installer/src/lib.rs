mod artifact;
mod autologin;
mod backup;
mod inject;
mod layout;
mod uninstall;

pub use artifact::{append_line_atomic, publish_content, read_payload, sha256_hex, InstallOutcome};
pub use autologin::{autologin_dropin, dropin_names_account, session_unit};
pub use backup::{backup_file, current_unix_timestamp, sweep_backups, BACKUP_MARKER};
pub use inject::{enable_vendor_block, insert_display_override};
pub use layout::{default_home, TargetLayout};
pub use uninstall::{remove_user_artifacts, RemovalReport};
