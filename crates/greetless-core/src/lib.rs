mod detect;
mod paths;
mod policy;
mod record;
mod state;
mod vendor;

pub use detect::{
    account_exists, enumerate_gpus, files_with_autostart, has_autostart_line, scan_config_files,
    scrub_account_name, suggest_session_method, UnitActivity,
};
pub use paths::normalize;
pub use policy::{load_policy, Policy};
pub use record::{
    is_card_device_path, load_record, remove_record, serialize_record, write_record, InstallRecord,
};
pub use state::{
    display_outputs, selectable_vendors, unknown_drivers, vendors_with_duplicates, ConfirmedState,
    DetectedState, DisplayChoice, GpuChoice, GpuDevice, SessionMethod,
};
pub use vendor::GpuVendor;
