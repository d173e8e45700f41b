use std::path::{Path, PathBuf};

use crate::record::InstallRecord;
use crate::vendor::GpuVendor;

/// One enumerated DRM device, in OS enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuDevice {
    /// Card node name, e.g. `card0`.
    pub node: String,
    /// Kernel driver bound to the device, e.g. `amdgpu`.
    pub driver: String,
    pub vendor: Option<GpuVendor>,
}

/// How the compositor is brought up after console login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMethod {
    /// Launched from the console login shell via the installed hook.
    Direct,
    /// Launched and supervised by a session-manager user unit.
    Managed,
}

impl SessionMethod {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Managed => "managed",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "direct" => Some(Self::Direct),
            "managed" => Some(Self::Managed),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Direct => "direct (compositor launched from the login shell)",
            Self::Managed => "managed (compositor supervised by a user service)",
        }
    }
}

/// Operator's GPU choice: one concrete vendor, or automatic driver defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuChoice {
    Auto,
    Vendor(GpuVendor),
}

impl GpuChoice {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Vendor(vendor) => vendor.tag(),
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        if tag == "auto" {
            return Some(Self::Auto);
        }
        GpuVendor::from_tag(tag).map(Self::Vendor)
    }
}

/// Operator's display-output choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayChoice {
    Auto,
    Device(String),
}

impl DisplayChoice {
    pub fn tag(&self) -> &str {
        match self {
            Self::Auto => "auto",
            Self::Device(path) => path,
        }
    }
}

/// Snapshot of the live system, rebuilt by the detection engine every run.
/// Never trusted blindly: every field feeding a privileged or irreversible
/// operation is re-displayed and re-confirmed before use.
#[derive(Debug, Clone)]
pub struct DetectedState {
    /// Account to receive console autologin.
    pub identity: String,
    pub gpus: Vec<GpuDevice>,
    /// Display-output device paths tied to the enumerated GPUs.
    pub display_outputs: Vec<String>,
    /// Candidate compositor config files under the config root.
    pub config_files: Vec<PathBuf>,
    /// Subset of `config_files` already carrying a locker startup directive.
    pub autostart_files: Vec<PathBuf>,
    pub suggested_method: SessionMethod,
    /// Fallback login manager unit, when one was found.
    pub display_manager: Option<String>,
    pub prior_record: Option<InstallRecord>,
}

/// The operator-confirmed plan. All mutation takes its inputs from here,
/// never from `DetectedState` directly.
#[derive(Debug, Clone)]
pub struct ConfirmedState {
    pub identity: String,
    pub session_method: SessionMethod,
    pub gpu: GpuChoice,
    pub display: DisplayChoice,
    pub display_manager: Option<String>,
    /// Config file to receive the locker startup directive, when the
    /// operator opted in and no file carries one yet.
    pub autostart_target: Option<PathBuf>,
}

impl ConfirmedState {
    pub fn to_record(&self) -> InstallRecord {
        InstallRecord {
            session_method: Some(self.session_method),
            gpu_type: Some(self.gpu),
            display_path: Some(self.display.clone()),
        }
    }
}

/// Selectable vendor entries: first-seen device order, de-duplicated by
/// vendor, unknown drivers excluded.
pub fn selectable_vendors(gpus: &[GpuDevice]) -> Vec<GpuVendor> {
    let mut seen = Vec::new();
    for gpu in gpus {
        if let Some(vendor) = gpu.vendor {
            if !seen.contains(&vendor) {
                seen.push(vendor);
            }
        }
    }
    seen
}

/// Devices whose driver is not in the vendor table. Surfaced as warnings.
pub fn unknown_drivers(gpus: &[GpuDevice]) -> Vec<&GpuDevice> {
    gpus.iter().filter(|gpu| gpu.vendor.is_none()).collect()
}

/// Vendors claimed by more than one device. A non-empty result makes
/// display-output selection mandatory rather than auto-selected.
pub fn vendors_with_duplicates(gpus: &[GpuDevice]) -> Vec<GpuVendor> {
    let mut out = Vec::new();
    for vendor in selectable_vendors(gpus) {
        let count = gpus.iter().filter(|gpu| gpu.vendor == Some(vendor)).count();
        if count > 1 {
            out.push(vendor);
        }
    }
    out
}

/// Display-output device paths for the enumerated GPUs, in the same order.
pub fn display_outputs(gpus: &[GpuDevice], dev_root: &Path) -> Vec<String> {
    gpus.iter()
        .map(|gpu| dev_root.join(&gpu.node).display().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        display_outputs, selectable_vendors, unknown_drivers, vendors_with_duplicates, GpuDevice,
    };
    use crate::vendor::GpuVendor;
    use std::path::Path;

    fn device(node: &str, driver: &str) -> GpuDevice {
        GpuDevice {
            node: node.to_string(),
            driver: driver.to_string(),
            vendor: GpuVendor::from_driver(driver),
        }
    }

    #[test]
    fn classification_preserves_first_seen_order() {
        let gpus = vec![device("card0", "amdgpu"), device("card1", "nvidia")];
        assert_eq!(
            selectable_vendors(&gpus),
            vec![GpuVendor::Amd, GpuVendor::Nvidia]
        );
    }

    #[test]
    fn duplicate_vendor_contributes_one_selectable_entry() {
        let gpus = vec![
            device("card0", "amdgpu"),
            device("card1", "radeon"),
            device("card2", "i915"),
        ];
        assert_eq!(
            selectable_vendors(&gpus),
            vec![GpuVendor::Amd, GpuVendor::Intel]
        );
        assert_eq!(vendors_with_duplicates(&gpus), vec![GpuVendor::Amd]);
    }

    #[test]
    fn unknown_driver_is_warned_not_selected() {
        let gpus = vec![device("card0", "vmwgfx"), device("card1", "nvidia")];
        assert_eq!(selectable_vendors(&gpus), vec![GpuVendor::Nvidia]);
        let unknown = unknown_drivers(&gpus);
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].driver, "vmwgfx");
    }

    #[test]
    fn zero_recognized_devices_yields_empty_selection() {
        let gpus = vec![device("card0", "vmwgfx")];
        assert!(selectable_vendors(&gpus).is_empty());
        assert!(vendors_with_duplicates(&gpus).is_empty());
    }

    #[test]
    fn display_outputs_follow_device_order() {
        let gpus = vec![device("card1", "nvidia"), device("card0", "amdgpu")];
        assert_eq!(
            display_outputs(&gpus, Path::new("/dev/dri")),
            vec!["/dev/dri/card1", "/dev/dri/card0"]
        );
    }
}
