use std::fmt;

/// Known GPU vendors, classified by the kernel driver claiming the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
}

impl GpuVendor {
    pub fn name(self) -> &'static str {
        match self {
            Self::Nvidia => "NVIDIA",
            Self::Amd => "AMD",
            Self::Intel => "Intel",
        }
    }

    /// Stable lowercase tag used in selection menus and the persisted record.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Nvidia => "nvidia",
            Self::Amd => "amd",
            Self::Intel => "intel",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "nvidia" => Some(Self::Nvidia),
            "amd" => Some(Self::Amd),
            "intel" => Some(Self::Intel),
            _ => None,
        }
    }

    /// Map a kernel driver name to its vendor. Drivers outside this table
    /// are surfaced to the operator as warnings, never as selectable entries.
    pub fn from_driver(driver: &str) -> Option<Self> {
        match driver {
            "nvidia" | "nouveau" => Some(Self::Nvidia),
            "amdgpu" | "radeon" => Some(Self::Amd),
            "i915" | "xe" => Some(Self::Intel),
            _ => None,
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
