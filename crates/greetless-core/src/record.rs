use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::state::{DisplayChoice, GpuChoice, SessionMethod};

/// Durable record of the choices a successful install made. Created at the
/// end of Install, reread by Update/Uninstall, overwritten on every
/// successful Update, deleted on Uninstall.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstallRecord {
    pub session_method: Option<SessionMethod>,
    pub gpu_type: Option<GpuChoice>,
    pub display_path: Option<DisplayChoice>,
}

impl InstallRecord {
    pub fn is_complete(&self) -> bool {
        self.session_method.is_some() && self.gpu_type.is_some() && self.display_path.is_some()
    }
}

/// `auto` aside, a persisted display path must be a bare card device node.
/// Anything else is rejected so a tampered record cannot steer privileged
/// code at an arbitrary path.
pub fn is_card_device_path(value: &str) -> bool {
    let Some(index) = value.strip_prefix("/dev/dri/card") else {
        return false;
    };
    !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
}

pub fn serialize_record(record: &InstallRecord) -> String {
    let mut payload = String::new();
    if let Some(method) = record.session_method {
        payload.push_str(&format!("session_method={}\n", method.tag()));
    }
    if let Some(gpu) = record.gpu_type {
        payload.push_str(&format!("gpu_type={}\n", gpu.tag()));
    }
    if let Some(display) = &record.display_path {
        payload.push_str(&format!("display_path={}\n", display.tag()));
    }
    payload
}

/// Write a complete record with owner-only permissions. Refuses partial
/// records: persistence happens only after a fully confirmed install.
pub fn write_record(path: &Path, record: &InstallRecord) -> Result<()> {
    if !record.is_complete() {
        return Err(anyhow!("refusing to persist an incomplete install record"));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    fs::write(path, serialize_record(record))
        .with_context(|| format!("failed to write install record: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).with_context(|| {
            format!(
                "failed to restrict install record permissions: {}",
                path.display()
            )
        })?;
    }

    Ok(())
}

/// Load a record, validating field by field. A key failing its validator is
/// independently dropped with a warning; the remaining fields stay usable.
/// Returns `None` when no record exists.
pub fn load_record(path: &Path) -> Result<Option<(InstallRecord, Vec<String>)>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read install record: {}", path.display()));
        }
    };

    let mut record = InstallRecord::default();
    let mut warnings = Vec::new();

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((key, value)) = line.split_once('=') else {
            warnings.push(format!("ignoring malformed record line: {line}"));
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "session_method" => match SessionMethod::from_tag(value) {
                Some(method) => record.session_method = Some(method),
                None => warnings.push(format!("invalid session_method '{value}', re-detecting")),
            },
            "gpu_type" => match GpuChoice::from_tag(value) {
                Some(gpu) => record.gpu_type = Some(gpu),
                None => warnings.push(format!("invalid gpu_type '{value}', re-detecting")),
            },
            "display_path" => {
                if value == "auto" {
                    record.display_path = Some(DisplayChoice::Auto);
                } else if is_card_device_path(value) {
                    record.display_path = Some(DisplayChoice::Device(value.to_string()));
                } else {
                    warnings.push(format!("invalid display_path '{value}', re-detecting"));
                }
            }
            _ => warnings.push(format!("ignoring unknown record key: {key}")),
        }
    }

    Ok(Some((record, warnings)))
}

pub fn remove_record(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path)
        .with_context(|| format!("failed to remove install record: {}", path.display()))?;
    Ok(true)
}
