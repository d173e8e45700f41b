//! Configuration injection for the two known mutation points in the
//! payload launcher. The launcher is otherwise an opaque byte stream:
//! nothing here interprets shell syntax beyond the marker convention.
//!
//! Vendor blocks in the payload look like
//!
//! ```text
//! # --- nvidia ---
//! #export GBM_BACKEND=nvidia-drm
//! # --- end nvidia ---
//! ```
//!
//! and ship with every export commented out.

use anyhow::{anyhow, Result};

use greetless_core::is_card_device_path;

/// Uncomment the export lines inside the named vendor block. A payload
/// with no such block, or a block with nothing left to enable, is a
/// version mismatch between payload and installer and must be reported,
/// never skipped.
pub fn enable_vendor_block(content: &str, tag: &str) -> Result<String> {
    let begin = format!("# --- {tag} ---");
    let end = format!("# --- end {tag} ---");

    let mut inside = false;
    let mut enabled_any = false;
    let mut out: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == begin {
            inside = true;
            out.push(line.to_string());
            continue;
        }
        if trimmed == end {
            inside = false;
            out.push(line.to_string());
            continue;
        }
        if inside {
            if let Some(rest) = trimmed.strip_prefix('#') {
                if !rest.trim_start().starts_with("---") {
                    out.push(rest.to_string());
                    enabled_any = true;
                    continue;
                }
            }
        }
        out.push(line.to_string());
    }

    if !enabled_any {
        return Err(anyhow!(
            "payload has no disabled '{tag}' directive block; \
             payload and installer versions do not match"
        ));
    }
    Ok(join_lines(out))
}

/// Insert an explicit display-device override directly below the shebang,
/// ahead of anything the payload does with the device list.
pub fn insert_display_override(content: &str, device: &str) -> Result<String> {
    if !is_card_device_path(device) {
        return Err(anyhow!("refusing to inject display override: {device}"));
    }

    let override_line = format!("export GREETLESS_DISPLAY_DEVICE=\"{device}\"");
    let mut out: Vec<String> = Vec::new();
    let mut lines = content.lines();

    match lines.next() {
        Some(first) if first.starts_with("#!") => {
            out.push(first.to_string());
            out.push(override_line);
        }
        Some(first) => {
            out.push(override_line);
            out.push(first.to_string());
        }
        None => out.push(override_line),
    }
    out.extend(lines.map(str::to_string));
    Ok(join_lines(out))
}

fn join_lines(lines: Vec<String>) -> String {
    let mut joined = lines.join("\n");
    joined.push('\n');
    joined
}

#[cfg(test)]
mod tests {
    use super::{enable_vendor_block, insert_display_override};

    const PAYLOAD: &str = "#!/bin/sh\n\
# --- nvidia ---\n\
#export GBM_BACKEND=nvidia-drm\n\
#export __GLX_VENDOR_LIBRARY_NAME=nvidia\n\
# --- end nvidia ---\n\
# --- amd ---\n\
#export LIBVA_DRIVER_NAME=radeonsi\n\
# --- end amd ---\n\
exec compositor\n";

    #[test]
    fn enables_exactly_the_requested_vendor_block() {
        let injected = enable_vendor_block(PAYLOAD, "nvidia").expect("must inject");
        assert!(injected.contains("\nexport GBM_BACKEND=nvidia-drm\n"));
        assert!(injected.contains("\nexport __GLX_VENDOR_LIBRARY_NAME=nvidia\n"));
        assert!(injected.contains("\n#export LIBVA_DRIVER_NAME=radeonsi\n"));
        assert!(injected.contains("# --- nvidia ---"));
        assert!(injected.ends_with("exec compositor\n"));
    }

    #[test]
    fn missing_block_is_a_version_mismatch() {
        let err = enable_vendor_block(PAYLOAD, "intel").expect_err("must refuse");
        assert!(err.to_string().contains("intel"));
        assert!(err.to_string().contains("do not match"));
    }

    #[test]
    fn already_enabled_block_is_also_a_mismatch() {
        let enabled = enable_vendor_block(PAYLOAD, "nvidia").expect("must inject");
        assert!(enable_vendor_block(&enabled, "nvidia").is_err());
    }

    #[test]
    fn display_override_lands_below_the_shebang() {
        let injected = insert_display_override(PAYLOAD, "/dev/dri/card1").expect("must inject");
        let mut lines = injected.lines();
        assert_eq!(lines.next(), Some("#!/bin/sh"));
        assert_eq!(
            lines.next(),
            Some("export GREETLESS_DISPLAY_DEVICE=\"/dev/dri/card1\"")
        );
    }

    #[test]
    fn display_override_rejects_non_card_paths() {
        assert!(insert_display_override(PAYLOAD, "/etc/shadow").is_err());
        assert!(insert_display_override(PAYLOAD, "card1; rm -rf /").is_err());
    }

    #[test]
    fn display_override_without_shebang_lands_on_top() {
        let injected =
            insert_display_override("exec compositor\n", "/dev/dri/card0").expect("must inject");
        assert!(injected.starts_with("export GREETLESS_DISPLAY_DEVICE=\"/dev/dri/card0\"\n"));
    }
}
