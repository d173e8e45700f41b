use std::path::{Component, Path, PathBuf};

/// Resolve a user-supplied or discovered path into canonical absolute form.
///
/// Accepts `~`/`~/...` home shorthand, a `file://` prefix, duplicate
/// separators and lexical `.`/`..` components. Relative inputs are anchored
/// at `home`. Purely lexical, so the path does not need to exist, and
/// idempotent: normalizing an already-normal path returns it unchanged.
pub fn normalize(raw: &str, home: &Path) -> PathBuf {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("file://").unwrap_or(trimmed);

    let expanded = if trimmed == "~" {
        home.to_path_buf()
    } else if let Some(rest) = trimmed.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(trimmed)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        home.join(expanded)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping at the root is a no-op, so "/.." stays "/".
                out.pop();
            }
            Component::Normal(part) => out.push(part),
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(Component::RootDir.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::normalize;
    use std::path::{Path, PathBuf};

    fn home() -> &'static Path {
        Path::new("/home/tester")
    }

    #[test]
    fn expands_home_shorthand() {
        assert_eq!(
            normalize("~/videos", home()),
            PathBuf::from("/home/tester/videos")
        );
        assert_eq!(normalize("~", home()), PathBuf::from("/home/tester"));
    }

    #[test]
    fn strips_file_uri_prefix() {
        assert_eq!(
            normalize("file:///etc/greetless", home()),
            PathBuf::from("/etc/greetless")
        );
    }

    #[test]
    fn collapses_duplicate_separators_and_dot_components() {
        assert_eq!(
            normalize("//etc//./greetless", home()),
            PathBuf::from("/etc/greetless")
        );
    }

    #[test]
    fn resolves_parent_references_lexically() {
        assert_eq!(
            normalize("/etc/greetless/../sddm", home()),
            PathBuf::from("/etc/sddm")
        );
        assert_eq!(normalize("/..", home()), PathBuf::from("/"));
    }

    #[test]
    fn anchors_relative_paths_at_home() {
        assert_eq!(
            normalize(".config/hypr", home()),
            PathBuf::from("/home/tester/.config/hypr")
        );
    }

    #[test]
    fn is_idempotent() {
        for raw in [
            "~/x",
            "file:///dev/dri/card0",
            "//weird///path/..",
            "relative/bit",
            "/already/normal",
        ] {
            let once = normalize(raw, home());
            let twice = normalize(&once.display().to_string(), home());
            assert_eq!(once, twice, "normalize must be idempotent for {raw}");
        }
    }

    #[test]
    fn equivalent_spellings_agree() {
        let plain = normalize("/home/tester/media", home());
        assert_eq!(normalize("~/media", home()), plain);
        assert_eq!(normalize("file:///home/tester/media", home()), plain);
        assert_eq!(normalize("/home//tester/./media", home()), plain);
        assert_eq!(normalize("/home/tester/x/../media", home()), plain);
    }
}
