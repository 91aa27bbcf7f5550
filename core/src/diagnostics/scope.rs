use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path: drops `.`, folds `..` and trailing separators.
///
/// The filesystem is not consulted, so symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resource identifiers are plain paths or `file://` URIs
/// (`file:///p`, `file://localhost/p`).
fn uri_to_path(uri: &str) -> PathBuf {
    let Some(rest) = uri.strip_prefix("file://") else {
        return PathBuf::from(uri);
    };
    let rest = rest
        .strip_prefix("localhost")
        .filter(|r| r.starts_with('/'))
        .unwrap_or(rest);
    let decoded = percent_decode(rest);
    if cfg!(windows) {
        PathBuf::from(strip_drive_slash(&decoded))
    } else {
        PathBuf::from(decoded)
    }
}

/// `/C:/ws/app` → `C:/ws/app`. Other paths are returned unchanged.
fn strip_drive_slash(path: &str) -> &str {
    match path.as_bytes() {
        [b'/', drive, b':', ..] if drive.is_ascii_alphabetic() => &path[1..],
        _ => path,
    }
}

fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// The set of resources a job's diagnostics tracker listens to: the
/// normalized working path itself and anything nested under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathScope {
    prefix: PathBuf,
}

impl PathScope {
    pub fn new(working_path: impl AsRef<Path>) -> Self {
        Self {
            prefix: normalize_path(working_path.as_ref()),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn contains(&self, uri: &str) -> bool {
        // Component-wise: `/ws/app` covers `/ws/app/src/x.rs` but not `/ws/application`.
        normalize_path(&uri_to_path(uri)).starts_with(&self.prefix)
    }
}
