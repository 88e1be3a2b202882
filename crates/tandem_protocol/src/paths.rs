//! Path normalization and the handshake project-match rule.
//!
//! Normalization runs before any path comparison or host call. The suffix
//! stripping repairs host bugs that occasionally append artifact extensions
//! to incoming payload paths; it is never applied to paths read back from
//! the host.

/// Per-family path shape. Family A speaks forward slashes, family B speaks
/// Windows-style backslashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    Posix,
    Windows,
}

const STRIP_SUFFIXES: &[&str] = &[".git", ".tmp", ".bak", ".swp"];

/// Remove one trailing artifact suffix, if present.
pub fn strip_artifact_suffix(path: &str) -> &str {
    for suffix in STRIP_SUFFIXES {
        if let Some(stripped) = path.strip_suffix(suffix) {
            return stripped;
        }
    }
    path
}

/// Normalize `path` into the given family's shape.
pub fn normalize(path: &str, style: PathStyle) -> String {
    let path = strip_artifact_suffix(path);
    match style {
        PathStyle::Posix => normalize_posix(path),
        PathStyle::Windows => normalize_windows(path),
    }
}

fn normalize_posix(path: &str) -> String {
    let mut out = path.replace('\\', "/");
    if !cfg!(windows) {
        if let Some(rest) = strip_drive_prefix(&out) {
            out = rest.to_string();
        }
    }
    while out.contains("//") {
        out = out.replace("//", "/");
    }
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    out
}

fn normalize_windows(path: &str) -> String {
    let mut out = path.replace('/', "\\");
    let bytes = out.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_uppercase() {
        let lowered = (bytes[0] as char).to_ascii_lowercase();
        out.replace_range(0..1, &lowered.to_string());
    }
    out
}

fn strip_drive_prefix(path: &str) -> Option<&str> {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        Some(&path[2..])
    } else {
        None
    }
}

/// Family transform without the artifact-suffix repair. Used on paths read
/// back from the host, which are trusted not to carry stray suffixes.
pub fn host_key(path: &str, style: PathStyle) -> String {
    match style {
        PathStyle::Posix => normalize_posix(path),
        PathStyle::Windows => normalize_windows(path),
    }
}

/// Key used for the handshake project-path comparison: forward slashes,
/// lower-cased, no trailing slash.
fn match_key(path: &str) -> String {
    let mut key = path.replace('\\', "/").to_lowercase();
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }
    key
}

/// Two project paths belong to the same sync group iff either normalized
/// form is a prefix of the other. The prefix rule admits multi-root
/// workspaces whose listed root is a parent of the partner's.
pub fn project_paths_match(a: &str, b: &str) -> bool {
    let ka = match_key(a);
    let kb = match_key(b);
    if ka.is_empty() || kb.is_empty() {
        return false;
    }
    ka.starts_with(&kb) || kb.starts_with(&ka)
}

/// Accept only local-file paths at ingest; virtual documents (`untitled:`,
/// `output:`, `git:`, ...) never cross the wire. A `file://` prefix is
/// stripped, a Windows drive prefix is not mistaken for a scheme.
pub fn local_file_path(raw: &str) -> Option<String> {
    if let Some(rest) = raw.strip_prefix("file://") {
        return Some(rest.to_string());
    }
    if let Some(colon) = raw.find(':') {
        let head = &raw[..colon];
        let is_drive = head.len() == 1 && head.chars().all(|c| c.is_ascii_alphabetic());
        if !is_drive && head.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return None;
        }
    }
    Some(raw.to_string())
}
