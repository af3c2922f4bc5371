//! Path validation and normalization for the memory root.
//!
//! Every path the store accepts lives under one reserved top-level directory.
//! Validation runs before any existence check, so malformed input never
//! touches a storage substrate.

use crate::error::{MemoryError, Result};

/// The single fixed top-level virtual directory all memory paths live under.
pub const MEMORY_ROOT: &str = "/memories";

/// Percent-decode a path. Decode failures fall back silently to the raw
/// string — an undecodable path is still a path, just a strange one.
pub fn decode(path: &str) -> String {
    match urlencoding::decode(path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => path.to_string(),
    }
}

/// Normalize a path: collapse `.` and empty segments, resolve `..` against
/// preceding segments where possible, and strip a trailing separator except
/// for the root. Idempotent.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    if absolute {
        format!("/{}", segments.join("/"))
    } else if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    }
}

/// Validate a path and return its canonical (decoded, normalized) form.
///
/// Fails with `InvalidPath` when the raw input contains a control character,
/// when a `..` segment survives normalization, or when the normalized form
/// does not start with the memory root.
pub fn validate(path: &str) -> Result<String> {
    if path.chars().any(|c| (c as u32) < 0x20) {
        return Err(MemoryError::InvalidPath(format!(
            "Invalid path {path:?}: control characters are not allowed in memory paths."
        )));
    }

    let normal = normalize(&decode(path));

    if normal.split('/').any(|segment| segment == "..") {
        return Err(MemoryError::InvalidPath(format!(
            "Invalid path {path}: it escapes the memory root. Paths must stay under {MEMORY_ROOT}."
        )));
    }

    if normal != MEMORY_ROOT && !normal.starts_with(&format!("{MEMORY_ROOT}/")) {
        return Err(MemoryError::InvalidPath(format!(
            "Invalid path {path}: all memory paths must start with {MEMORY_ROOT}."
        )));
    }

    Ok(normal)
}

/// Strip the root prefix, leaving a relative path. The root itself maps to
/// the empty string.
pub fn relative_of(path: &str) -> &str {
    path.strip_prefix(MEMORY_ROOT)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(path)
}

/// Root a path that omits the reserved root segment. Paths already under the
/// root pass through unchanged (normalized).
pub fn ensure_rooted(path: &str) -> String {
    let normal = normalize(&decode(path));
    if normal == MEMORY_ROOT || normal.starts_with(&format!("{MEMORY_ROOT}/")) {
        return normal;
    }
    let trimmed = normal.trim_start_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return MEMORY_ROOT.to_string();
    }
    if trimmed == "memories" || trimmed.starts_with("memories/") {
        return format!("/{trimmed}");
    }
    format!("{MEMORY_ROOT}/{trimmed}")
}

/// Parent directory of a path, or `None` for the root.
pub fn parent_of(path: &str) -> Option<&str> {
    if path == MEMORY_ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Every ancestor directory strictly between the root and the path itself,
/// outermost first: `/memories/a/b/c.txt` yields `/memories/a`, `/memories/a/b`.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some(parent) = parent_of(current) {
        if parent == MEMORY_ROOT || parent == "/" {
            break;
        }
        out.push(parent);
        current = parent;
    }
    out.reverse();
    out
}

/// Final path segment.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
