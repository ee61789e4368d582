// ---------------------------------------------------------------------------
// Logical path helpers
// ---------------------------------------------------------------------------

/// Canonicalize a user-supplied path.
///
/// Leading and trailing slashes are removed. `None`, and input made only of
/// slashes, denote the root and yield `None`. The empty string is also the
/// root and stays `Some("")`. `normalize(normalize(p)) == normalize(p)`.
pub fn normalize(path: Option<&str>) -> Option<String> {
    let path = path?;
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() && !path.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

/// Normalize, mapping the root to `""`.
pub fn normalize_or_root(path: &str) -> String {
    normalize(Some(path)).unwrap_or_default()
}

/// Final segment of `path`.
pub fn basename(path: &str) -> &str {
    after_last(path, "/")
}

/// Whether the final segment looks like a file name.
pub fn has_file_extension(path: &str) -> bool {
    basename(path).contains('.')
}

/// Everything before the last `needle`; the whole string when absent.
pub fn before_last<'a>(path: &'a str, needle: &str) -> &'a str {
    match path.rfind(needle) {
        Some(pos) => &path[..pos],
        None => path,
    }
}

/// Everything after the last `needle`; the whole string when absent.
pub fn after_last<'a>(path: &'a str, needle: &str) -> &'a str {
    match path.rfind(needle) {
        Some(pos) => &path[pos + needle.len()..],
        None => path,
    }
}

/// Drop the final segment when it looks like a file name. A path that is
/// only a file name leaves the root.
pub fn strip_filename(path: &str) -> &str {
    if !has_file_extension(path) {
        return path;
    }
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}
