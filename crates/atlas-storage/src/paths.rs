//! Path conventions shared by the session and the backends.
//!
//! Paths are `/`-separated and relative to the project. An asset lives at
//! `<folder>/<name><ext>`; its metadata and preview sit next to it as
//! `<name><ext>.meta` and `<name><ext>.preview`.

pub const META_SUFFIX: &str = ".meta";
pub const PREVIEW_SUFFIX: &str = ".preview";

pub fn join(folder: &str, file_name: &str) -> String {
    if folder.is_empty() {
        file_name.to_string()
    } else {
        format!("{folder}/{file_name}")
    }
}

pub fn item_path(folder: &str, name: &str, extension: &str) -> String {
    join(folder, &format!("{name}{extension}"))
}

pub fn meta_path(path: &str) -> String {
    format!("{path}{META_SUFFIX}")
}

pub fn preview_path(path: &str) -> String {
    format!("{path}{PREVIEW_SUFFIX}")
}

pub fn is_sidecar(path: &str) -> bool {
    path.ends_with(META_SUFFIX) || path.ends_with(PREVIEW_SUFFIX)
}

/// Split into `(folder, file_name)`. The folder is empty for top-level paths.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

/// Returns `true` if `path` is `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

/// Match `name` against a pattern with at most one `*` wildcard.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
        None => name == pattern,
    }
}
