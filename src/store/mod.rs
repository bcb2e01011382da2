//! Concrete stores
//!
//! Each store is both a [`Loader`](crate::loader::Loader) for source images
//! and a [`Storage`](crate::storage::Storage) for results.
//!
//! As a loader a store only handles keys under its `path_prefix`, which is
//! stripped before the key is mapped into the store. As a storage it accepts
//! every key; the prefix is stripped when present.

pub mod file;
pub mod s3;

/// Strip `prefix` from `key`; None when the key is outside the prefix
pub(crate) fn strip_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let key = key.trim_start_matches('/');
    let prefix = prefix.trim_start_matches('/');
    if prefix.is_empty() {
        return Some(key);
    }
    let prefix = prefix.trim_end_matches('/');
    key.strip_prefix(prefix)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .map(|rest| rest.trim_start_matches('/'))
}

/// Validate a store-relative key: non-empty, no `..`, `.` or empty segments
pub(crate) fn sanitize(key: &str) -> Result<&str, String> {
    if key.is_empty() {
        return Err("empty key".to_string());
    }
    if key.contains('\0') || key.contains('\\') {
        return Err(format!("invalid character in key: {key}"));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(format!("path traversal rejected: {key}"));
    }
    Ok(key)
}

/// Join a base directory and a sanitized key with a single slash
pub(crate) fn join_key(base: &str, key: &str) -> String {
    let base = base.trim_matches('/');
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}/{key}")
    }
}
