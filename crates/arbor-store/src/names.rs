//! Link and attribute name validation.
//!
//! Valid names:
//! - Must be non-empty
//! - Must not contain `/` (the path separator)
//! - Must not be `.` or `..`
//! - Must not contain NUL

use crate::error::{StoreError, StoreResult};

fn invalid(name: &str, reason: &str) -> StoreError {
    StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate a link name inside a group.
pub fn validate_link_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }
    if name.contains('/') {
        return Err(invalid(name, "must not contain '/'"));
    }
    if name == "." || name == ".." {
        return Err(invalid(name, "'.' and '..' are reserved"));
    }
    if name.contains('\0') {
        return Err(invalid(name, "must not contain NUL"));
    }
    Ok(())
}

/// Validate an attribute name. Attributes are not path components, so only
/// emptiness and NUL are refused.
pub fn validate_attribute_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }
    if name.contains('\0') {
        return Err(invalid(name, "must not contain NUL"));
    }
    Ok(())
}

/// Split an object path into its non-empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Join a parent path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}
