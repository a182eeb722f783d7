// Copyright 2021 Joyent, Inc.

//! Utilities for working with DFS paths. The file system uses forward slash
//! as its only delimiter and every path handed to the wire is absolute.

use crate::error::{DfsError, Result};

/// The DFS path delimiter.
pub const DELIMITER: &str = "/";

/// Returns the root directory path.
pub fn root() -> &'static str {
    DELIMITER
}

/// Joins path elements into a normalised absolute path. Empty elements are
/// skipped, duplicate delimiters collapse, and trailing delimiters are
/// stripped (except for the root itself). The first element must be
/// non-empty.
pub fn join(first: &str, more: &[&str]) -> Result<String> {
    if first.is_empty() {
        return Err(DfsError::InvalidArgument(String::from(
            "first path element cannot be empty",
        )));
    }

    let mut joined = String::with_capacity(first.len() + 1);
    joined.push_str(DELIMITER);
    joined.push_str(first);
    for element in more {
        if !element.is_empty() {
            joined.push_str(DELIMITER);
            joined.push_str(element);
        }
    }

    Ok(normalize(&joined))
}

/// Returns the final component of a path, or the empty string for the root.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches(DELIMITER);
    match trimmed.rfind(DELIMITER) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Validates that a path is absolute. Every public operation calls this
/// before any network work is done.
pub fn require_absolute(path: &str) -> Result<()> {
    if !path.starts_with(DELIMITER) {
        return Err(DfsError::InvalidArgument(format!(
            "path must be absolute and start with '/': {}",
            path
        )));
    }
    Ok(())
}

/// Collapses duplicate delimiters, forces a leading delimiter, and strips any
/// trailing delimiter other than the root.
fn normalize(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push_str(DELIMITER);
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if normalized.len() > 1 {
            normalized.push_str(DELIMITER);
        }
        normalized.push_str(component);
    }
    normalized
}
