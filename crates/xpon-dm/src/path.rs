//! Path classification and manipulation.
//!
//! A concrete instance path such as "XPON.ONU.1.ANI.1.Transceiver" maps to
//! its generic form "XPON.ONU.x.ANI.x.Transceiver" by dropping a trailing
//! index segment and replacing every other index segment with the wildcard.
//! The generic form is the lookup key into the object catalog.
//!
//! All functions here are pure; none touch the tree.

use crate::catalog::{self, ObjectId};
use crate::error::{DmError, DmResult};

/// The wildcard segment standing in for an instance index.
pub const WILDCARD: &str = "x";

const DOT_TC_AUTHENTICATION: &str = ".TC.Authentication";

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Converts a concrete path to its generic form.
///
/// A trailing index segment (an index with no attribute after it) is
/// dropped; every other index segment becomes [`WILDCARD`]. An empty
/// path or a path with empty segments is an error.
pub fn to_generic(path: &str) -> DmResult<String> {
    if path.is_empty() {
        return Err(DmError::invalid_value("empty path"));
    }
    let mut segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(DmError::invalid_value(format!(
            "empty segment in '{}'",
            path
        )));
    }
    if segments.last().is_some_and(|s| is_index(s)) {
        segments.pop();
    }
    let generic: Vec<&str> = segments
        .into_iter()
        .map(|s| if is_index(s) { WILDCARD } else { s })
        .collect();
    Ok(generic.join("."))
}

/// Classifies a concrete path as an object type.
///
/// Returns `None` when the path does not convert or its generic form
/// matches no catalog entry.
pub fn classify(path: &str) -> Option<ObjectId> {
    to_generic(path)
        .ok()
        .and_then(|generic| catalog::lookup_generic(&generic))
}

/// Returns the trailing index segment of a path, if there is one.
pub fn last_index(path: &str) -> Option<u32> {
    let last = path.rsplit('.').next()?;
    if is_index(last) {
        last.parse().ok()
    } else {
        None
    }
}

/// Trims trailing dots, as carried by change-notification paths.
pub fn strip_trailing_dot(path: &str) -> &str {
    path.trim_end_matches('.')
}

/// Formats the concrete path of an instance under a template.
pub fn instance_path(template_path: &str, index: u32) -> String {
    format!("{}.{}", template_path, index)
}

/// Appends ".TC.Authentication" to an ANI instance path.
pub fn authentication_path(ani_path: &str) -> String {
    format!("{}{}", ani_path, DOT_TC_AUTHENTICATION)
}

/// Strips ".TC.Authentication" from a path, recovering the owning ANI
/// instance path. Returns `None` when the marker is absent.
pub fn ani_path_from_authentication(auth_path: &str) -> Option<String> {
    let at = auth_path.find(DOT_TC_AUTHENTICATION)?;
    let mut ani_path = String::with_capacity(auth_path.len() - DOT_TC_AUTHENTICATION.len());
    ani_path.push_str(&auth_path[..at]);
    ani_path.push_str(&auth_path[at + DOT_TC_AUTHENTICATION.len()..]);
    Some(ani_path)
}
