//! Tag vocabulary and the marker-id tag scheme.
//!
//! Marker-scoped tags embed the marker id after a single `#` separator,
//! e.g. `MARKER_SIGNAL#A`. Exactly one separator occurrence is legal;
//! producers of marker-scoped tags must never use `#` elsewhere in a tag
//! segment, and violations are usage errors raised at construction time.

use crate::error::{Result, ScanFlowError};
use serde::{Deserialize, Serialize};
use std::fmt;

// Global source / derived tags.
pub const ASCAN: &str = "ASCAN";
pub const ENERGY: &str = "ENERGY";
pub const SHAPE: &str = "SHAPE";
pub const UV: &str = "UV";
pub const SAMPLING_RATE: &str = "SAMPLING_RATE";
pub const RESOURCES: &str = "RESOURCES";

// Marker lifecycle tags.
pub const MARKER_TRACK: &str = "MARKER_TRACK";
pub const MARKER_UNTRACK: &str = "MARKER_UNTRACK";
pub const MARKER_UNTRACK_ALL: &str = "MARKER_UNTRACK_ALL";

// Marker-scoped input tags (`BASE#id` on the wire).
pub const MARKER_SIGNAL_IDX: &str = "MARKER_SIGNAL_IDX";
pub const MARKER_STATUS: &str = "MARKER_STATUS";

// Marker-scoped derived tags.
pub const MARKER_SIGNAL: &str = "MARKER_SIGNAL";
pub const MARKER_ENERGY: &str = "MARKER_ENERGY";
pub const MARKER_RESOURCES: &str = "MARKER_RESOURCES";
pub const MARKER_FFT: &str = "MARKER_FFT";

/// Prefix pattern covering every marker-related tag.
pub const MARKER_PREFIX: &str = "MARKER...";

/// Reserved marker-id separator.
pub const ID_SEPARATOR: char = '#';

/// Validated marker identifier: non-empty and free of the reserved
/// separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MarkerId(String);

impl MarkerId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ScanFlowError::usage("marker id must not be empty"));
        }
        if id.contains(ID_SEPARATOR) {
            return Err(ScanFlowError::usage(format!(
                "marker id '{id}' must not contain the reserved separator '{ID_SEPARATOR}'"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MarkerId {
    type Error = ScanFlowError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<MarkerId> for String {
    fn from(id: MarkerId) -> Self {
        id.0
    }
}

/// Build a marker-scoped tag `base#id`.
///
/// Fails when `base` already contains the separator — the result would
/// carry more than one occurrence.
pub fn scoped_tag(base: &str, id: &MarkerId) -> Result<String> {
    if base.contains(ID_SEPARATOR) {
        return Err(ScanFlowError::Tag {
            tag: base.to_string(),
            message: format!("tag base must not contain '{ID_SEPARATOR}'"),
        });
    }
    Ok(format!("{base}{ID_SEPARATOR}{}", id.as_str()))
}

/// Marker-scoped tag for a crate-internal base constant.
///
/// Infallible counterpart of [`scoped_tag`] for the tag constants defined
/// in this module, none of which contain the separator.
pub(crate) fn derived_tag(base: &'static str, id: &MarkerId) -> String {
    debug_assert!(!base.contains(ID_SEPARATOR));
    format!("{base}{ID_SEPARATOR}{}", id.as_str())
}

/// Split a marker-scoped tag into `(base, id)`.
///
/// Returns `Ok(None)` for tags carrying no separator (unscoped tags) and a
/// usage error for tags carrying more than one.
pub fn split_scoped_tag(tag: &str) -> Result<Option<(&str, MarkerId)>> {
    let mut parts = tag.split(ID_SEPARATOR);
    let base = parts.next().unwrap_or_default();
    let Some(id) = parts.next() else {
        return Ok(None);
    };
    if parts.next().is_some() {
        return Err(ScanFlowError::Tag {
            tag: tag.to_string(),
            message: format!("more than one '{ID_SEPARATOR}' separator"),
        });
    }
    Ok(Some((base, MarkerId::new(id)?)))
}
