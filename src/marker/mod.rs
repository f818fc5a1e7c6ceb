//! Marker tracking: message builders, pure extractors and the lifecycle
//! registry.
//!
//! A marker is an operator-tracked index into scan data, identified by a
//! string id. For every tracked marker the registry maintains a derived
//! subgraph recomputing its extracted signal, energy, resource provenance
//! and frequency spectrum as upstream sources change.
//!
//! The builders in this module are the only sanctioned way to produce
//! marker control messages; they validate their inputs synchronously so
//! that malformed events (negative index, unknown status, bad id) fail at
//! the call site instead of inside the pipeline.

pub mod extract;
pub mod registry;

use crate::bus::message::{ready, MarkerStatus, Message, Payload, Seeds};
use crate::bus::tags::{
    scoped_tag, MarkerId, MARKER_SIGNAL_IDX, MARKER_STATUS, MARKER_TRACK, MARKER_UNTRACK,
    MARKER_UNTRACK_ALL,
};
use crate::error::{Result, ScanFlowError};
use std::str::FromStr;

pub use registry::{Effect, FftJob, MarkerRegistry};

/// Start tracking `marker_id`.
pub fn track(marker_id: &MarkerId, seeds: Seeds) -> Message {
    ready(
        MARKER_TRACK,
        Payload::Text(marker_id.as_str().to_string()),
        seeds,
    )
}

/// Stop tracking `marker_id`; its whole subgraph is torn down.
pub fn untrack(marker_id: &MarkerId, seeds: Seeds) -> Message {
    ready(
        MARKER_UNTRACK,
        Payload::Text(marker_id.as_str().to_string()),
        seeds,
    )
}

/// Stop tracking every marker at once.
pub fn untrack_all(seeds: Seeds) -> Message {
    ready(MARKER_UNTRACK_ALL, Payload::Empty, seeds)
}

/// Select scan row `signal_idx` for `marker_id`.
///
/// Negative indices are a usage error, rejected before the message enters
/// the pipeline.
pub fn bm_signal_idx(marker_id: &MarkerId, signal_idx: i64, seeds: Seeds) -> Result<Message> {
    if signal_idx < 0 {
        return Err(ScanFlowError::usage(format!(
            "signal_idx must be >= 0. Got {signal_idx}"
        )));
    }
    Ok(ready(
        scoped_tag(MARKER_SIGNAL_IDX, marker_id)?,
        Payload::Index(signal_idx as usize),
        seeds,
    ))
}

/// Enable or disable `marker_id`.
pub fn bm_status(marker_id: &MarkerId, status: MarkerStatus, seeds: Seeds) -> Result<Message> {
    Ok(ready(
        scoped_tag(MARKER_STATUS, marker_id)?,
        Payload::MarkerStatus(status),
        seeds,
    ))
}

impl FromStr for MarkerStatus {
    type Err = ScanFlowError;

    /// Parse a wire-level status value. Anything but `ENABLE` / `DISABLE`
    /// is a usage error.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ENABLE" => Ok(MarkerStatus::Enable),
            "DISABLE" => Ok(MarkerStatus::Disable),
            other => Err(ScanFlowError::usage(format!(
                "status must be ENABLE or DISABLE. Got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::Status;

    fn mid(s: &str) -> MarkerId {
        MarkerId::new(s).unwrap()
    }

    #[test]
    fn test_track_untrack_builders() {
        let bm = track(&mid("A"), Seeds::empty());
        assert_eq!(bm.tag, MARKER_TRACK);
        assert_eq!(bm.payload.as_text(), Some("A"));
        assert_eq!(bm.status, Status::Ready);

        let bm = untrack(&mid("A"), Seeds::empty());
        assert_eq!(bm.tag, MARKER_UNTRACK);

        let bm = untrack_all(Seeds::empty());
        assert_eq!(bm.tag, MARKER_UNTRACK_ALL);
        assert_eq!(bm.payload, Payload::Empty);
    }

    #[test]
    fn test_signal_idx_builder() {
        let bm = bm_signal_idx(&mid("A"), 5, Seeds::empty()).unwrap();
        assert_eq!(bm.tag, "MARKER_SIGNAL_IDX#A");
        assert_eq!(bm.payload.as_index(), Some(5));
    }

    #[test]
    fn test_negative_signal_idx_rejected() {
        let err = bm_signal_idx(&mid("A"), -1, Seeds::empty()).unwrap_err();
        assert!(err.to_string().contains("signal_idx must be >= 0"));
    }

    #[test]
    fn test_status_builder() {
        let bm = bm_status(&mid("A"), MarkerStatus::Enable, Seeds::empty()).unwrap();
        assert_eq!(bm.tag, "MARKER_STATUS#A");
        assert_eq!(bm.payload.as_marker_status(), Some(MarkerStatus::Enable));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "ENABLE".parse::<MarkerStatus>().unwrap(),
            MarkerStatus::Enable
        );
        assert_eq!(
            "DISABLE".parse::<MarkerStatus>().unwrap(),
            MarkerStatus::Disable
        );
        assert!("PAUSED".parse::<MarkerStatus>().is_err());
    }
}
