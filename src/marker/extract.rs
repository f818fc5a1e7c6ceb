//! Pure per-marker extraction functions.
//!
//! Each extractor maps the joined triple (status, index, source) to at most
//! one derived message:
//!
//! - DISABLE status produces **no output at all** — downstream consumers
//!   observe complete silence, which is distinguishable from "available but
//!   empty".
//! - An out-of-range index is data, not failure: the derived payload is the
//!   `NotAvailable` sentinel and the status stays READY.
//! - Output seeds are always the three-way union of the input seeds.
//! - A failed computation (e.g. a payload of the wrong kind) is converted
//!   at the node boundary into an ERROR message with the node's tag and the
//!   combined lineage.
//!
//! Extractors own no state; the registry caches the latest inputs and calls
//! them on every tick.

use crate::bus::message::{combine_seeds, node, MarkerStatus, Message, Payload, Seeds};
use crate::bus::tags::{derived_tag, MarkerId, MARKER_ENERGY, MARKER_RESOURCES, MARKER_SIGNAL};
use crate::error::ScanFlowError;
use std::sync::Arc;

/// Gating outcome shared by all extractors.
enum Gate {
    Open,
    Silent,
    /// Status payload was not a marker status — programmer error, surfaced
    /// as an ERROR message.
    Broken,
}

fn gate(status: &Message) -> Gate {
    match status.payload.as_marker_status() {
        Some(MarkerStatus::Enable) => Gate::Open,
        Some(MarkerStatus::Disable) => Gate::Silent,
        None => Gate::Broken,
    }
}

fn broken_status(tag: String, seeds: Seeds, status: &Message) -> Message {
    let detail = format!(
        "expected a marker status payload on '{}', got {:?}",
        status.tag, status.payload
    );
    node(tag, seeds, || Err(ScanFlowError::compute(detail)))
}

/// Extract the waveform selected by `signal_idx` from the scan.
///
/// Derived tag: `MARKER_SIGNAL#<id>`.
pub fn extract_signal(
    marker_id: &MarkerId,
    status: &Message,
    signal_idx: &Message,
    signals: &Message,
) -> Option<Message> {
    let tag = derived_tag(MARKER_SIGNAL, marker_id);
    let seeds = combine_seeds([&status.seeds, &signal_idx.seeds, &signals.seeds]);
    match gate(status) {
        Gate::Silent => return None,
        Gate::Broken => return Some(broken_status(tag, seeds, status)),
        Gate::Open => {}
    }

    Some(node(tag, seeds, || {
        let idx = require_index(signal_idx)?;
        let scan = signals
            .payload
            .as_scan()
            .ok_or_else(|| wrong_payload("scan matrix", signals))?;
        Ok(match scan.row(idx) {
            Some(row) => Payload::Series(Arc::new(row.to_vec())),
            None => Payload::NotAvailable,
        })
    }))
}

/// Extract the per-row energy selected by `signal_idx`.
///
/// Derived tag: `MARKER_ENERGY#<id>`.
pub fn extract_energy(
    marker_id: &MarkerId,
    status: &Message,
    signal_idx: &Message,
    energies: &Message,
) -> Option<Message> {
    let tag = derived_tag(MARKER_ENERGY, marker_id);
    let seeds = combine_seeds([&status.seeds, &signal_idx.seeds, &energies.seeds]);
    match gate(status) {
        Gate::Silent => return None,
        Gate::Broken => return Some(broken_status(tag, seeds, status)),
        Gate::Open => {}
    }

    Some(node(tag, seeds, || {
        let idx = require_index(signal_idx)?;
        let series = energies
            .payload
            .as_series()
            .ok_or_else(|| wrong_payload("energy series", energies))?;
        Ok(match series.get(idx) {
            Some(&e) => Payload::Scalar(e),
            None => Payload::NotAvailable,
        })
    }))
}

/// Resolve every resource record at the row selected by `signal_idx`.
///
/// Derived tag: `MARKER_RESOURCES#<id>`. Each resource field falls back to
/// its own per-field NOT_AVAILABLE (`None`) independently.
pub fn extract_resources(
    marker_id: &MarkerId,
    status: &Message,
    signal_idx: &Message,
    resources: &Message,
) -> Option<Message> {
    let tag = derived_tag(MARKER_RESOURCES, marker_id);
    let seeds = combine_seeds([&status.seeds, &signal_idx.seeds, &resources.seeds]);
    match gate(status) {
        Gate::Silent => return None,
        Gate::Broken => return Some(broken_status(tag, seeds, status)),
        Gate::Open => {}
    }

    Some(node(tag, seeds, || {
        let idx = require_index(signal_idx)?;
        let records = match &resources.payload {
            Payload::Resources(r) => r,
            _ => return Err(wrong_payload("resource records", resources)),
        };
        let hits = records.iter().map(|r| r.lookup(idx)).collect();
        Ok(Payload::ResourceHits(hits))
    }))
}

fn require_index(signal_idx: &Message) -> Result<usize, ScanFlowError> {
    signal_idx
        .payload
        .as_index()
        .ok_or_else(|| wrong_payload("signal index", signal_idx))
}

fn wrong_payload(expected: &str, got: &Message) -> ScanFlowError {
    ScanFlowError::compute(format!(
        "expected {expected} payload on '{}', got {:?}",
        got.tag, got.payload
    ))
}
