//! The bus message envelope and seed lineage.
//!
//! Every event in the system is a [`Message`]: an immutable
//! `{tag, status, payload, seeds}` envelope. Transformations always build a
//! new message, never mutate one in place.
//!
//! `seeds` is the provenance record: a map from an originating event's tag
//! to the set of unique ids marking the user actions that caused it. The
//! core invariant is that a derived message's seeds are the union of the
//! seeds of every message that contributed to it — no contributing
//! identifier is ever dropped. [`combine_seeds`] is the only sanctioned way
//! to merge lineage, and [`Message::identify`] is the only way to start a
//! fresh chain.

use crate::analysis::Spectrum;
use crate::error::{Result, ScanFlowError};
use crate::types::{Hertz, Resource, ResourceHit, ScanMatrix, Shape};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Seed key for messages that were not triggered by an identified action.
pub const UNIDENTIFIED: &str = "UNIDENTIFIED";

/// Lifecycle status of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ready,
    Processing,
    Error,
}

/// Enablement of a tracked marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkerStatus {
    Enable,
    Disable,
}

/// Provenance map: originating tag → set of unique cause ids.
///
/// Backed by ordered collections so that equality, iteration and the wire
/// encoding are deterministic regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Seeds(BTreeMap<String, BTreeSet<String>>);

impl Seeds {
    /// Empty seed map.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The default lineage of constructor-made messages: a single
    /// `UNIDENTIFIED` key with no ids.
    pub fn unidentified() -> Self {
        let mut map = BTreeMap::new();
        map.insert(UNIDENTIFIED.to_string(), BTreeSet::new());
        Self(map)
    }

    /// Single-entry map `{tag: {uid}}`.
    pub fn single(tag: impl Into<String>, uid: impl Into<String>) -> Self {
        let mut ids = BTreeSet::new();
        ids.insert(uid.into());
        let mut map = BTreeMap::new();
        map.insert(tag.into(), ids);
        Self(map)
    }

    /// Whether `tag` is recorded as an origin.
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains_key(tag)
    }

    /// Cause ids recorded for `tag`.
    pub fn ids(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.0.get(tag)
    }

    /// Iterate over `(tag, ids)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }

    /// Number of origin tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no origin is recorded at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key-wise set-union with `other`.
    pub fn union(&self, other: &Seeds) -> Seeds {
        let mut merged = self.0.clone();
        for (tag, ids) in &other.0 {
            merged
                .entry(tag.clone())
                .or_default()
                .extend(ids.iter().cloned());
        }
        Seeds(merged)
    }
}

/// Merge any number of seed maps into one.
///
/// Commutative and associative; absent keys in one input never remove keys
/// present in another.
pub fn combine_seeds<'a>(seedss: impl IntoIterator<Item = &'a Seeds>) -> Seeds {
    seedss
        .into_iter()
        .fold(Seeds::empty(), |acc, s| acc.union(s))
}

/// Typed message payload. Interpretation depends on the message tag.
///
/// `NotAvailable` is the sentinel for a well-formed but currently absent
/// value (e.g. an out-of-range lookup) — it travels with READY status and
/// is distinct from an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// No payload (e.g. untrack-all).
    Empty,
    /// Well-formed but absent result.
    NotAvailable,
    /// Free-form text (marker ids on track/untrack events).
    Text(String),
    /// Row selector into the current scan.
    Index(usize),
    /// Bare scalar value.
    Scalar(f64),
    /// Sampling rate source value.
    SamplingRate(Hertz),
    /// 1-D series: an extracted waveform or the per-row energies.
    Series(Arc<Vec<f64>>),
    /// 2-D scan data.
    Scan(Arc<ScanMatrix>),
    /// Resource metadata source value.
    Resources(Arc<Vec<Resource>>),
    /// Per-resource lookup results for one marker.
    ResourceHits(Vec<ResourceHit>),
    /// Frequency spectrum of an extracted waveform.
    Spectrum(Arc<Spectrum>),
    /// Scan grid layout.
    Shape(Shape),
    /// Display-ordered grid of scan-row indices.
    IndexGrid(Arc<Vec<Vec<usize>>>),
    /// Marker enablement.
    MarkerStatus(MarkerStatus),
    /// Progress report: `(step, total)` plus free-form metadata.
    Progress {
        ratio: Option<(u32, u32)>,
        meta: Option<String>,
    },
    /// Failure description carried by ERROR-status messages.
    Failure(String),
}

impl Payload {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Payload::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_scan(&self) -> Option<&Arc<ScanMatrix>> {
        match self {
            Payload::Scan(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&Arc<Vec<f64>>> {
        match self {
            Payload::Series(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_marker_status(&self) -> Option<MarkerStatus> {
        match self {
            Payload::MarkerStatus(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_sampling_rate(&self) -> Option<Hertz> {
        match self {
            Payload::SamplingRate(r) => Some(*r),
            _ => None,
        }
    }

    /// Whether this is the NOT_AVAILABLE sentinel.
    pub fn is_not_available(&self) -> bool {
        matches!(self, Payload::NotAvailable)
    }
}

/// Immutable bus message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub tag: String,
    pub status: Status,
    pub payload: Payload,
    pub seeds: Seeds,
}

impl Message {
    /// Returns a new message whose seeds are **replaced** by the
    /// single-entry map `{self.tag: {uid}}`, discarding any previous
    /// lineage. This marks the message as the root of a new provenance
    /// chain.
    pub fn identify(&self, uid: impl Into<String>) -> Message {
        Message {
            tag: self.tag.clone(),
            status: self.status,
            payload: self.payload.clone(),
            seeds: Seeds::single(self.tag.clone(), uid),
        }
    }
}

/// Returns a bus message with a READY status.
pub fn ready(tag: impl Into<String>, payload: Payload, seeds: Seeds) -> Message {
    Message {
        tag: tag.into(),
        status: Status::Ready,
        payload,
        seeds,
    }
}

/// Returns a bus message with a PROCESSING status.
///
/// `ratio` is the step that has just been processed and the total number of
/// steps.
pub fn processing(
    tag: impl Into<String>,
    ratio: Option<(u32, u32)>,
    meta: Option<String>,
    seeds: Seeds,
) -> Message {
    Message {
        tag: tag.into(),
        status: Status::Processing,
        payload: Payload::Progress { ratio, meta },
        seeds,
    }
}

/// Returns a bus message with an ERROR status.
pub fn error(tag: impl Into<String>, err: &ScanFlowError, seeds: Seeds) -> Message {
    Message {
        tag: tag.into(),
        status: Status::Error,
        payload: Payload::Failure(err.to_string()),
        seeds,
    }
}

/// Node boundary: run a derived-value computation and wrap its outcome.
///
/// A successful computation becomes a READY message; a failed one becomes
/// an ERROR message with the same tag and the same combined lineage. The
/// failure never escapes to the caller, so one broken computation cannot
/// tear down its subgraph.
pub fn node(
    tag: impl Into<String>,
    seeds: Seeds,
    compute: impl FnOnce() -> Result<Payload>,
) -> Message {
    let tag = tag.into();
    match compute() {
        Ok(payload) => ready(tag, payload, seeds),
        Err(err) => {
            tracing::debug!(%tag, %err, "node computation failed");
            error(tag, &err, seeds)
        }
    }
}
