//! Marker lifecycle manager.
//!
//! An explicit registry maps each tracked marker id to a handle holding the
//! cached latest-input slots of its subgraph and a cancellation token for
//! any computation dispatched on its behalf. The registry is owned and
//! driven by a single coordinator thread; [`MarkerRegistry::handle_message`]
//! is fully synchronous and returns the effects to apply, which keeps every
//! join and lifecycle transition deterministic and testable without
//! threads.
//!
//! Lifecycle per id: UNBORN → ACTIVE → DEAD. DEAD is terminal for the
//! subgraph *instance* — a later track of the same id starts a fresh,
//! unrelated instance with a fresh cancellation token, so results of the
//! dead instance can never be mistaken for results of the new one.
//!
//! Joins follow combine-latest semantics: each input keeps exactly one
//! "latest" slot, and a recompute fires on every update of any input once
//! all slots are populated.

use crate::bus::message::{
    combine_seeds, error, ready, MarkerStatus, Message, Payload, Seeds, Status,
};
use crate::bus::tags::{
    derived_tag, split_scoped_tag, MarkerId, ASCAN, ENERGY, MARKER_FFT, MARKER_SIGNAL_IDX,
    MARKER_STATUS, MARKER_TRACK, MARKER_UNTRACK, MARKER_UNTRACK_ALL, RESOURCES, SAMPLING_RATE,
};
use crate::error::Result;
use crate::marker::extract::{extract_energy, extract_resources, extract_signal};
use crate::types::Hertz;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A spectrum computation to run on the worker pool.
///
/// Carries everything the worker needs, including the owning marker's
/// cancellation token: the worker checks it before computing and the
/// coordinator checks it again at result delivery, so a marker that died
/// while the job was in flight never produces output.
#[derive(Clone)]
pub struct FftJob {
    pub marker_id: MarkerId,
    pub tag: String,
    pub cancel: Arc<AtomicBool>,
    pub signal: Arc<Vec<f64>>,
    pub rate: Hertz,
    pub seeds: Seeds,
}

impl std::fmt::Debug for FftJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftJob")
            .field("marker_id", &self.marker_id)
            .field("tag", &self.tag)
            .field("samples", &self.signal.len())
            .field("rate", &self.rate)
            .finish()
    }
}

/// Outcome of feeding one message to the registry.
#[derive(Debug)]
pub enum Effect {
    /// Forward a derived message to the outbound stream.
    Emit(Message),
    /// Offload an FFT computation to the worker pool.
    Dispatch(FftJob),
}

/// Live subgraph state for one ACTIVE marker.
struct MarkerHandle {
    id: MarkerId,
    cancel: Arc<AtomicBool>,
    /// Latest `MARKER_STATUS#id` message; undefined until the first one.
    status: Option<Message>,
    /// Latest `MARKER_SIGNAL_IDX#id` message.
    signal_idx: Option<Message>,
    /// Latest READY extracted-signal message, input to the FFT join.
    last_signal: Option<Message>,
}

impl MarkerHandle {
    fn new(id: MarkerId) -> Self {
        Self {
            id,
            cancel: Arc::new(AtomicBool::new(false)),
            status: None,
            signal_idx: None,
            last_signal: None,
        }
    }

    fn is_enabled(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.payload.as_marker_status())
            == Some(MarkerStatus::Enable)
    }
}

/// One latest-value slot per upstream source, written only by the
/// coordinator.
#[derive(Default)]
struct SourceCache {
    signals: Option<Message>,
    energies: Option<Message>,
    resources: Option<Message>,
    sampling_rate: Option<Message>,
}

/// Which input of a marker's joins just changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Status or index update: every extractor joins on it.
    Control,
    Signals,
    Energies,
    Resources,
    SamplingRate,
}

/// Registry of active marker subgraphs. See the module docs for the
/// lifecycle and join semantics.
#[derive(Default)]
pub struct MarkerRegistry {
    markers: HashMap<MarkerId, MarkerHandle>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Static variant: every id in `ids` starts out ACTIVE, as if a track
    /// event had been processed for it at construction.
    pub fn with_tracked<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for id in ids {
            let id = MarkerId::new(id)?;
            registry.spawn(id);
        }
        Ok(registry)
    }

    /// Whether `id` is currently ACTIVE.
    pub fn is_tracked(&self, id: &MarkerId) -> bool {
        self.markers.contains_key(id)
    }

    /// Ids of all ACTIVE markers, in no particular order.
    pub fn tracked_ids(&self) -> Vec<MarkerId> {
        self.markers.keys().cloned().collect()
    }

    /// Cancellation token of an ACTIVE marker. Used by tests and by the
    /// engine to validate late results.
    pub fn cancel_token(&self, id: &MarkerId) -> Option<Arc<AtomicBool>> {
        self.markers.get(id).map(|h| Arc::clone(&h.cancel))
    }

    /// Feed one READY message to the registry and collect the effects.
    ///
    /// Non-READY messages are ignored (the engine filters them out already;
    /// this is a guard for direct use).
    pub fn handle_message(&mut self, sources: &mut SourceSlots, bm: &Message) -> Vec<Effect> {
        if bm.status != Status::Ready {
            tracing::debug!(tag = %bm.tag, status = ?bm.status, "ignoring non-READY message");
            return Vec::new();
        }

        match bm.tag.as_str() {
            MARKER_TRACK => self.on_track(bm),
            MARKER_UNTRACK => self.on_untrack(bm),
            MARKER_UNTRACK_ALL => self.on_untrack_all(),
            ASCAN => {
                sources.cache.signals = Some(bm.clone());
                self.recompute_all(sources, Trigger::Signals)
            }
            ENERGY => {
                sources.cache.energies = Some(bm.clone());
                self.recompute_all(sources, Trigger::Energies)
            }
            RESOURCES => {
                sources.cache.resources = Some(bm.clone());
                self.recompute_all(sources, Trigger::Resources)
            }
            SAMPLING_RATE => {
                sources.cache.sampling_rate = Some(bm.clone());
                self.recompute_all(sources, Trigger::SamplingRate)
            }
            _ => self.on_scoped(sources, bm),
        }
    }

    fn on_track(&mut self, bm: &Message) -> Vec<Effect> {
        let Some(id) = bm.payload.as_text().and_then(|s| MarkerId::new(s).ok()) else {
            tracing::warn!(payload = ?bm.payload, "track event without a valid marker id");
            return Vec::new();
        };
        if self.is_tracked(&id) {
            tracing::warn!(%id, "marker already tracked, ignoring duplicate track");
            return Vec::new();
        }
        self.spawn(id);
        Vec::new()
    }

    fn spawn(&mut self, id: MarkerId) {
        tracing::info!(%id, "marker ACTIVE");
        self.markers.insert(id.clone(), MarkerHandle::new(id));
    }

    fn on_untrack(&mut self, bm: &Message) -> Vec<Effect> {
        let Some(id) = bm.payload.as_text().and_then(|s| MarkerId::new(s).ok()) else {
            tracing::warn!(payload = ?bm.payload, "untrack event without a valid marker id");
            return Vec::new();
        };
        match self.markers.remove(&id) {
            Some(handle) => {
                handle.cancel.store(true, Ordering::SeqCst);
                tracing::info!(%id, "marker DEAD");
            }
            None => tracing::debug!(%id, "untrack for unknown marker"),
        }
        Vec::new()
    }

    fn on_untrack_all(&mut self) -> Vec<Effect> {
        for (id, handle) in self.markers.drain() {
            handle.cancel.store(true, Ordering::SeqCst);
            tracing::info!(%id, "marker DEAD (untrack-all)");
        }
        Vec::new()
    }

    fn on_scoped(&mut self, sources: &mut SourceSlots, bm: &Message) -> Vec<Effect> {
        let scoped = match split_scoped_tag(&bm.tag) {
            Ok(scoped) => scoped,
            Err(err) => {
                // A malformed tag is a usage error the publisher should see,
                // not a silent drop: surface it on the outbound stream with
                // the lineage intact.
                tracing::warn!(tag = %bm.tag, %err, "rejecting malformed scoped tag");
                return vec![Effect::Emit(error(bm.tag.clone(), &err, bm.seeds.clone()))];
            }
        };
        let Some((base, id)) = scoped else {
            tracing::debug!(tag = %bm.tag, "ignoring unrecognized tag");
            return Vec::new();
        };

        match base {
            MARKER_STATUS => {
                // A first status message for an unseen id spawns the marker.
                let handle = self.markers.entry(id.clone()).or_insert_with(|| {
                    tracing::info!(%id, "marker ACTIVE");
                    MarkerHandle::new(id.clone())
                });
                handle.status = Some(bm.clone());
                self.recompute_one(&id, sources, Trigger::Control)
            }
            MARKER_SIGNAL_IDX => match self.markers.get_mut(&id) {
                Some(handle) => {
                    handle.signal_idx = Some(bm.clone());
                    self.recompute_one(&id, sources, Trigger::Control)
                }
                None => {
                    tracing::debug!(%id, "signal index for untracked marker, dropping");
                    Vec::new()
                }
            },
            _ => {
                tracing::debug!(tag = %bm.tag, "ignoring unrecognized scoped tag");
                Vec::new()
            }
        }
    }

    fn recompute_all(&mut self, sources: &SourceSlots, trigger: Trigger) -> Vec<Effect> {
        let ids: Vec<MarkerId> = self.markers.keys().cloned().collect();
        let mut effects = Vec::new();
        for id in ids {
            effects.extend(self.recompute_one(&id, sources, trigger));
        }
        effects
    }

    /// Combine-latest tick for one marker: recompute every join the
    /// trigger participates in, using the latest cached value of the other
    /// inputs. Joins with an unpopulated slot stay quiet.
    fn recompute_one(&mut self, id: &MarkerId, sources: &SourceSlots, trigger: Trigger) -> Vec<Effect> {
        let Some(handle) = self.markers.get_mut(id) else {
            return Vec::new();
        };
        let cache = &sources.cache;
        let mut effects = Vec::new();

        let (status, signal_idx) = match (&handle.status, &handle.signal_idx) {
            (Some(s), Some(i)) => (s.clone(), i.clone()),
            // Control slots incomplete: no join can fire yet.
            _ => return effects,
        };

        let do_signal = matches!(trigger, Trigger::Control | Trigger::Signals);
        let do_energy = matches!(trigger, Trigger::Control | Trigger::Energies);
        let do_resources = matches!(trigger, Trigger::Control | Trigger::Resources);

        let mut signal_changed = false;
        if do_signal {
            if let Some(signals) = &cache.signals {
                if let Some(bm) = extract_signal(&handle.id, &status, &signal_idx, signals) {
                    if bm.status == Status::Ready {
                        handle.last_signal = Some(bm.clone());
                        signal_changed = true;
                    }
                    effects.push(Effect::Emit(bm));
                }
            }
        }

        if do_energy {
            if let Some(energies) = &cache.energies {
                if let Some(bm) = extract_energy(&handle.id, &status, &signal_idx, energies) {
                    effects.push(Effect::Emit(bm));
                }
            }
        }

        if do_resources {
            if let Some(resources) = &cache.resources {
                if let Some(bm) = extract_resources(&handle.id, &status, &signal_idx, resources) {
                    effects.push(Effect::Emit(bm));
                }
            }
        }

        // The FFT joins the *extracted* signal with the sampling rate: it
        // ticks when either of those changes, and stays silent while the
        // marker is disabled or no signal has been extracted yet.
        let fft_tick = signal_changed || trigger == Trigger::SamplingRate;
        if fft_tick && handle.is_enabled() {
            if let (Some(signal), Some(rate)) = (&handle.last_signal, &cache.sampling_rate) {
                effects.extend(Self::fft_effect(handle, signal, rate));
            }
        }

        effects
    }

    fn fft_effect(handle: &MarkerHandle, signal: &Message, rate: &Message) -> Option<Effect> {
        let tag = derived_tag(MARKER_FFT, &handle.id);
        let seeds = combine_seeds([&signal.seeds, &rate.seeds]);

        // Sentinel policy is uniform across extractors: an unavailable
        // signal yields an unavailable spectrum, not silence.
        if signal.payload.is_not_available() {
            return Some(Effect::Emit(ready(tag, Payload::NotAvailable, seeds)));
        }

        let samples = signal.payload.as_series()?;
        let rate_hz = rate.payload.as_sampling_rate()?;
        Some(Effect::Dispatch(FftJob {
            marker_id: handle.id.clone(),
            tag,
            cancel: Arc::clone(&handle.cancel),
            signal: Arc::clone(samples),
            rate: rate_hz,
            seeds,
        }))
    }
}

/// Coordinator-owned latest-value slots for the upstream sources.
///
/// Kept outside [`MarkerRegistry`] so that source updates and marker state
/// have distinct owners, but both are written exclusively by the
/// coordinator thread.
#[derive(Default)]
pub struct SourceSlots {
    cache: SourceCache,
}

impl SourceSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest sampling-rate message, if any arrived yet.
    pub fn sampling_rate(&self) -> Option<&Message> {
        self.cache.sampling_rate.as_ref()
    }

    /// Latest scan message, if any arrived yet.
    pub fn signals(&self) -> Option<&Message> {
        self.cache.signals.as_ref()
    }
}
