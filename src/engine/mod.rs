//! The dataflow engine: a coordinator thread composed with a worker pool.
//!
//! The coordinator owns every piece of mutable pipeline state (the marker
//! registry and the latest-value source slots) and is the only thread that
//! touches it. Inbound messages arrive on a bounded channel; derived
//! messages leave on another. Heavy numerics never run on the coordinator:
//! spectrum and whole-scan energy jobs go to the [`worker`] pool, and their
//! results re-enter the coordinator loop like any other event.
//!
//! Routing per READY inbound message:
//!
//! - `SHAPE` → emit a `UV` index grid.
//! - `ASCAN` → registry tick (extracted signals, FFT dispatch) plus a
//!   whole-scan energy job.
//! - everything else → registry tick (marker lifecycle, sources, joins).
//!
//! An `ENERGY` result is both forwarded outbound and fed back to the
//! registry as the energies source, so per-marker energy extraction ticks
//! on it.

pub mod worker;

use crate::bus::message::{node, processing, Message, Payload, Seeds, Status};
use crate::bus::tags::{ASCAN, ENERGY, SHAPE, UV};
use crate::config::EngineConfig;
use crate::error::{Result, ScanFlowError};
use crate::marker::registry::SourceSlots;
use crate::marker::{Effect, MarkerRegistry};
use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use worker::{accept_result, Job, WorkerOutput, WorkerPool};

/// A running engine instance.
pub struct Engine;

impl Engine {
    /// Spawn an engine with an initially empty marker registry.
    pub fn spawn(config: EngineConfig) -> Result<EngineHandle> {
        Self::spawn_with(config, MarkerRegistry::new())
    }

    /// Spawn an engine with a pre-populated registry, for deployments with
    /// a fixed marker set known at startup.
    pub fn spawn_with(config: EngineConfig, registry: MarkerRegistry) -> Result<EngineHandle> {
        let (inbound_tx, inbound_rx) = bounded::<Message>(config.inbound_capacity);
        let (outbound_tx, outbound_rx) = bounded::<Message>(config.outbound_capacity);
        let (result_tx, result_rx) = unbounded::<WorkerOutput>();

        let pool = WorkerPool::new(config.worker_threads, result_tx)?;
        let running = Arc::new(AtomicBool::new(true));

        let mut coordinator = Coordinator {
            inbound_rx,
            outbound_tx,
            result_rx,
            pool,
            registry,
            sources: SourceSlots::new(),
            running: Arc::clone(&running),
            idle_poll: config.idle_poll(),
        };
        let thread = std::thread::Builder::new()
            .name("scanflow-coordinator".to_string())
            .spawn(move || coordinator.run())?;

        Ok(EngineHandle {
            inbound_tx,
            outbound_rx,
            running,
            coordinator: Some(thread),
        })
    }
}

/// Client-side handle: publish inbound messages, consume derived ones,
/// shut the engine down. Dropping the handle shuts the engine down too.
pub struct EngineHandle {
    inbound_tx: Sender<Message>,
    outbound_rx: Receiver<Message>,
    running: Arc<AtomicBool>,
    coordinator: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Publish a message into the engine. Blocks when the inbound channel
    /// is full; fails once the engine has shut down.
    pub fn publish(&self, bm: Message) -> Result<()> {
        self.inbound_tx
            .send(bm)
            .map_err(|_| ScanFlowError::Channel("engine has shut down".to_string()))
    }

    /// Next derived message, or `None` when nothing arrives within
    /// `timeout` or the engine has shut down.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        self.outbound_rx.recv_timeout(timeout).ok()
    }

    /// Derived message already queued, if any.
    pub fn try_recv(&self) -> Option<Message> {
        self.outbound_rx.try_recv().ok()
    }

    /// Stop the coordinator and the worker pool, then wait for them.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.coordinator.take() {
            if thread.join().is_err() {
                tracing::error!("coordinator thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// The coordinator loop's state, owned by its thread alone.
struct Coordinator {
    inbound_rx: Receiver<Message>,
    outbound_tx: Sender<Message>,
    result_rx: Receiver<WorkerOutput>,
    pool: WorkerPool,
    registry: MarkerRegistry,
    sources: SourceSlots,
    running: Arc<AtomicBool>,
    idle_poll: Duration,
}

impl Coordinator {
    fn run(&mut self) {
        tracing::info!("coordinator started");
        while self.running.load(Ordering::SeqCst) {
            self.drain_results();
            match self.inbound_rx.recv_timeout(self.idle_poll) {
                Ok(bm) => self.route(bm),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // Finish whatever the workers already produced.
        self.pool.shutdown();
        self.drain_results();
        tracing::info!("coordinator stopped");
    }

    fn drain_results(&mut self) {
        loop {
            match self.result_rx.try_recv() {
                Ok(output) => self.deliver(output),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn deliver(&mut self, output: WorkerOutput) {
        let Some(bm) = accept_result(output) else {
            return;
        };
        // Energy results feed back in as the energies source before going
        // out, so marker joins tick on them.
        if bm.tag == ENERGY {
            let effects = self.registry.handle_message(&mut self.sources, &bm);
            self.emit(bm);
            self.apply_effects(effects);
        } else {
            self.emit(bm);
        }
    }

    fn route(&mut self, bm: Message) {
        if bm.status != Status::Ready {
            tracing::debug!(tag = %bm.tag, status = ?bm.status, "ignoring non-READY inbound");
            return;
        }
        // A message published without lineage still gets an origin: the
        // UNIDENTIFIED key survives every downstream union, recording that
        // no user action was attached to this cause.
        let bm = if bm.seeds.is_empty() {
            Message {
                seeds: Seeds::unidentified(),
                ..bm
            }
        } else {
            bm
        };
        match bm.tag.as_str() {
            SHAPE => {
                let uv = node(UV, bm.seeds.clone(), || match &bm.payload {
                    Payload::Shape(shape) => Ok(Payload::IndexGrid(Arc::new(shape.index_grid()))),
                    other => Err(ScanFlowError::compute(format!(
                        "expected shape payload on '{}', got {other:?}",
                        bm.tag
                    ))),
                });
                self.emit(uv);
            }
            ASCAN => {
                let effects = self.registry.handle_message(&mut self.sources, &bm);
                self.apply_effects(effects);
                if let Some(scan) = bm.payload.as_scan() {
                    self.emit(processing(ENERGY, None, None, bm.seeds.clone()));
                    self.submit(Job::Energy {
                        scan: Arc::clone(scan),
                        seeds: bm.seeds.clone(),
                    });
                } else {
                    tracing::warn!(payload = ?bm.payload, "scan message without a scan payload");
                }
            }
            _ => {
                let effects = self.registry.handle_message(&mut self.sources, &bm);
                self.apply_effects(effects);
            }
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Emit(bm) => self.emit(bm),
                Effect::Dispatch(job) => {
                    self.emit(processing(job.tag.clone(), None, None, job.seeds.clone()));
                    self.submit(Job::Fft(job));
                }
            }
        }
    }

    fn submit(&mut self, job: Job) {
        if let Err(err) = self.pool.submit(job) {
            tracing::error!(%err, "worker pool rejected a job");
        }
    }

    fn emit(&mut self, bm: Message) {
        // The consumer may stop draining and request shutdown while the
        // outbound channel is full; a blocked send must keep observing the
        // running flag or join() never returns.
        let mut bm = bm;
        loop {
            match self.outbound_tx.send_timeout(bm, self.idle_poll) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        tracing::debug!(tag = %returned.tag, "discarding undelivered message at shutdown");
                        return;
                    }
                    bm = returned;
                }
                // A closed outbound channel means every consumer is gone.
                Err(SendTimeoutError::Disconnected(_)) => {
                    tracing::info!("outbound channel closed, stopping");
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{ready, MarkerStatus, UNIDENTIFIED};
    use crate::bus::tags::{MarkerId, SAMPLING_RATE};
    use crate::marker::{bm_signal_idx, bm_status, track};
    use crate::types::{Hertz, Ordering as ScanOrdering, ScanMatrix, Shape};

    fn test_config() -> EngineConfig {
        EngineConfig {
            worker_threads: 1,
            idle_poll_ms: 5,
            ..EngineConfig::default()
        }
    }

    /// First READY message carrying `tag`; PROCESSING progress messages
    /// and unrelated tags are skipped.
    fn recv_ready(handle: &EngineHandle, tag: &str) -> Message {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if let Some(bm) = handle.recv_timeout(Duration::from_millis(100)) {
                if bm.tag == tag && bm.status == Status::Ready {
                    return bm;
                }
            }
        }
        panic!("no READY '{tag}' message within the deadline");
    }

    #[test]
    fn test_shape_yields_uv_grid() {
        let handle = Engine::spawn(test_config()).unwrap();
        handle
            .publish(ready(
                SHAPE,
                Payload::Shape(Shape {
                    ordering: ScanOrdering::Snake,
                    height: 3,
                    width: 3,
                }),
                Seeds::empty(),
            ))
            .unwrap();

        let uv = recv_ready(&handle, UV);
        assert_eq!(uv.status, Status::Ready);
        match uv.payload {
            Payload::IndexGrid(grid) => {
                assert_eq!(*grid, vec![vec![0, 1, 2], vec![5, 4, 3], vec![6, 7, 8]]);
            }
            other => panic!("expected an index grid, got {other:?}"),
        }
        handle.shutdown();
    }

    #[test]
    fn test_scan_produces_energy() {
        let handle = Engine::spawn(test_config()).unwrap();
        let scan = ScanMatrix::from_rows(2, 2, vec![1.0, 2.0, 3.0, 0.0]).unwrap();
        handle
            .publish(ready(ASCAN, Payload::Scan(Arc::new(scan)), Seeds::empty()).identify("s-1"))
            .unwrap();

        let energy = recv_ready(&handle, ENERGY);
        assert_eq!(energy.status, Status::Ready);
        assert_eq!(energy.payload, Payload::Series(Arc::new(vec![5.0, 9.0])));
        assert!(energy.seeds.contains(ASCAN));
        handle.shutdown();
    }

    #[test]
    fn test_marker_spectrum_end_to_end() {
        let id = MarkerId::new("A").unwrap();
        let handle = Engine::spawn(test_config()).unwrap();

        handle.publish(track(&id, Seeds::empty())).unwrap();
        handle
            .publish(bm_status(&id, MarkerStatus::Enable, Seeds::empty()).unwrap())
            .unwrap();
        handle
            .publish(bm_signal_idx(&id, 1, Seeds::empty()).unwrap())
            .unwrap();
        handle
            .publish(ready(
                SAMPLING_RATE,
                Payload::SamplingRate(Hertz(8.0)),
                Seeds::empty(),
            ))
            .unwrap();
        handle
            .publish(ready(
                ASCAN,
                Payload::Scan(Arc::new(ScanMatrix::counting(4, 8))),
                Seeds::empty(),
            ))
            .unwrap();

        let signal = recv_ready(&handle, "MARKER_SIGNAL#A");
        assert_eq!(
            signal.payload,
            Payload::Series(Arc::new((8..16).map(|i| i as f64).collect()))
        );

        let fft = recv_ready(&handle, "MARKER_FFT#A");
        assert_eq!(fft.status, Status::Ready);
        match fft.payload {
            Payload::Spectrum(spectrum) => assert_eq!(spectrum.len(), 5),
            other => panic!("expected a spectrum, got {other:?}"),
        }
        handle.shutdown();
    }

    #[test]
    fn test_non_ready_inbound_is_ignored() {
        let handle = Engine::spawn(test_config()).unwrap();
        handle
            .publish(processing(ASCAN, Some((1, 2)), None, Seeds::empty()))
            .unwrap();
        handle
            .publish(ready(
                SHAPE,
                Payload::Shape(Shape {
                    ordering: ScanOrdering::RowMajor,
                    height: 1,
                    width: 2,
                }),
                Seeds::empty(),
            ))
            .unwrap();

        // Only the UV message comes out; the PROCESSING inbound was dropped.
        let first = recv_ready(&handle, UV);
        assert_eq!(first.tag, UV);
        handle.shutdown();
    }

    #[test]
    fn test_empty_lineage_defaults_to_unidentified() {
        let handle = Engine::spawn(test_config()).unwrap();
        handle
            .publish(ready(
                SHAPE,
                Payload::Shape(Shape {
                    ordering: ScanOrdering::RowMajor,
                    height: 2,
                    width: 2,
                }),
                Seeds::empty(),
            ))
            .unwrap();

        let uv = recv_ready(&handle, UV);
        assert!(uv.seeds.contains(UNIDENTIFIED));
        handle.shutdown();
    }

    #[test]
    fn test_shutdown_completes_when_consumer_stops_draining() {
        let config = EngineConfig {
            worker_threads: 1,
            idle_poll_ms: 5,
            outbound_capacity: 1,
            ..EngineConfig::default()
        };
        let handle = Engine::spawn(config).unwrap();
        for _ in 0..3 {
            handle
                .publish(ready(
                    SHAPE,
                    Payload::Shape(Shape {
                        ordering: ScanOrdering::RowMajor,
                        height: 2,
                        width: 2,
                    }),
                    Seeds::empty(),
                ))
                .unwrap();
        }
        // Give the coordinator time to fill the outbound channel and block
        // on the next emit.
        std::thread::sleep(Duration::from_millis(100));

        let (done_tx, done_rx) = bounded(1);
        std::thread::spawn(move || {
            handle.shutdown();
            let _ = done_tx.send(());
        });
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("shutdown must finish even when nothing drains the outbound stream");
    }
}
