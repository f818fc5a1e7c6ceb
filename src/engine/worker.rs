//! Worker pool for numeric offloading.
//!
//! Spectrum and whole-scan energy computations run on a small pool of
//! dedicated threads so the coordinator stays responsive. Results come
//! back over a channel; cancellation is structural, not cooperative
//! mid-computation: a job's token is checked once before computing and
//! once more at delivery by [`accept_result`], so output of a marker that
//! died while its job was in flight is dropped either way.

use crate::analysis::{compute_energy, compute_spectrum};
use crate::bus::message::{ready, Message, Payload, Seeds};
use crate::bus::tags::ENERGY;
use crate::error::{Result, ScanFlowError};
use crate::marker::FftJob;
use crate::types::ScanMatrix;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A unit of offloaded work.
#[derive(Debug)]
pub enum Job {
    /// Spectrum of one marker's extracted waveform.
    Fft(FftJob),
    /// Per-row energy of a whole scan.
    Energy { scan: Arc<ScanMatrix>, seeds: Seeds },
}

/// A finished job, not yet validated for delivery.
#[derive(Debug)]
pub struct WorkerOutput {
    pub message: Message,
    /// Cancellation token of the dispatching marker, if the job had one.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Delivery-side cancellation check.
///
/// Run by the coordinator when a result arrives: a token flipped after the
/// job was computed still suppresses the output.
pub fn accept_result(output: WorkerOutput) -> Option<Message> {
    match &output.cancel {
        Some(token) if token.load(Ordering::SeqCst) => {
            tracing::debug!(tag = %output.message.tag, "dropping result of a dead marker");
            None
        }
        _ => Some(output.message),
    }
}

/// Fixed-size pool of computation threads.
///
/// Dropping the pool closes the job channel and joins every thread.
pub struct WorkerPool {
    job_tx: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one) sending their results to
    /// `result_tx`.
    pub fn new(threads: usize, result_tx: Sender<WorkerOutput>) -> Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let mut handles = Vec::new();
        for i in 0..threads.max(1) {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("scanflow-worker-{i}"))
                .spawn(move || worker_loop(jobs, results))?;
            handles.push(handle);
        }
        Ok(Self {
            job_tx: Some(job_tx),
            handles,
        })
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        let tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| ScanFlowError::Channel("worker pool is shut down".to_string()))?;
        tx.send(job)
            .map_err(|_| ScanFlowError::Channel("worker pool is shut down".to_string()))
    }

    /// Close the job channel and wait for every worker to exit.
    pub fn shutdown(&mut self) {
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(jobs: Receiver<Job>, results: Sender<WorkerOutput>) {
    while let Ok(job) = jobs.recv() {
        let Some(output) = run_job(job) else {
            continue;
        };
        // A closed result channel means the coordinator is gone.
        if results.send(output).is_err() {
            break;
        }
    }
    tracing::debug!("worker thread exiting");
}

fn run_job(job: Job) -> Option<WorkerOutput> {
    match job {
        Job::Fft(job) => {
            if job.cancel.load(Ordering::SeqCst) {
                tracing::debug!(tag = %job.tag, "skipping spectrum job of a dead marker");
                return None;
            }
            let spectrum = compute_spectrum(&job.signal, job.rate);
            Some(WorkerOutput {
                message: ready(job.tag, Payload::Spectrum(Arc::new(spectrum)), job.seeds),
                cancel: Some(job.cancel),
            })
        }
        Job::Energy { scan, seeds } => {
            let energies = compute_energy(&scan);
            Some(WorkerOutput {
                message: ready(ENERGY, Payload::Series(Arc::new(energies)), seeds),
                cancel: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::tags::MarkerId;
    use crate::types::Hertz;
    use std::time::Duration;

    fn fft_job(cancel: Arc<AtomicBool>) -> FftJob {
        FftJob {
            marker_id: MarkerId::new("A").unwrap(),
            tag: "MARKER_FFT#A".to_string(),
            cancel,
            signal: Arc::new(vec![1.0, 0.0, -1.0, 0.0]),
            rate: Hertz(4.0),
            seeds: Seeds::empty(),
        }
    }

    #[test]
    fn test_cancelled_job_is_skipped_before_compute() {
        let cancel = Arc::new(AtomicBool::new(true));
        assert!(run_job(Job::Fft(fft_job(cancel))).is_none());
    }

    #[test]
    fn test_result_dropped_when_cancelled_after_compute() {
        let cancel = Arc::new(AtomicBool::new(false));
        let output = run_job(Job::Fft(fft_job(Arc::clone(&cancel)))).unwrap();

        cancel.store(true, Ordering::SeqCst);
        assert!(accept_result(output).is_none());
    }

    #[test]
    fn test_live_result_is_delivered() {
        let cancel = Arc::new(AtomicBool::new(false));
        let output = run_job(Job::Fft(fft_job(cancel))).unwrap();
        let bm = accept_result(output).expect("token untouched");
        assert_eq!(bm.tag, "MARKER_FFT#A");
        assert!(matches!(bm.payload, Payload::Spectrum(_)));
    }

    #[test]
    fn test_energy_job_through_pool() {
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let pool = WorkerPool::new(2, result_tx).unwrap();

        pool.submit(Job::Energy {
            scan: Arc::new(ScanMatrix::from_rows(2, 3, vec![1.0, 2.0, 3.0, 0.0, 0.0, 2.0]).unwrap()),
            seeds: Seeds::empty(),
        })
        .unwrap();

        let output = result_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("energy result");
        assert!(output.cancel.is_none());
        let bm = accept_result(output).unwrap();
        assert_eq!(bm.tag, ENERGY);
        assert_eq!(
            bm.payload,
            Payload::Series(Arc::new(vec![14.0, 4.0]))
        );
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let (result_tx, _result_rx) = crossbeam_channel::unbounded();
        let mut pool = WorkerPool::new(1, result_tx).unwrap();
        pool.shutdown();
        let err = pool
            .submit(Job::Energy {
                scan: Arc::new(ScanMatrix::counting(1, 1)),
                seeds: Seeds::empty(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("shut down"));
    }
}
