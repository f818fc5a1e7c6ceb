//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use scanflow::bus::{ready, Payload, Seeds, Status};
use scanflow::bus::tags::{ASCAN, SAMPLING_RATE};
use scanflow::types::{Hertz, ScanMatrix};
use scanflow::{EngineConfig, EngineHandle, Message};
use std::sync::Arc;
use std::sync::Once;
use std::time::{Duration, Instant};

static TRACING: Once = Once::new();

/// Initialize tracing once for the whole test binary; `RUST_LOG` controls
/// verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Engine config tuned for fast test turnaround.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        worker_threads: 2,
        idle_poll_ms: 5,
        ..EngineConfig::default()
    }
}

/// A 10x6 scan whose values count up row by row: row 5 is 30..36.
pub fn counting_scan() -> Message {
    ready(
        ASCAN,
        Payload::Scan(Arc::new(ScanMatrix::counting(10, 6))),
        Seeds::empty(),
    )
    .identify("scan-1")
}

pub fn sampling_rate(hz: f64) -> Message {
    ready(SAMPLING_RATE, Payload::SamplingRate(Hertz(hz)), Seeds::empty()).identify("rate-1")
}

/// First READY message carrying `tag` within five seconds, skipping
/// everything else.
pub fn recv_ready(handle: &EngineHandle, tag: &str) -> Message {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(bm) = handle.recv_timeout(Duration::from_millis(100)) {
            if bm.tag == tag && bm.status == Status::Ready {
                return bm;
            }
        }
    }
    panic!("no READY '{tag}' message within the deadline");
}

/// Wait until a READY message has been seen for every tag in `tags`,
/// in any order, skipping everything else. Same five-second deadline as
/// [`recv_ready`]; outputs produced by one registry tick carry no
/// cross-marker ordering guarantee.
pub fn recv_ready_all(handle: &EngineHandle, tags: &[&str]) {
    let mut pending: Vec<&str> = tags.to_vec();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !pending.is_empty() && Instant::now() < deadline {
        if let Some(bm) = handle.recv_timeout(Duration::from_millis(100)) {
            if bm.status == Status::Ready {
                pending.retain(|tag| *tag != bm.tag);
            }
        }
    }
    assert!(
        pending.is_empty(),
        "no READY {pending:?} message within the deadline"
    );
}

/// Collect every message that arrives until the stream stays quiet for
/// `quiet` in a row.
pub fn drain(handle: &EngineHandle, quiet: Duration) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some(bm) = handle.recv_timeout(quiet) {
        out.push(bm);
    }
    out
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
