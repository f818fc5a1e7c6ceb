//! Engine configuration.
//!
//! A small, flat TOML file controls channel capacities and the size of the
//! worker pool. Every field has a default, so a missing or partial file is
//! not an error; a malformed one is.

use crate::error::{Result, ResultExt, ScanFlowError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of worker threads for offloaded computations.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default capacity of the inbound message channel.
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// Default capacity of the outbound message channel.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Default coordinator idle poll interval in milliseconds.
pub const DEFAULT_IDLE_POLL_MS: u64 = 50;

/// Runtime knobs of a running engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Threads in the computation worker pool. Zero is clamped to one.
    pub worker_threads: usize,

    /// Bounded capacity of the inbound channel; publishers block when the
    /// coordinator falls behind.
    pub inbound_capacity: usize,

    /// Bounded capacity of the outbound channel; the coordinator blocks
    /// when consumers fall behind.
    pub outbound_capacity: usize,

    /// How often the coordinator wakes to check the shutdown flag when no
    /// messages arrive.
    pub idle_poll_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(ScanFlowError::Io)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).map_err(|e| {
            ScanFlowError::Config(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist. A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}
