//! # ScanFlow: live dataflow backend for instrument-scan viewing
//!
//! A message-driven pipeline that turns raw instrument scans into the
//! derived values a viewer displays: per-marker waveforms, energies,
//! resource provenance and frequency spectra, plus whole-scan energy and
//! display-order index grids.
//!
//! ## Architecture
//!
//! - **Bus**: tagged messages with provenance seeds and a predicate
//!   routing language ([`bus`])
//! - **Markers**: a registry of per-marker derived subgraphs with
//!   combine-latest joins and enable/disable gating ([`marker`])
//! - **Analysis**: FFT and energy kernels ([`analysis`])
//! - **Engine**: a coordinator thread composed with a worker pool;
//!   crossbeam channels in and out ([`engine`])
//!
//! ## Example
//!
//! ```no_run
//! use scanflow::bus::{ready, Payload, Seeds};
//! use scanflow::config::EngineConfig;
//! use scanflow::engine::Engine;
//! use scanflow::types::ScanMatrix;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> scanflow::error::Result<()> {
//!     let handle = Engine::spawn(EngineConfig::default())?;
//!
//!     let scan = ScanMatrix::counting(10, 6);
//!     handle.publish(ready(
//!         scanflow::bus::tags::ASCAN,
//!         Payload::Scan(Arc::new(scan)),
//!         Seeds::empty(),
//!     ))?;
//!
//!     while let Some(bm) = handle.recv_timeout(Duration::from_millis(200)) {
//!         println!("{}: {:?}", bm.tag, bm.status);
//!     }
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod marker;
pub mod types;

// Re-export commonly used types
pub use bus::{Message, Payload, Seeds, Status, TypePredicate};
pub use config::EngineConfig;
pub use engine::{Engine, EngineHandle};
pub use error::{Result, ScanFlowError};
pub use marker::MarkerRegistry;
