//! Core data types for scanflow.
//!
//! This module contains the shared value types carried by bus messages:
//!
//! - [`ScanMatrix`] - 2-D array of per-position waveforms (rows = waveforms)
//! - [`Resource`] - provenance record mapping scan rows to source records
//! - [`ResourceHit`] - the per-row lookup result for one resource
//! - [`Shape`] / [`Ordering`] - scan layout used by the index-ordering view
//! - [`Quantity`] / [`Hertz`] - opaque numeric value carrier seam
//! - [`ResourceStore`] - persistence seam for resource metadata
//!
//! Everything here is plain data shared by reference (`Arc`) through message
//! payloads; nothing is mutated after construction.

use crate::error::{Result, ScanFlowError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A 2-D array of waveforms in row-major storage. Row `i` is the waveform
/// recorded at scan position `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl ScanMatrix {
    /// Build a matrix from row-major data. The data length must be
    /// `rows * cols`.
    pub fn from_rows(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(ScanFlowError::usage(format!(
                "scan matrix of {}x{} requires {} values, got {}",
                rows,
                cols,
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Matrix filled with `0..rows*cols` counting up — handy for tests and
    /// demos.
    pub fn counting(rows: usize, cols: usize) -> Self {
        let data = (0..rows * cols).map(|i| i as f64).collect();
        Self { rows, cols, data }
    }

    /// Number of waveform rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Samples per waveform.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Waveform at row `idx`, or `None` when out of range.
    pub fn row(&self, idx: usize) -> Option<&[f64]> {
        if idx < self.rows {
            Some(&self.data[idx * self.cols..(idx + 1) * self.cols])
        } else {
            None
        }
    }

    /// Iterate over all rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }
}

/// Maps every scan row back to the record it came from.
///
/// `row_index[i]` selects an entry of `names`; `index_in_resource[i]` is the
/// position of row `i` inside that record. A scan can carry several
/// resources of different types at once (e.g. source files and sensor
/// groups).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type discriminator, e.g. [`RESOURCE_TYPE_FILE`].
    pub rtype: String,
    /// Record names, indexed by `row_index` entries.
    pub names: Vec<String>,
    /// Per-scan-row record index.
    pub row_index: Vec<usize>,
    /// Per-scan-row position within the record.
    pub index_in_resource: Vec<usize>,
}

/// Resource type for file-backed records.
pub const RESOURCE_TYPE_FILE: &str = "FILE";

/// Lookup result of one [`Resource`] at one scan row.
///
/// Each field falls back to `None` on its own out-of-range condition —
/// partial failure is per-field, not all-or-nothing. `None` is the
/// NOT_AVAILABLE sentinel at field granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHit {
    pub rtype: String,
    pub name: Option<String>,
    pub record: Option<usize>,
    pub index_in_record: Option<usize>,
}

impl Resource {
    /// Resolve this resource at scan row `idx`.
    pub fn lookup(&self, idx: usize) -> ResourceHit {
        let record = self.row_index.get(idx).copied();
        let index_in_record = self.index_in_resource.get(idx).copied();
        let name = record.and_then(|r| self.names.get(r).cloned());
        ResourceHit {
            rtype: self.rtype.clone(),
            name,
            record,
            index_in_record,
        }
    }
}

/// Traversal order of scan positions on the physical surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Ordering {
    /// Boustrophedon: every odd row is traversed right-to-left.
    #[default]
    Snake,
    /// Plain row-major traversal.
    RowMajor,
}

/// Scan grid layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub ordering: Ordering,
    pub height: usize,
    pub width: usize,
}

impl Shape {
    /// Grid of scan-row indices laid out in display order.
    ///
    /// For [`Ordering::Snake`] every odd grid row is reversed so that
    /// consecutive indices stay physically adjacent.
    pub fn index_grid(&self) -> Vec<Vec<usize>> {
        let mut grid: Vec<Vec<usize>> = (0..self.height)
            .map(|r| (r * self.width..(r + 1) * self.width).collect())
            .collect();
        if self.ordering == Ordering::Snake {
            for row in grid.iter_mut().skip(1).step_by(2) {
                row.reverse();
            }
        }
        grid
    }
}

/// Opaque numeric value carrier with a unit — the seam to the external
/// quantity/unit algebra. Only `value`/`unit` access and a conversion hook
/// are consumed here.
pub trait Quantity {
    /// Numeric value in the quantity's own unit.
    fn value(&self) -> f64;

    /// Unit symbol.
    fn unit(&self) -> &str;

    /// Value converted to `unit`. Errors on unknown units.
    fn convert(&self, unit: &str) -> Result<f64>;
}

/// Sampling-rate carrier in hertz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hertz(pub f64);

impl Quantity for Hertz {
    fn value(&self) -> f64 {
        self.0
    }

    fn unit(&self) -> &str {
        "Hz"
    }

    fn convert(&self, unit: &str) -> Result<f64> {
        match unit {
            "Hz" => Ok(self.0),
            "kHz" => Ok(self.0 / 1e3),
            "MHz" => Ok(self.0 / 1e6),
            other => Err(ScanFlowError::usage(format!(
                "unknown frequency unit '{other}'"
            ))),
        }
    }
}

/// Persistence seam for resource metadata. Storage formats are a
/// collaborator concern; this crate only consumes the interface.
pub trait ResourceStore {
    /// Load the resource records stored at `path`.
    fn load(&self, path: &Path) -> Result<Vec<Resource>>;

    /// Save `resources` at `path`, replacing any previous content.
    fn save(&self, path: &Path, resources: &[Resource]) -> Result<()>;
}
