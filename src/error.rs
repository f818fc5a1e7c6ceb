//! Error handling for the scanflow crate.
//!
//! Distinguishes the three failure classes of the dataflow model:
//!
//! - **Usage errors** (`Usage`, `Tag`) are raised synchronously to the
//!   caller that constructed the offending message or predicate.
//! - **Computation failures** (`Compute`) are caught at node boundaries and
//!   converted into ERROR-status bus messages; they never reach a caller as
//!   a `Result`.
//! - Data unavailability is *not* an error at all — it travels as the
//!   `NOT_AVAILABLE` payload sentinel (see [`crate::bus::message`]).

use thiserror::Error;

/// Main error type for scanflow operations.
#[derive(Error, Debug)]
pub enum ScanFlowError {
    /// Caller misuse detected at construction time (negative index,
    /// unrecognized marker status, bad marker id, ...).
    #[error("Usage error: {0}")]
    Usage(String),

    /// Malformed tag (e.g. more than one marker-id separator).
    #[error("Tag error in '{tag}': {message}")]
    Tag { tag: String, message: String },

    /// Errors related to channel communication.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Errors related to configuration loading.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A derived-value computation failed inside a node.
    #[error("Computation error: {0}")]
    Compute(String),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScanFlowError>,
    },
}

impl ScanFlowError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ScanFlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        ScanFlowError::Usage(message.into())
    }

    /// Shorthand for a computation failure.
    pub fn compute(message: impl Into<String>) -> Self {
        ScanFlowError::Compute(message.into())
    }
}

/// Result type alias for scanflow operations.
pub type Result<T> = std::result::Result<T, ScanFlowError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
