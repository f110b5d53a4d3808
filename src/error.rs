//! Crate-wide error type.
//!
//! Mirrors §7 of the design: reads never fail on missing data (callers get
//! empty iterators/default property values instead), bulk operations never
//! partially publish a level, and a detected invariant violation aborts the
//! process after logging a diagnostic rather than returning an error up the
//! stack.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("capacity exhausted: {0}")]
    Capacity(String),

    #[error("unsupported feature: {0}")]
    Unsupported(&'static str),
}

/// Aborts the process after logging a diagnostic.
///
/// Used for the two fatal conditions §7 names: a detected structural
/// invariant violation (dangling continuation, double-release of a page
/// already at refcount zero, a level publish racing past `num_levels`) and
/// page-allocator out-of-memory. Both are programming/environment errors
/// that no caller can recover from meaningfully, so — per spec — they abort
/// rather than unwind as a `Result`.
#[track_caller]
pub fn fatal(kind: &str, detail: impl std::fmt::Display) -> ! {
    tracing::error!(kind, %detail, location = %std::panic::Location::caller(), "fatal invariant violation");
    panic!("{kind}: {detail}");
}
