//! Error types for the presh data structures.

use thiserror::Error;

/// Main error type for the crate.
///
/// All errors are local and synchronous: they are reported at the offending
/// call and nothing is retried internally. A failed operation leaves the
/// structure exactly as it was before the call.
#[derive(Error, Debug)]
pub enum PreshError {
    /// A constructor or query was given an unusable parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The reserved empty-slot sentinel (key 0) was used as a real key.
    #[error("key 0 is reserved as the empty-slot sentinel")]
    InvalidKey,

    /// An index or table was too short for the requested operation.
    #[error("out of range: need at least {needed} entries, got {got}")]
    OutOfRange { needed: u64, got: u64 },

    /// Malformed serialized input that matches no recognized layout.
    #[error("format error: {0}")]
    Format(String),

    /// I/O error from an underlying reader or writer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for presh operations.
pub type Result<T> = std::result::Result<T, PreshError>;
