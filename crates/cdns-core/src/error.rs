//! Error types for the C-DNS encoder crates.

use thiserror::Error;

/// Errors that can occur while encoding a C-DNS capture.
#[derive(Error, Debug)]
pub enum CdnsError {
    /// Underlying file open/write/rename failed. Fatal for the current
    /// output file; previously rotated files remain valid.
    #[error("sink i/o error: {0}")]
    Sink(#[from] std::io::Error),

    /// The stream compressor rejected input or failed to finalize.
    #[error("compression error: {0}")]
    Compression(String),

    /// Configuration is invalid (bad prefix length, unknown pattern token).
    #[error("config error: {0}")]
    Config(String),

    /// An ingest call arrived out of sequence, or a record reached the
    /// block in an impossible state. Treated as a programming bug; the
    /// in-progress record is discarded.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Result type for C-DNS encoder operations.
pub type Result<T> = std::result::Result<T, CdnsError>;
