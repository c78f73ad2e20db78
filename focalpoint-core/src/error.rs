//! Error types for focalpoint.

use thiserror::Error;

/// focalpoint errors.
#[derive(Debug, Error)]
pub enum FocalError {
    /// Protocol-level error (malformed or unrecognized message).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An operation was called without what it needs (missing key, memo, tip).
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Cryptographic error (key or signature encoding).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Transport error (connection, I/O, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// Local persistence error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureInvalid,
}

impl FocalError {
    /// Whether the error came from the caller rather than the network or disk.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

/// Result type alias for focalpoint operations.
pub type FocalResult<T> = Result<T, FocalError>;
