//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Package checksum did not match its contents.
    #[error("Corrupt package: checksum mismatch")]
    CorruptPackage,

    #[error("Malformed key material: {0}")]
    MalformedKeyMaterial(#[from] Malformed),

    /// Wrong identity or tampered ciphertext.
    #[error("Decryption failed")]
    Decryption,

    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationFault),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("{what} of {len} bytes exceeds the limit of {max}")]
    InputTooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Key derivation failed")]
    KeyDerivationFailed,

    #[error("Checksum length {requested} exceeds digest length {max}")]
    InvalidChecksumLength { requested: usize, max: usize },
}

/// Reasons a wire blob was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("empty blob")]
    Empty,

    #[error("unknown format version {0}")]
    UnknownVersion(u8),

    #[error("truncated or over-long blob")]
    Framing,

    #[error("expected {expected} elements, found {found}")]
    ElementCount { expected: usize, found: usize },

    #[error("invalid {0} encoding")]
    InvalidElement(&'static str),

    #[error("curve descriptor {0:?} does not match backend")]
    CurveMismatch(String),
}

/// Reasons shard aggregation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationFault {
    #[error("no shards to aggregate")]
    NoShards,

    #[error("shard {0} public share does not match its secret share")]
    InconsistentShard(usize),

    #[error("shard {0} contributes the identity element")]
    DegenerateShard(usize),
}
