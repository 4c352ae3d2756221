//! Error types for epoch lifecycles.

use overlay_crypto::CryptoError;
use overlay_types::{EpochId, EpochState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpochError {
    /// Operation attempted in a state that does not allow it.
    #[error("Lifecycle violation: cannot {operation} epoch {epoch} in state {state}")]
    LifecycleViolation {
        epoch: EpochId,
        state: EpochState,
        operation: &'static str,
    },

    #[error("Private key for {identity} does not belong to epoch {epoch}")]
    KeyMismatch { epoch: EpochId, identity: String },

    #[error("Unknown epoch index {0}")]
    UnknownEpoch(usize),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Crypto worker failed: {0}")]
    Pool(String),

    /// In-flight work abandoned by cancellation or a drain timeout.
    #[error("Operation aborted before completion")]
    Aborted,

    #[error("Epoch task has stopped")]
    TaskStopped,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Link closed")]
    LinkClosed,

    #[error("No route to {0}")]
    Unreachable(String),

    #[error("Request refused: {0}")]
    Refused(String),
}
