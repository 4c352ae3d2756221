//! Errors for cached IBE systems.

use thiserror::Error;

use overlay_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Name {0} not available in IBE cache")]
    MissingName(String),

    #[error("IBE cache is inconsistent: {0}")]
    Inconsistent(&'static str),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
