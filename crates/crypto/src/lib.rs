//! Aggregated identity-based encryption primitives for the overlay.
//!
//! This crate implements Boneh-Franklin style Identity-Based Encryption (IBE)
//! over a pluggable pairing backend, with BLS12-381 as the production curve.
//!
//! # Overview
//!
//! 1. **Shards**: each authority draws a secret share `s_i` and publishes
//!    `s_i·G2`. Aggregating all shards gives the master public key
//!    `MPK = Σ s_i·G2` and the master secret `s = Σ s_i`.
//!
//! 2. **Encryption**: anyone can encrypt to an identity (e.g. `"epoch:7"`)
//!    using only the system parameters.
//!
//! 3. **Key derivation**: the holder of the master secret derives the
//!    identity key `d = s·H1(identity)`.
//!
//! 4. **Decryption**: anyone holding `d` can decrypt ciphertexts for that
//!    identity.
//!
//! Formatted objects travel as version-tagged blobs ([`wire`]) and every
//! package handed to the transport carries a truncated digest
//! ([`checksum`]).

pub mod backend;
pub mod bls;
pub mod checksum;
pub mod error;
pub mod ibe;
pub mod keys;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod wire;

pub use backend::PairingBackend;
pub use bls::Bls12Backend;
pub use checksum::{ChecksumGuard, DEFAULT_CHECKSUM_BYTES, MAX_CHECKSUM_BYTES};
pub use error::{AggregationFault, CryptoError, Malformed};
pub use ibe::{decrypt, encrypt, MAX_IDENTITY_BYTES, MAX_PLAINTEXT_BYTES};
pub use keys::{Ciphertext, PrivateKey, PublicShare, Secret, Shard, SystemParameters, SystemSecret};
pub use wire::{
    format_ciphertext, format_private_key, format_public_share, format_system_params,
    format_system_secret, parse_ciphertext, parse_private_key, parse_public_share,
    parse_system_params, parse_system_secret, WIRE_VERSION,
};
