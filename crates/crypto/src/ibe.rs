//! Identity-Based Encryption over a [`PairingBackend`].
//!
//! A hybrid variant of Boneh-Franklin: the pairing yields a shared secret from
//! which an AES-256-GCM key is derived.
//!
//! # Encryption
//!
//! To encrypt a message `m` to identity `id`:
//! 1. Compute `Q = H1(id)` in G1
//! 2. Sample random scalar `r`
//! 3. Compute `U = r·G2` (ephemeral public key)
//! 4. Compute `shared = e(r·Q, MPK)`
//! 5. Derive a symmetric key from `shared` with HKDF-SHA256
//! 6. Encrypt `m` with AES-GCM, binding `id` as associated data
//!
//! # Decryption
//!
//! Given the private key `d = s·Q`:
//! 1. Compute `shared = e(d, U) = e(Q, G2)^{s·r} = e(r·Q, MPK)`
//! 2. Derive the symmetric key from `shared`
//! 3. Decrypt with AES-GCM using the key's identity as associated data
//!
//! A key for another identity yields an unrelated symmetric key, so the only
//! failure signal in either case is the AEAD tag check.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::backend::PairingBackend;
use crate::error::CryptoError;
use crate::keys::{Ciphertext, PrivateKey, SystemParameters};

const KEY_INFO: &[u8] = b"overlay-ibe-v1 aes-256-gcm";

/// Largest plaintext [`encrypt`] accepts. Keeps every ciphertext element far
/// inside the wire format's `u32` length prefix.
pub const MAX_PLAINTEXT_BYTES: usize = 16 * 1024 * 1024;

/// Longest identity [`encrypt`] accepts.
pub const MAX_IDENTITY_BYTES: usize = 1024;

/// Encrypt `plaintext` to `identity` under the system parameters.
///
/// Fresh randomness is drawn on every call, so encrypting the same input
/// twice yields different ciphertexts.
pub fn encrypt<B: PairingBackend, R: RngCore + CryptoRng>(
    params: &SystemParameters<B>,
    identity: &str,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<Ciphertext<B>, CryptoError> {
    if identity.len() > MAX_IDENTITY_BYTES {
        return Err(CryptoError::InputTooLarge {
            what: "identity",
            len: identity.len(),
            max: MAX_IDENTITY_BYTES,
        });
    }
    if plaintext.len() > MAX_PLAINTEXT_BYTES {
        return Err(CryptoError::InputTooLarge {
            what: "plaintext",
            len: plaintext.len(),
            max: MAX_PLAINTEXT_BYTES,
        });
    }

    let id_point = B::hash_to_g1(identity.as_bytes());

    let r = B::random_scalar(rng);
    let ephemeral = B::g2_mul_generator(&r);

    // e(r·Q, MPK) = e(Q, MPK)^r
    let shared = B::pairing(&B::g1_mul(&id_point, &r), &params.master_public);
    let key = derive_key::<B>(&shared)?;

    let mut nonce = [0u8; 12];
    rng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| {
        CryptoError::EncryptionFailed(format!("Failed to create cipher: {}", e))
    })?;

    let body = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: identity.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM encryption failed: {}", e)))?;

    Ok(Ciphertext {
        ephemeral,
        nonce,
        body,
    })
}

/// Decrypt a ciphertext with the private key of its identity.
pub fn decrypt<B: PairingBackend>(
    key: &PrivateKey<B>,
    ciphertext: &Ciphertext<B>,
) -> Result<Vec<u8>, CryptoError> {
    let shared = B::pairing(key.expose_point(), &ciphertext.ephemeral);
    let symmetric = derive_key::<B>(&shared)?;

    let cipher =
        Aes256Gcm::new_from_slice(symmetric.as_slice()).map_err(|_| CryptoError::Decryption)?;

    cipher
        .decrypt(
            Nonce::from_slice(&ciphertext.nonce),
            Payload {
                msg: &ciphertext.body,
                aad: key.identity().as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Decryption)
}

/// Derive a symmetric key from a target group element.
fn derive_key<B: PairingBackend>(shared: &B::Gt) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let ikm = Zeroizing::new(B::gt_to_bytes(shared));

    let hk = Hkdf::<Sha256>::new(None, &ikm);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(KEY_INFO, key.as_mut_slice())
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    Ok(key)
}
