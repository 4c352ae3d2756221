//! Key material: shards, system parameters, system secret, private keys and
//! ciphertexts.
//!
//! Secret values sit inside [`Secret`], which is wiped when the owning
//! object is dropped. `Debug` output of secret-bearing types never prints the
//! secret itself.

use std::fmt;

use zeroize::{DefaultIsZeroes, Zeroize};

use crate::backend::PairingBackend;

/// A copyable value that can be wiped back to its default (zero) state.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T: Copy + Default> DefaultIsZeroes for Secret<T> {}

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

// =========================
// SHARDS
// =========================

/// One authority's additive contribution to the system keys.
#[derive(Debug, PartialEq, Eq)]
pub struct Shard<B: PairingBackend> {
    secret_share: Secret<B::Scalar>,
    public_share: B::G2,
}

impl<B: PairingBackend> Shard<B> {
    pub fn from_parts(secret_share: B::Scalar, public_share: B::G2) -> Self {
        Self {
            secret_share: Secret::new(secret_share),
            public_share,
        }
    }

    pub fn secret_share(&self) -> &B::Scalar {
        self.secret_share.expose()
    }

    /// The only part of a shard that may leave its owner.
    pub fn public_share(&self) -> PublicShare<B> {
        PublicShare(self.public_share)
    }
}

impl<B: PairingBackend> Drop for Shard<B> {
    fn drop(&mut self) {
        self.secret_share.zeroize();
    }
}

/// Public half of a shard: `secret_share·G2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicShare<B: PairingBackend>(pub B::G2);

// =========================
// SYSTEM KEYS
// =========================

/// Public system parameters: the master public key `Σ public_share`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemParameters<B: PairingBackend> {
    pub master_public: B::G2,
}

impl<B: PairingBackend> SystemParameters<B> {
    pub fn new(master_public: B::G2) -> Self {
        Self { master_public }
    }

    pub fn curve(&self) -> &'static str {
        B::CURVE
    }
}

/// Master secret `Σ secret_share`. Only ever held by authorities.
#[derive(PartialEq, Eq)]
pub struct SystemSecret<B: PairingBackend> {
    master_secret: Secret<B::Scalar>,
}

impl<B: PairingBackend> SystemSecret<B> {
    pub fn from_scalar(master_secret: B::Scalar) -> Self {
        Self {
            master_secret: Secret::new(master_secret),
        }
    }

    pub fn expose_scalar(&self) -> &B::Scalar {
        self.master_secret.expose()
    }
}

impl<B: PairingBackend> fmt::Debug for SystemSecret<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemSecret").finish_non_exhaustive()
    }
}

impl<B: PairingBackend> Drop for SystemSecret<B> {
    fn drop(&mut self) {
        self.master_secret.zeroize();
    }
}

/// Identity-scoped decryption key `master_secret·H1(identity)`.
#[derive(PartialEq, Eq)]
pub struct PrivateKey<B: PairingBackend> {
    identity: String,
    point: Secret<B::G1>,
}

impl<B: PairingBackend> PrivateKey<B> {
    pub fn from_parts(identity: impl Into<String>, point: B::G1) -> Self {
        Self {
            identity: identity.into(),
            point: Secret::new(point),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn expose_point(&self) -> &B::G1 {
        self.point.expose()
    }
}

impl<B: PairingBackend> fmt::Debug for PrivateKey<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl<B: PairingBackend> Drop for PrivateKey<B> {
    fn drop(&mut self) {
        self.point.zeroize();
    }
}

// =========================
// CIPHERTEXT
// =========================

/// IBE ciphertext: ephemeral key `U = r·G2` plus an AES-256-GCM body
/// (ciphertext followed by the 16-byte tag).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext<B: PairingBackend> {
    pub ephemeral: B::G2,
    pub nonce: [u8; 12],
    pub body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ToyBackend;

    #[test]
    fn test_secret_zeroize() {
        let mut secret = Secret::new(42u64);
        secret.zeroize();
        assert_eq!(*secret.expose(), 0);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let secret = SystemSecret::<ToyBackend>::from_scalar(1234567);
        let key = PrivateKey::<ToyBackend>::from_parts("epoch:1", 7654321);
        let shard = Shard::<ToyBackend>::from_parts(1234567, 99);

        assert!(!format!("{:?}", secret).contains("1234567"));
        assert!(!format!("{:?}", key).contains("7654321"));
        assert!(format!("{:?}", key).contains("epoch:1"));
        assert!(!format!("{:?}", shard).contains("1234567"));
    }
}
