//! The pairing primitive interface.
//!
//! Everything above this module is written against [`PairingBackend`], which
//! exposes exactly the group and scalar operations the authority and the IBE
//! codec need:
//!
//! - scalars: random generation, addition, encoding
//! - G1: hash-to-group for identities, scalar multiplication
//! - G2: generator multiplication and addition for shard public shares
//! - a bilinear map `e: G1 × G2 -> Gt` and an encoding of `Gt` for key derivation
//!
//! [`crate::bls::Bls12Backend`] is the production instance. The toy backend in
//! [`crate::testing`] is a fast, insecure stand-in for unit tests.

use std::fmt::Debug;

use rand::{CryptoRng, RngCore};

/// A bilinear pairing over two source groups and a target group.
pub trait PairingBackend:
    Clone + Copy + Debug + Default + PartialEq + Eq + Send + Sync + 'static
{
    /// `Default` must be zero.
    type Scalar: Copy + Default + PartialEq + Eq + Debug + Send + Sync + 'static;
    /// Group holding hashed identities and private keys.
    type G1: Copy + Default + PartialEq + Eq + Debug + Send + Sync + 'static;
    /// Group holding shard public shares and the master public key.
    /// `Default` must be the identity element.
    type G2: Copy + Default + PartialEq + Eq + Debug + Send + Sync + 'static;
    type Gt: PartialEq + Eq + Debug;

    /// Curve descriptor written into formatted system parameters.
    const CURVE: &'static str;

    fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Self::Scalar;

    fn scalar_add(a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar;

    fn scalar_is_zero(s: &Self::Scalar) -> bool;

    fn g2_generator() -> Self::G2;

    /// `s·G2`
    fn g2_mul_generator(s: &Self::Scalar) -> Self::G2;

    fn g2_add(a: &Self::G2, b: &Self::G2) -> Self::G2;

    fn g2_is_identity(p: &Self::G2) -> bool;

    /// Deterministically map arbitrary bytes into G1.
    fn hash_to_g1(data: &[u8]) -> Self::G1;

    fn g1_mul(p: &Self::G1, s: &Self::Scalar) -> Self::G1;

    fn pairing(p: &Self::G1, q: &Self::G2) -> Self::Gt;

    fn gt_to_bytes(gt: &Self::Gt) -> Vec<u8>;

    fn scalar_to_bytes(s: &Self::Scalar) -> Vec<u8>;
    fn scalar_from_bytes(bytes: &[u8]) -> Option<Self::Scalar>;

    fn g1_to_bytes(p: &Self::G1) -> Vec<u8>;
    fn g1_from_bytes(bytes: &[u8]) -> Option<Self::G1>;

    fn g2_to_bytes(p: &Self::G2) -> Vec<u8>;
    fn g2_from_bytes(bytes: &[u8]) -> Option<Self::G2>;
}
