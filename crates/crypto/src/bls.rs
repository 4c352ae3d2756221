//! BLS12-381 instance of [`PairingBackend`].
//!
//! Shard public shares and the master public key live in G2, identities and
//! private keys in G1. Points travel in compressed form (48 / 96 bytes),
//! scalars as 32 little-endian bytes.

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar};
use ff::Field;
use group::Curve;
use rand::{CryptoRng, RngCore};
use sha2_09::Sha256;

use crate::backend::PairingBackend;

/// Domain separation tag for hashing identities into G1 (RFC 9380 suite).
const IDENTITY_DST: &[u8] = b"OVERLAY-IBE-V01-CS01-with-BLS12381G1_XMD:SHA-256_SSWU_RO_";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bls12Backend;

impl PairingBackend for Bls12Backend {
    type Scalar = Scalar;
    type G1 = G1Affine;
    type G2 = G2Affine;
    type Gt = Gt;

    const CURVE: &'static str = "bls12-381";

    fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
        Scalar::random(rng)
    }

    fn scalar_add(a: &Scalar, b: &Scalar) -> Scalar {
        a + b
    }

    fn scalar_is_zero(s: &Scalar) -> bool {
        bool::from(s.is_zero())
    }

    fn g2_generator() -> G2Affine {
        G2Affine::generator()
    }

    fn g2_mul_generator(s: &Scalar) -> G2Affine {
        (G2Projective::generator() * s).to_affine()
    }

    fn g2_add(a: &G2Affine, b: &G2Affine) -> G2Affine {
        (G2Projective::from(*a) + G2Projective::from(*b)).to_affine()
    }

    fn g2_is_identity(p: &G2Affine) -> bool {
        bool::from(p.is_identity())
    }

    fn hash_to_g1(data: &[u8]) -> G1Affine {
        <G1Projective as HashToCurve<ExpandMsgXmd<Sha256>>>::hash_to_curve(data, IDENTITY_DST)
            .to_affine()
    }

    fn g1_mul(p: &G1Affine, s: &Scalar) -> G1Affine {
        (G1Projective::from(*p) * s).to_affine()
    }

    fn pairing(p: &G1Affine, q: &G2Affine) -> Gt {
        bls12_381::pairing(p, q)
    }

    fn gt_to_bytes(gt: &Gt) -> Vec<u8> {
        // Gt has no public canonical encoding; its Debug form prints the
        // canonical bytes of every Fp coefficient.
        format!("{:?}", gt).into_bytes()
    }

    fn scalar_to_bytes(s: &Scalar) -> Vec<u8> {
        s.to_bytes().to_vec()
    }

    fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar> {
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Option::from(Scalar::from_bytes(&bytes))
    }

    fn g1_to_bytes(p: &G1Affine) -> Vec<u8> {
        p.to_compressed().to_vec()
    }

    fn g1_from_bytes(bytes: &[u8]) -> Option<G1Affine> {
        let bytes: [u8; 48] = bytes.try_into().ok()?;
        Option::from(G1Affine::from_compressed(&bytes))
    }

    fn g2_to_bytes(p: &G2Affine) -> Vec<u8> {
        p.to_compressed().to_vec()
    }

    fn g2_from_bytes(bytes: &[u8]) -> Option<G2Affine> {
        let bytes: [u8; 96] = bytes.try_into().ok()?;
        Option::from(G2Affine::from_compressed(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_hash_to_g1() {
        let point1 = Bls12Backend::hash_to_g1(b"epoch:1");
        let point2 = Bls12Backend::hash_to_g1(b"epoch:2");
        let point3 = Bls12Backend::hash_to_g1(b"epoch:1");

        assert_ne!(point1, point2);
        assert_eq!(point1, point3);
    }

    #[test]
    fn test_hash_to_g1_lands_in_subgroup() {
        for identity in ["epoch:0", "epoch:7", "overlay-client-registration", ""] {
            let point = Bls12Backend::hash_to_g1(identity.as_bytes());
            assert!(!bool::from(point.is_identity()));
            assert!(bool::from(point.is_torsion_free()));
            assert!(bool::from(point.is_on_curve()));
        }
    }

    #[test]
    fn test_pairing_bilinearity() {
        let mut rng = OsRng;
        let a = Bls12Backend::random_scalar(&mut rng);
        let b = Bls12Backend::random_scalar(&mut rng);
        let h = Bls12Backend::hash_to_g1(b"bilinear");

        // e(a·H, b·G2) == e(b·H, a·G2)
        let lhs = Bls12Backend::pairing(
            &Bls12Backend::g1_mul(&h, &a),
            &Bls12Backend::g2_mul_generator(&b),
        );
        let rhs = Bls12Backend::pairing(
            &Bls12Backend::g1_mul(&h, &b),
            &Bls12Backend::g2_mul_generator(&a),
        );
        assert_eq!(lhs, rhs);
        assert_eq!(Bls12Backend::gt_to_bytes(&lhs), Bls12Backend::gt_to_bytes(&rhs));
    }

    #[test]
    fn test_point_encodings() {
        let mut rng = OsRng;
        let s = Bls12Backend::random_scalar(&mut rng);
        let g2 = Bls12Backend::g2_mul_generator(&s);
        let g1 = Bls12Backend::g1_mul(&Bls12Backend::hash_to_g1(b"x"), &s);

        let g2_bytes = Bls12Backend::g2_to_bytes(&g2);
        assert_eq!(g2_bytes.len(), 96);
        assert_eq!(Bls12Backend::g2_from_bytes(&g2_bytes), Some(g2));

        let g1_bytes = Bls12Backend::g1_to_bytes(&g1);
        assert_eq!(g1_bytes.len(), 48);
        assert_eq!(Bls12Backend::g1_from_bytes(&g1_bytes), Some(g1));

        assert_eq!(
            Bls12Backend::scalar_from_bytes(&Bls12Backend::scalar_to_bytes(&s)),
            Some(s)
        );
        assert!(Bls12Backend::g1_from_bytes(&g1_bytes[..47]).is_none());
        assert!(Bls12Backend::scalar_from_bytes(&[0xff; 32]).is_none());
    }
}
