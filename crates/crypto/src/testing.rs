//! A toy pairing backend for fast, deterministic tests.
//!
//! All three groups are the additive group of integers modulo the Mersenne
//! prime `2^61 - 1` with generator `1`, and the pairing is multiplication:
//! `e(a, b) = a·b`, which is bilinear. Discrete logs are trivial, so this
//! provides no security at all.

use rand::{CryptoRng, RngCore};

use crate::backend::PairingBackend;

const MODULUS: u64 = (1 << 61) - 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToyBackend;

fn mul_mod(a: u64, b: u64) -> u64 {
    ((a as u128 * b as u128) % MODULUS as u128) as u64
}

fn decode(bytes: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = bytes.try_into().ok()?;
    let value = u64::from_be_bytes(bytes);
    (value < MODULUS).then_some(value)
}

impl PairingBackend for ToyBackend {
    type Scalar = u64;
    type G1 = u64;
    type G2 = u64;
    type Gt = u64;

    const CURVE: &'static str = "toy-m61";

    fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> u64 {
        1 + rng.next_u64() % (MODULUS - 1)
    }

    fn scalar_add(a: &u64, b: &u64) -> u64 {
        (a + b) % MODULUS
    }

    fn scalar_is_zero(s: &u64) -> bool {
        *s == 0
    }

    fn g2_generator() -> u64 {
        1
    }

    fn g2_mul_generator(s: &u64) -> u64 {
        *s
    }

    fn g2_add(a: &u64, b: &u64) -> u64 {
        (a + b) % MODULUS
    }

    fn g2_is_identity(p: &u64) -> bool {
        *p == 0
    }

    fn hash_to_g1(data: &[u8]) -> u64 {
        let digest = overlay_types::sha256(data);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        match u64::from_be_bytes(head) % MODULUS {
            0 => 1,
            value => value,
        }
    }

    fn g1_mul(p: &u64, s: &u64) -> u64 {
        mul_mod(*p, *s)
    }

    fn pairing(p: &u64, q: &u64) -> u64 {
        mul_mod(*p, *q)
    }

    fn gt_to_bytes(gt: &u64) -> Vec<u8> {
        gt.to_be_bytes().to_vec()
    }

    fn scalar_to_bytes(s: &u64) -> Vec<u8> {
        s.to_be_bytes().to_vec()
    }

    fn scalar_from_bytes(bytes: &[u8]) -> Option<u64> {
        decode(bytes)
    }

    fn g1_to_bytes(p: &u64) -> Vec<u8> {
        p.to_be_bytes().to_vec()
    }

    fn g1_from_bytes(bytes: &[u8]) -> Option<u64> {
        decode(bytes)
    }

    fn g2_to_bytes(p: &u64) -> Vec<u8> {
        p.to_be_bytes().to_vec()
    }

    fn g2_from_bytes(bytes: &[u8]) -> Option<u64> {
        decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toy_pairing_is_bilinear() {
        let h = ToyBackend::hash_to_g1(b"id");
        let lhs = ToyBackend::pairing(&ToyBackend::g1_mul(&h, &5), &ToyBackend::g2_mul_generator(&7));
        let rhs = ToyBackend::pairing(&ToyBackend::g1_mul(&h, &7), &ToyBackend::g2_mul_generator(&5));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_toy_decode_rejects_out_of_range() {
        assert_eq!(ToyBackend::scalar_from_bytes(&MODULUS.to_be_bytes()), None);
        assert_eq!(ToyBackend::scalar_from_bytes(&[0u8; 7]), None);
        assert_eq!(ToyBackend::scalar_from_bytes(&42u64.to_be_bytes()), Some(42));
    }
}
