//! Binary wire format for key material and ciphertexts.
//!
//! Every object is a [`WireBlob`]: a version byte followed by a list of
//! length-prefixed, backend-encoded elements,
//! `[version: u8][count: u32 LE][(len: u32 LE, bytes) ...]`.
//!
//! | object            | elements                         |
//! |-------------------|----------------------------------|
//! | system parameters | curve descriptor, master public  |
//! | system secret     | master secret                    |
//! | private key       | identity (UTF-8), key point      |
//! | public share      | curve descriptor, share point    |
//! | ciphertext        | ephemeral key, nonce, AEAD body  |
//!
//! Parsing either yields a complete object or a [`Malformed`] reason; no
//! object is ever built from part of a blob.

use borsh::{BorshDeserialize, BorshSerialize};
use zeroize::Zeroizing;

use crate::backend::PairingBackend;
use crate::error::{CryptoError, Malformed};
use crate::keys::{Ciphertext, PrivateKey, PublicShare, SystemParameters, SystemSecret};

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

#[derive(Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
struct WireBlob {
    version: u8,
    elements: Vec<Vec<u8>>,
}

impl WireBlob {
    fn new(elements: Vec<Vec<u8>>) -> Self {
        Self {
            version: WIRE_VERSION,
            elements,
        }
    }

    /// Elements are fixed-size encodings, AEAD bodies bounded by
    /// [`MAX_PLAINTEXT_BYTES`](crate::MAX_PLAINTEXT_BYTES), or identity
    /// strings (nothing can be encrypted to one longer than
    /// [`MAX_IDENTITY_BYTES`](crate::MAX_IDENTITY_BYTES)). All stay far below
    /// the `u32` length limit, so writing into a `Vec` cannot fail.
    fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(self.elements.iter().all(|e| e.len() <= u32::MAX as usize));
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Decode a blob carrying exactly `expected` elements.
    fn parse(bytes: &[u8], expected: usize) -> Result<Self, Malformed> {
        let version = *bytes.first().ok_or(Malformed::Empty)?;
        if version != WIRE_VERSION {
            return Err(Malformed::UnknownVersion(version));
        }

        let blob: WireBlob = borsh::from_slice(bytes).map_err(|_| Malformed::Framing)?;
        if blob.elements.len() != expected {
            return Err(Malformed::ElementCount {
                expected,
                found: blob.elements.len(),
            });
        }
        Ok(blob)
    }
}

fn check_curve<B: PairingBackend>(descriptor: &[u8]) -> Result<(), Malformed> {
    if descriptor == B::CURVE.as_bytes() {
        Ok(())
    } else {
        Err(Malformed::CurveMismatch(
            String::from_utf8_lossy(descriptor).into_owned(),
        ))
    }
}

fn g2_element<B: PairingBackend>(bytes: &[u8]) -> Result<B::G2, Malformed> {
    B::g2_from_bytes(bytes).ok_or(Malformed::InvalidElement("G2 point"))
}

// =========================
// SYSTEM KEYS
// =========================

pub fn format_system_params<B: PairingBackend>(params: &SystemParameters<B>) -> Vec<u8> {
    WireBlob::new(vec![
        B::CURVE.as_bytes().to_vec(),
        B::g2_to_bytes(&params.master_public),
    ])
    .to_bytes()
}

pub fn parse_system_params<B: PairingBackend>(
    bytes: &[u8],
) -> Result<SystemParameters<B>, CryptoError> {
    let blob = WireBlob::parse(bytes, 2)?;
    check_curve::<B>(&blob.elements[0])?;
    let master_public = g2_element::<B>(&blob.elements[1])?;
    Ok(SystemParameters::new(master_public))
}

/// Encode the master secret. The returned buffer is wiped when dropped.
pub fn format_system_secret<B: PairingBackend>(secret: &SystemSecret<B>) -> Zeroizing<Vec<u8>> {
    let scalar = Zeroizing::new(B::scalar_to_bytes(secret.expose_scalar()));
    Zeroizing::new(WireBlob::new(vec![scalar.to_vec()]).to_bytes())
}

pub fn parse_system_secret<B: PairingBackend>(
    bytes: &[u8],
) -> Result<SystemSecret<B>, CryptoError> {
    let blob = Zeroizing::new(WireBlob::parse(bytes, 1)?.elements);
    let scalar =
        B::scalar_from_bytes(&blob[0]).ok_or(Malformed::InvalidElement("scalar"))?;
    Ok(SystemSecret::from_scalar(scalar))
}

/// Encode a private key. The returned buffer is wiped when dropped.
pub fn format_private_key<B: PairingBackend>(key: &PrivateKey<B>) -> Zeroizing<Vec<u8>> {
    let point = Zeroizing::new(B::g1_to_bytes(key.expose_point()));
    Zeroizing::new(
        WireBlob::new(vec![key.identity().as_bytes().to_vec(), point.to_vec()]).to_bytes(),
    )
}

pub fn parse_private_key<B: PairingBackend>(bytes: &[u8]) -> Result<PrivateKey<B>, CryptoError> {
    let blob = Zeroizing::new(WireBlob::parse(bytes, 2)?.elements);
    let identity = std::str::from_utf8(&blob[0])
        .map_err(|_| Malformed::InvalidElement("identity"))?;
    let point = B::g1_from_bytes(&blob[1]).ok_or(Malformed::InvalidElement("G1 point"))?;
    Ok(PrivateKey::from_parts(identity, point))
}

// =========================
// PUBLIC SHARES
// =========================

pub fn format_public_share<B: PairingBackend>(share: &PublicShare<B>) -> Vec<u8> {
    WireBlob::new(vec![B::CURVE.as_bytes().to_vec(), B::g2_to_bytes(&share.0)]).to_bytes()
}

pub fn parse_public_share<B: PairingBackend>(bytes: &[u8]) -> Result<PublicShare<B>, CryptoError> {
    let blob = WireBlob::parse(bytes, 2)?;
    check_curve::<B>(&blob.elements[0])?;
    Ok(PublicShare(g2_element::<B>(&blob.elements[1])?))
}

// =========================
// CIPHERTEXTS
// =========================

pub fn format_ciphertext<B: PairingBackend>(ciphertext: &Ciphertext<B>) -> Vec<u8> {
    WireBlob::new(vec![
        B::g2_to_bytes(&ciphertext.ephemeral),
        ciphertext.nonce.to_vec(),
        ciphertext.body.clone(),
    ])
    .to_bytes()
}

pub fn parse_ciphertext<B: PairingBackend>(bytes: &[u8]) -> Result<Ciphertext<B>, CryptoError> {
    let mut blob = WireBlob::parse(bytes, 3)?;
    let ephemeral = g2_element::<B>(&blob.elements[0])?;
    let nonce: [u8; 12] = blob.elements[1]
        .as_slice()
        .try_into()
        .map_err(|_| Malformed::InvalidElement("nonce"))?;
    let body = std::mem::take(&mut blob.elements[2]);
    Ok(Ciphertext {
        ephemeral,
        nonce,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::Bls12Backend;
    use crate::testing::ToyBackend;
    use rand::rngs::OsRng;

    fn bls_params() -> (SystemParameters<Bls12Backend>, SystemSecret<Bls12Backend>) {
        let s = Bls12Backend::random_scalar(&mut OsRng);
        (
            SystemParameters::new(Bls12Backend::g2_mul_generator(&s)),
            SystemSecret::from_scalar(s),
        )
    }

    #[test]
    fn test_blob_layout() {
        let bytes = WireBlob::new(vec![vec![0xaa], vec![0xbb, 0xcc]]).to_bytes();
        assert_eq!(
            bytes,
            vec![
                WIRE_VERSION,
                2, 0, 0, 0, // count
                1, 0, 0, 0, 0xaa, // element 0
                2, 0, 0, 0, 0xbb, 0xcc, // element 1
            ]
        );
    }

    #[test]
    fn test_key_material_roundtrip() {
        let (params, secret) = bls_params();
        let point = Bls12Backend::g1_mul(
            &Bls12Backend::hash_to_g1(b"epoch:5"),
            secret.expose_scalar(),
        );
        let key = PrivateKey::<Bls12Backend>::from_parts("epoch:5", point);

        let parsed_params = parse_system_params::<Bls12Backend>(&format_system_params(&params));
        assert_eq!(parsed_params.unwrap(), params);

        let parsed_secret = parse_system_secret::<Bls12Backend>(&format_system_secret(&secret));
        assert_eq!(parsed_secret.unwrap(), secret);

        let parsed_key = parse_private_key::<Bls12Backend>(&format_private_key(&key)).unwrap();
        assert_eq!(parsed_key, key);
        assert_eq!(parsed_key.identity(), "epoch:5");
    }

    #[test]
    fn test_ciphertext_and_share_roundtrip() {
        let ciphertext = Ciphertext::<ToyBackend> {
            ephemeral: 77,
            nonce: [3u8; 12],
            body: vec![1, 2, 3, 4],
        };
        let parsed = parse_ciphertext::<ToyBackend>(&format_ciphertext(&ciphertext)).unwrap();
        assert_eq!(parsed, ciphertext);

        let share = PublicShare::<ToyBackend>(1234);
        let parsed = parse_public_share::<ToyBackend>(&format_public_share(&share)).unwrap();
        assert_eq!(parsed, share);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let (params, _) = bls_params();
        let mut bytes = format_system_params(&params);
        bytes[0] = WIRE_VERSION + 1;

        let result = parse_system_params::<Bls12Backend>(&bytes);
        assert!(matches!(
            result,
            Err(CryptoError::MalformedKeyMaterial(Malformed::UnknownVersion(2)))
        ));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let (params, _) = bls_params();
        let bytes = format_system_params(&params);

        for len in [0, 1, 4, 5, bytes.len() - 1] {
            let result = parse_system_params::<Bls12Backend>(&bytes[..len]);
            assert!(
                matches!(result, Err(CryptoError::MalformedKeyMaterial(_))),
                "prefix of length {len} accepted"
            );
        }

        let mut extended = bytes.clone();
        extended.push(0);
        assert!(matches!(
            parse_system_params::<Bls12Backend>(&extended),
            Err(CryptoError::MalformedKeyMaterial(Malformed::Framing))
        ));
    }

    #[test]
    fn test_wrong_element_count_rejected() {
        let bytes = WireBlob::new(vec![vec![1u8; 8]]).to_bytes();
        assert!(matches!(
            parse_private_key::<ToyBackend>(&bytes),
            Err(CryptoError::MalformedKeyMaterial(Malformed::ElementCount {
                expected: 2,
                found: 1
            }))
        ));
    }

    #[test]
    fn test_curve_mismatch_rejected() {
        let params = SystemParameters::<ToyBackend>::new(5);
        let result = parse_system_params::<Bls12Backend>(&format_system_params(&params));
        assert!(matches!(
            result,
            Err(CryptoError::MalformedKeyMaterial(Malformed::CurveMismatch(_)))
        ));
    }

    #[test]
    fn test_invalid_point_rejected() {
        let bytes = WireBlob::new(vec![
            Bls12Backend::CURVE.as_bytes().to_vec(),
            vec![0xff; 96],
        ])
        .to_bytes();
        assert!(matches!(
            parse_system_params::<Bls12Backend>(&bytes),
            Err(CryptoError::MalformedKeyMaterial(Malformed::InvalidElement(_)))
        ));
    }
}
