//! Integrity checksums on transport packages.
//!
//! A package is `[checksum: k bytes][ciphertext bytes]`, where the checksum is
//! the first `k` bytes of SHA-256 over the ciphertext. This catches corruption
//! on the unreliable overlay; it is not authentication. With `k == 0` wrapping
//! and unwrapping are the identity.

use overlay_types::{sha256, Package};
use tracing::debug;

use crate::error::CryptoError;

/// Default checksum length in bytes.
pub const DEFAULT_CHECKSUM_BYTES: usize = 16;

/// Length of the underlying SHA-256 digest.
pub const MAX_CHECKSUM_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChecksumGuard {
    length: usize,
}

impl Default for ChecksumGuard {
    fn default() -> Self {
        Self {
            length: DEFAULT_CHECKSUM_BYTES,
        }
    }
}

impl ChecksumGuard {
    pub fn new(length: usize) -> Result<Self, CryptoError> {
        if length > MAX_CHECKSUM_BYTES {
            return Err(CryptoError::InvalidChecksumLength {
                requested: length,
                max: MAX_CHECKSUM_BYTES,
            });
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// First `k` bytes of SHA-256 over `data`.
    pub fn checksum(&self, data: &[u8]) -> Vec<u8> {
        sha256(data)[..self.length].to_vec()
    }

    /// Prepend the checksum to formatted ciphertext bytes.
    pub fn wrap(&self, ciphertext: Vec<u8>) -> Package {
        if self.length == 0 {
            return Package::new(ciphertext);
        }

        let mut bytes = self.checksum(&ciphertext);
        bytes.extend_from_slice(&ciphertext);
        Package::new(bytes)
    }

    /// Verify and strip the checksum, returning the ciphertext bytes.
    pub fn unwrap(&self, package: &Package) -> Result<Vec<u8>, CryptoError> {
        let bytes = package.as_bytes();
        if self.length == 0 {
            return Ok(bytes.to_vec());
        }
        if bytes.len() < self.length {
            debug!(
                package = %package.digest_hex(),
                len = bytes.len(),
                "Package shorter than checksum"
            );
            return Err(CryptoError::CorruptPackage);
        }

        let (claimed, ciphertext) = bytes.split_at(self.length);
        let calculated = self.checksum(ciphertext);
        if claimed != calculated.as_slice() {
            debug!(
                package = %package.digest_hex(),
                claimed = %hex::encode(claimed),
                calculated = %hex::encode(&calculated),
                "Checksum mismatch"
            );
            return Err(CryptoError::CorruptPackage);
        }

        Ok(ciphertext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap() {
        let guard = ChecksumGuard::default();
        let package = guard.wrap(b"ciphertext".to_vec());

        assert_eq!(package.len(), DEFAULT_CHECKSUM_BYTES + 10);
        assert_eq!(&package.as_bytes()[..16], &sha256(b"ciphertext")[..16]);
        assert_eq!(guard.unwrap(&package).unwrap(), b"ciphertext");
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let guard = ChecksumGuard::default();
        let package = guard.wrap(vec![0x5a; 40]);

        for byte in 0..package.len() {
            for bit in 0..8 {
                let mut bytes = package.clone().into_bytes();
                bytes[byte] ^= 1 << bit;
                let result = guard.unwrap(&Package::new(bytes));
                assert!(
                    matches!(result, Err(CryptoError::CorruptPackage)),
                    "flip at byte {byte} bit {bit} went undetected"
                );
            }
        }
    }

    #[test]
    fn test_zero_length_is_identity() {
        let guard = ChecksumGuard::new(0).unwrap();
        let package = guard.wrap(vec![1, 2, 3]);

        assert_eq!(package.as_bytes(), &[1, 2, 3]);
        assert_eq!(guard.unwrap(&package).unwrap(), vec![1, 2, 3]);
        assert!(guard.checksum(b"anything").is_empty());
    }

    #[test]
    fn test_short_package_rejected() {
        let guard = ChecksumGuard::new(8).unwrap();
        let result = guard.unwrap(&Package::new(vec![0; 7]));
        assert!(matches!(result, Err(CryptoError::CorruptPackage)));

        // An empty payload still carries its checksum.
        let empty = guard.wrap(Vec::new());
        assert_eq!(empty.len(), 8);
        assert!(guard.unwrap(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(ChecksumGuard::new(32).unwrap().length(), 32);
        assert!(matches!(
            ChecksumGuard::new(33),
            Err(CryptoError::InvalidChecksumLength {
                requested: 33,
                max: 32
            })
        ));
    }
}
