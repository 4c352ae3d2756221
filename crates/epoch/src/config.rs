//! Epoch runtime configuration.

use std::path::Path;
use std::time::Duration;

use overlay_crypto::{ChecksumGuard, DEFAULT_CHECKSUM_BYTES, MAX_CHECKSUM_BYTES};
use serde::{Deserialize, Serialize};

use crate::error::EpochError;

/// Configuration shared by every epoch on a node.
///
/// Missing fields in a config file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochConfig {
    /// Checksum bytes prepended to each package (0 disables checksums)
    pub checksum_bytes: usize,
    /// Maximum concurrent pairing computations
    pub crypto_workers: usize,
    /// How long HANDOFF waits for in-flight work before abandoning it
    pub drain_timeout_ms: u64,
    /// Capacity of the command and inbox channels
    pub inbox_capacity: usize,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            checksum_bytes: DEFAULT_CHECKSUM_BYTES,
            crypto_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            drain_timeout_ms: 5_000,
            inbox_capacity: 256,
        }
    }
}

impl EpochConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, EpochError> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EpochError> {
        if self.checksum_bytes > MAX_CHECKSUM_BYTES {
            return Err(EpochError::Config(format!(
                "checksum_bytes must be at most {MAX_CHECKSUM_BYTES}, got {}",
                self.checksum_bytes
            )));
        }
        if self.crypto_workers == 0 {
            return Err(EpochError::Config("crypto_workers must be at least 1".into()));
        }
        if self.inbox_capacity == 0 {
            return Err(EpochError::Config("inbox_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn checksum_guard(&self) -> Result<ChecksumGuard, EpochError> {
        Ok(ChecksumGuard::new(self.checksum_bytes)?)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EpochConfig::default();
        assert_eq!(config.checksum_bytes, 16);
        assert!(config.crypto_workers >= 1);
        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epoch.json");
        std::fs::write(&path, r#"{ "checksum_bytes": 8, "drain_timeout_ms": 250 }"#).unwrap();

        let config = EpochConfig::from_json_file(&path).unwrap();
        assert_eq!(config.checksum_bytes, 8);
        assert_eq!(config.drain_timeout_ms, 250);
        assert_eq!(config.inbox_capacity, 256);
        assert_eq!(config.checksum_guard().unwrap().length(), 8);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epoch.json");

        std::fs::write(&path, r#"{ "checksum_bytes": 33 }"#).unwrap();
        assert!(matches!(
            EpochConfig::from_json_file(&path),
            Err(EpochError::Config(_))
        ));

        std::fs::write(&path, r#"{ "crypto_workers": 0 }"#).unwrap();
        assert!(matches!(
            EpochConfig::from_json_file(&path),
            Err(EpochError::Config(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            EpochConfig::from_json_file(&path),
            Err(EpochError::Json(_))
        ));
    }
}
