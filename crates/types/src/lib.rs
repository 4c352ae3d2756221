//! Core type definitions for the overlay trust core.
//!
//! This crate provides the shared data structures used across the workspace:
//! epoch identifiers and identity strings, the epoch lifecycle state, the
//! transport package and the epoch announcement carried inside an ARK.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

// =========================
// IDENTITIES
// =========================

/// Prefix of every epoch identity string.
pub const EPOCH_IDENTITY_PREFIX: &str = "epoch:";

/// Identity used by clients registering with the overlay.
pub const REGISTRAR_IDENTITY: &str = "overlay-client-registration";

/// Epoch number.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct EpochId(pub u64);

impl EpochId {
    /// The IBE identity string for this epoch (`"epoch:<id>"`).
    pub fn identity(&self) -> String {
        epoch_identity(self.0)
    }

    /// The following epoch, or `None` at `u64::MAX`.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the IBE identity for an epoch number.
pub fn epoch_identity(epoch: u64) -> String {
    format!("{EPOCH_IDENTITY_PREFIX}{epoch}")
}

/// Identity of the registrar variant held by shard authority `index` (1-based).
pub fn registrar_shard_identity(index: u32) -> String {
    format!("{REGISTRAR_IDENTITY}-{index}")
}

// =========================
// EPOCH LIFECYCLE
// =========================

/// Epoch lifecycle state.
///
/// States only ever move forward: `PreRun -> Running -> Handoff -> Off`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum EpochState {
    /// Creating the receive link and ARK, requesting the ancestor flood
    PreRun,
    /// Connected to peers, handling traffic under this epoch's keys
    Running,
    /// No new work admitted, draining in-flight work
    Handoff,
    /// Terminal; all resources released
    Off,
}

impl EpochState {
    /// The only state this one may move to, if any.
    pub fn successor(self) -> Option<EpochState> {
        match self {
            EpochState::PreRun => Some(EpochState::Running),
            EpochState::Running => Some(EpochState::Handoff),
            EpochState::Handoff => Some(EpochState::Off),
            EpochState::Off => None,
        }
    }

    pub fn can_advance_to(self, next: EpochState) -> bool {
        self.successor() == Some(next)
    }

    pub fn is_terminal(self) -> bool {
        self == EpochState::Off
    }
}

impl fmt::Display for EpochState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EpochState::PreRun => "PRE_RUN",
            EpochState::Running => "RUNNING",
            EpochState::Handoff => "HANDOFF",
            EpochState::Off => "OFF",
        };
        f.write_str(name)
    }
}

// =========================
// TRANSPORT
// =========================

/// The unit exchanged with the transport: `[checksum?][ciphertext bytes]`.
#[serde_as]
#[derive(
    Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Package(#[serde_as(as = "serde_with::hex::Hex")] pub Vec<u8>);

impl Package {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex SHA-256 of the whole package, used to identify packages in logs.
    pub fn digest_hex(&self) -> String {
        hex::encode(sha256(&self.0))
    }
}

impl From<Vec<u8>> for Package {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Join instructions for an epoch, encrypted to the epoch identity to form its ARK.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EpochAnnouncement {
    pub epoch: EpochId,
    /// Serial number of the announcing epoch instance on this node
    pub serial: u64,
    /// Address of the epoch's receive link
    pub link_address: String,
    /// SHA-256 of the formatted system parameters the epoch runs under
    pub params_digest: [u8; 32],
}

impl EpochAnnouncement {
    /// Fails only if `link_address` exceeds the `u32` length prefix.
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        borsh::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}
