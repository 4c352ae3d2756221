//! Epoch lifecycle for the overlay.
//!
//! Membership is re-established every epoch. Each epoch:
//!
//! 1. Opens a receive link and builds its ARK, an announcement encrypted to
//!    the epoch identity `"epoch:<id>"`
//! 2. Asks its ancestor epoch, if still live, to flood the ARK
//! 3. Runs under its own private key until told to hand off
//! 4. Drains in-flight work and releases its link and key
//!
//! Pairing work runs on a bounded [`CryptoPool`]; every package crossing the
//! transport carries a checksum and undecryptable packages are dropped at the
//! boundary without disturbing the epoch.

pub mod arena;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod runner;
pub mod transport;

pub use arena::{EpochArena, EpochIndex, EpochRecord};
pub use config::EpochConfig;
pub use error::{EpochError, TransportError};
pub use lifecycle::{DeliveryTicket, EpochContext, EpochLifecycle, EpochSnapshot};
pub use pool::CryptoPool;
pub use runner::EpochHandle;
pub use transport::{MemoryLink, MemoryTransport, ReceiveLink, Transport};
