//! IBE authority: builds system keys from shards and issues identity keys.
//!
//! Aggregation is n-of-n and additive:
//!
//! 1. Each authority draws a shard `(s_i, s_i·G2)` and shares only `s_i·G2`
//! 2. The system parameters are `MPK = Σ s_i·G2`
//! 3. The master secret `s = Σ s_i` exists only where every shard is present
//! 4. Identity keys are `s·H1(identity)`
//!
//! Shards may be folded in as they arrive through [`PublicAccumulator`] and
//! [`SecretAccumulator`]; the result does not depend on arrival order.

pub mod accumulator;
pub mod authority;
pub mod cache;
pub mod error;

pub use accumulator::{PublicAccumulator, SecretAccumulator};
pub use authority::ThresholdIbeAuthority;
pub use cache::{expand_template, IbeCache, DEFAULT_NAME_TEMPLATE};
pub use error::CacheError;
