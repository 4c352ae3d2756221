//! Running sums over shards.
//!
//! Shards arrive one at a time from independent authorities, so both halves
//! of the system keys are built as folds. Addition in the scalar field and in
//! G2 is commutative and associative, hence the result does not depend on
//! arrival order.

use zeroize::Zeroize;

use overlay_crypto::{
    AggregationFault, CryptoError, PairingBackend, PublicShare, Secret, Shard, SystemParameters,
    SystemSecret,
};

/// Sum of public shares, finishing as [`SystemParameters`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicAccumulator<B: PairingBackend> {
    sum: B::G2,
    count: usize,
}

impl<B: PairingBackend> Default for PublicAccumulator<B> {
    fn default() -> Self {
        Self {
            sum: B::G2::default(),
            count: 0,
        }
    }
}

impl<B: PairingBackend> PublicAccumulator<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, share: &PublicShare<B>) -> Self {
        self.sum = B::g2_add(&self.sum, &share.0);
        self.count += 1;
        self
    }

    /// Number of shares folded in so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(self) -> Result<SystemParameters<B>, CryptoError> {
        if self.count == 0 {
            return Err(AggregationFault::NoShards.into());
        }
        Ok(SystemParameters::new(self.sum))
    }
}

/// Sum of secret shares, finishing as [`SystemSecret`]. Wiped on drop.
#[derive(Debug)]
pub struct SecretAccumulator<B: PairingBackend> {
    sum: Secret<B::Scalar>,
    count: usize,
}

impl<B: PairingBackend> Default for SecretAccumulator<B> {
    fn default() -> Self {
        Self {
            sum: Secret::default(),
            count: 0,
        }
    }
}

impl<B: PairingBackend> SecretAccumulator<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, shard: &Shard<B>) -> Self {
        self.sum = Secret::new(B::scalar_add(self.sum.expose(), shard.secret_share()));
        self.count += 1;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(self) -> Result<SystemSecret<B>, CryptoError> {
        if self.count == 0 {
            return Err(AggregationFault::NoShards.into());
        }
        Ok(SystemSecret::from_scalar(*self.sum.expose()))
    }
}

impl<B: PairingBackend> Drop for SecretAccumulator<B> {
    fn drop(&mut self) {
        self.sum.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_crypto::testing::ToyBackend;

    fn toy_shard(secret: u64) -> Shard<ToyBackend> {
        Shard::from_parts(secret, ToyBackend::g2_mul_generator(&secret))
    }

    #[test]
    fn test_empty_accumulators_fail() {
        let public = PublicAccumulator::<ToyBackend>::new().finish();
        let secret = SecretAccumulator::<ToyBackend>::new().finish();

        assert!(matches!(
            public,
            Err(CryptoError::Aggregation(AggregationFault::NoShards))
        ));
        assert!(matches!(
            secret,
            Err(CryptoError::Aggregation(AggregationFault::NoShards))
        ));
    }

    #[test]
    fn test_fold_order_independent() {
        let shards: Vec<_> = [11u64, 22, 33].into_iter().map(toy_shard).collect();

        let forward = shards
            .iter()
            .fold(SecretAccumulator::new(), |acc, s| acc.add(s))
            .finish()
            .unwrap();
        let backward = shards
            .iter()
            .rev()
            .fold(SecretAccumulator::new(), |acc, s| acc.add(s))
            .finish()
            .unwrap();

        assert_eq!(forward, backward);
        assert_eq!(*forward.expose_scalar(), 66);
    }

    #[test]
    fn test_public_count() {
        let acc = PublicAccumulator::<ToyBackend>::new()
            .add(&PublicShare(5))
            .add(&PublicShare(7));
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.finish().unwrap().master_public, 12);
    }
}
