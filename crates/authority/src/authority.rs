//! Shard generation, system aggregation and private key issuance.

use std::marker::PhantomData;

use rand::{CryptoRng, RngCore};
use tracing::debug;

use overlay_crypto::{
    AggregationFault, CryptoError, PairingBackend, PrivateKey, PublicShare, Shard,
    SystemParameters, SystemSecret,
};

use crate::accumulator::{PublicAccumulator, SecretAccumulator};

/// Builds an n-of-n IBE system from independent shards and issues identity keys.
///
/// The authority holds no state of its own; every operation is a function of
/// its inputs, so a single instance can serve any number of systems.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThresholdIbeAuthority<B: PairingBackend> {
    _backend: PhantomData<B>,
}

impl<B: PairingBackend> ThresholdIbeAuthority<B> {
    pub fn new() -> Self {
        Self {
            _backend: PhantomData,
        }
    }

    /// Draw a fresh secret share and compute its public share.
    pub fn generate_shard<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Shard<B> {
        let secret_share = B::random_scalar(rng);
        let public_share = B::g2_mul_generator(&secret_share);
        Shard::from_parts(secret_share, public_share)
    }

    pub fn add_secret(&self, acc: SecretAccumulator<B>, shard: &Shard<B>) -> SecretAccumulator<B> {
        acc.add(shard)
    }

    pub fn add_public(&self, acc: PublicAccumulator<B>, shard: &Shard<B>) -> PublicAccumulator<B> {
        acc.add(&shard.public_share())
    }

    /// Aggregate every shard into the system parameters and master secret.
    ///
    /// Each shard is checked before it is folded in: its public share must
    /// be `secret_share·G2` and must not be the identity.
    pub fn generate_system(
        &self,
        shards: &[Shard<B>],
    ) -> Result<(SystemParameters<B>, SystemSecret<B>), CryptoError> {
        if shards.is_empty() {
            return Err(AggregationFault::NoShards.into());
        }

        let mut public = PublicAccumulator::new();
        let mut secret = SecretAccumulator::new();
        for (index, shard) in shards.iter().enumerate() {
            let share = shard.public_share();
            if B::g2_is_identity(&share.0) || B::scalar_is_zero(shard.secret_share()) {
                return Err(AggregationFault::DegenerateShard(index).into());
            }
            if B::g2_mul_generator(shard.secret_share()) != share.0 {
                return Err(AggregationFault::InconsistentShard(index).into());
            }

            public = self.add_public(public, shard);
            secret = self.add_secret(secret, shard);
        }

        debug!(shards = shards.len(), curve = B::CURVE, "Aggregated IBE system");
        Ok((public.finish()?, secret.finish()?))
    }

    /// Aggregate public shares received from remote authorities.
    pub fn generate_parameters(
        &self,
        shares: &[PublicShare<B>],
    ) -> Result<SystemParameters<B>, CryptoError> {
        let mut public = PublicAccumulator::new();
        for (index, share) in shares.iter().enumerate() {
            if B::g2_is_identity(&share.0) {
                return Err(AggregationFault::DegenerateShard(index).into());
            }
            public = public.add(share);
        }
        public.finish()
    }

    /// Derive `master_secret·H1(identity)`.
    pub fn generate_private_key(&self, secret: &SystemSecret<B>, identity: &str) -> PrivateKey<B> {
        let point = B::g1_mul(&B::hash_to_g1(identity.as_bytes()), secret.expose_scalar());
        PrivateKey::from_parts(identity, point)
    }

    /// Check a delivered key against public parameters:
    /// `e(d, G2) == e(H1(identity), MPK)`.
    pub fn verify_private_key(&self, params: &SystemParameters<B>, key: &PrivateKey<B>) -> bool {
        let lhs = B::pairing(key.expose_point(), &B::g2_generator());
        let rhs = B::pairing(
            &B::hash_to_g1(key.identity().as_bytes()),
            &params.master_public,
        );
        lhs == rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_crypto::testing::ToyBackend;
    use overlay_crypto::{decrypt, encrypt, Bls12Backend};
    use rand::rngs::OsRng;

    #[test]
    fn test_generate_system_from_three_shards() {
        let authority = ThresholdIbeAuthority::<Bls12Backend>::new();
        let shards: Vec<_> = (0..3).map(|_| authority.generate_shard(&mut OsRng)).collect();

        let (params, secret) = authority.generate_system(&shards).unwrap();
        assert_eq!(
            params.master_public,
            Bls12Backend::g2_mul_generator(secret.expose_scalar())
        );

        let key = authority.generate_private_key(&secret, "epoch:7");
        assert!(authority.verify_private_key(&params, &key));

        let ciphertext = encrypt(&params, "epoch:7", b"join-info", &mut OsRng).unwrap();
        assert_eq!(decrypt(&key, &ciphertext).unwrap(), b"join-info");
    }

    #[test]
    fn test_no_single_shard_decrypts() {
        let authority = ThresholdIbeAuthority::<ToyBackend>::new();
        let shards: Vec<_> = (0..3).map(|_| authority.generate_shard(&mut OsRng)).collect();
        let (params, _) = authority.generate_system(&shards).unwrap();

        let ciphertext = encrypt(&params, "epoch:1", b"secret", &mut OsRng).unwrap();
        for shard in &shards {
            let partial = SystemSecret::<ToyBackend>::from_scalar(*shard.secret_share());
            let key = authority.generate_private_key(&partial, "epoch:1");
            assert!(decrypt(&key, &ciphertext).is_err());
            assert!(!authority.verify_private_key(&params, &key));
        }
    }

    #[test]
    fn test_order_independence() {
        let authority = ThresholdIbeAuthority::<ToyBackend>::new();
        let shards: Vec<_> = (0..4).map(|_| authority.generate_shard(&mut OsRng)).collect();
        let reversed: Vec<_> = shards
            .iter()
            .rev()
            .map(|s| Shard::from_parts(*s.secret_share(), s.public_share().0))
            .collect();

        let (params_a, secret_a) = authority.generate_system(&shards).unwrap();
        let (params_b, secret_b) = authority.generate_system(&reversed).unwrap();

        assert_eq!(params_a, params_b);
        assert_eq!(secret_a, secret_b);
    }

    #[test]
    fn test_incremental_fold_matches_batch() {
        let authority = ThresholdIbeAuthority::<ToyBackend>::new();
        let shards: Vec<_> = (0..3).map(|_| authority.generate_shard(&mut OsRng)).collect();

        let mut public = PublicAccumulator::new();
        let mut secret = SecretAccumulator::new();
        for shard in &shards {
            public = authority.add_public(public, shard);
            secret = authority.add_secret(secret, shard);
        }

        let (params, system_secret) = authority.generate_system(&shards).unwrap();
        assert_eq!(public.finish().unwrap(), params);
        assert_eq!(secret.finish().unwrap(), system_secret);

        let shares: Vec<_> = shards.iter().map(Shard::public_share).collect();
        assert_eq!(authority.generate_parameters(&shares).unwrap(), params);
    }

    #[test]
    fn test_zero_shards_rejected() {
        let authority = ThresholdIbeAuthority::<ToyBackend>::new();
        assert!(matches!(
            authority.generate_system(&[]),
            Err(CryptoError::Aggregation(AggregationFault::NoShards))
        ));
        assert!(matches!(
            authority.generate_parameters(&[]),
            Err(CryptoError::Aggregation(AggregationFault::NoShards))
        ));
    }

    #[test]
    fn test_malformed_shards_rejected() {
        let authority = ThresholdIbeAuthority::<ToyBackend>::new();
        let good = authority.generate_shard(&mut OsRng);

        let inconsistent = vec![
            Shard::from_parts(*good.secret_share(), good.public_share().0),
            Shard::<ToyBackend>::from_parts(5, 6),
        ];
        assert!(matches!(
            authority.generate_system(&inconsistent),
            Err(CryptoError::Aggregation(AggregationFault::InconsistentShard(1)))
        ));

        let degenerate = vec![Shard::<ToyBackend>::from_parts(0, 0)];
        assert!(matches!(
            authority.generate_system(&degenerate),
            Err(CryptoError::Aggregation(AggregationFault::DegenerateShard(0)))
        ));
    }

    #[test]
    fn test_private_key_deterministic() {
        let authority = ThresholdIbeAuthority::<ToyBackend>::new();
        let secret = SystemSecret::<ToyBackend>::from_scalar(99);

        let a = authority.generate_private_key(&secret, "epoch:2");
        let b = authority.generate_private_key(&secret, "epoch:2");
        let c = authority.generate_private_key(&secret, "epoch:3");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
