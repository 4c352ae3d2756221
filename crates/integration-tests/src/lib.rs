//! End-to-end integration tests for the overlay trust core.
//!
//! These tests run on the real BLS12-381 backend and exercise:
//! 1. Shard aggregation into a system
//! 2. Key issuance for epoch identities
//! 3. Sealing and opening transport packages
//! 4. Cached systems on disk
//! 5. A chain of epochs handing off over the in-memory transport

use std::sync::Arc;
use std::time::Duration;

use overlay_authority::{IbeCache, PublicAccumulator, ThresholdIbeAuthority};
use overlay_crypto::{
    decrypt, encrypt, format_ciphertext, format_private_key, format_public_share,
    format_system_params, parse_ciphertext, parse_private_key, parse_public_share,
    parse_system_params, Bls12Backend, ChecksumGuard, CryptoError, PrivateKey, Shard,
    SystemParameters, SystemSecret,
};
use overlay_epoch::{EpochConfig, EpochContext, EpochError, EpochHandle, EpochLifecycle, MemoryTransport};
use overlay_types::{EpochAnnouncement, EpochId, EpochState, Package};

use rand::rngs::OsRng;

type Bls = Bls12Backend;

fn three_shard_system() -> (Vec<Shard<Bls>>, SystemParameters<Bls>, SystemSecret<Bls>) {
    let authority = ThresholdIbeAuthority::<Bls>::new();
    let shards: Vec<_> = (0..3).map(|_| authority.generate_shard(&mut OsRng)).collect();
    let (params, secret) = authority.generate_system(&shards).unwrap();
    (shards, params, secret)
}

fn seal(params: &SystemParameters<Bls>, identity: &str, payload: &[u8], guard: ChecksumGuard) -> Package {
    let ciphertext = encrypt(params, identity, payload, &mut OsRng).unwrap();
    guard.wrap(format_ciphertext(&ciphertext))
}

fn open(key: &PrivateKey<Bls>, package: &Package, guard: ChecksumGuard) -> Result<Vec<u8>, CryptoError> {
    let bytes = guard.unwrap(package)?;
    let ciphertext = parse_ciphertext::<Bls>(&bytes)?;
    decrypt(key, &ciphertext)
}

/// Three shards, one epoch key, one package through the whole pipeline.
#[test]
fn test_three_shard_end_to_end() {
    let (shards, params, secret) = three_shard_system();
    let authority = ThresholdIbeAuthority::<Bls>::new();
    let guard = ChecksumGuard::new(16).unwrap();

    let key = authority.generate_private_key(&secret, "epoch:7");
    assert!(authority.verify_private_key(&params, &key));

    let package = seal(&params, "epoch:7", b"join-info", guard);
    assert_eq!(open(&key, &package, guard).unwrap(), b"join-info");

    // Keys travel as wire blobs too.
    let key = parse_private_key::<Bls>(&format_private_key(&key)).unwrap();
    assert_eq!(open(&key, &package, guard).unwrap(), b"join-info");

    // No single shard can issue a working key.
    for shard in &shards {
        let partial = SystemSecret::<Bls>::from_scalar(*shard.secret_share());
        let partial_key = authority.generate_private_key(&partial, "epoch:7");
        assert!(!authority.verify_private_key(&params, &partial_key));
        assert!(matches!(
            open(&partial_key, &package, guard),
            Err(CryptoError::Decryption)
        ));
    }
}

#[test]
fn test_package_failures_are_distinguished() {
    let (_, params, secret) = three_shard_system();
    let authority = ThresholdIbeAuthority::<Bls>::new();
    let guard = ChecksumGuard::default();
    let key = authority.generate_private_key(&secret, "epoch:7");

    // Corruption anywhere is caught by the checksum before any pairing work.
    let package = seal(&params, "epoch:7", b"join-info", guard);
    let mut corrupt = package.clone().into_bytes();
    corrupt[40] ^= 0x01;
    assert!(matches!(
        open(&key, &Package::new(corrupt), guard),
        Err(CryptoError::CorruptPackage)
    ));

    // Intact but addressed to another epoch.
    let other = seal(&params, "epoch:8", b"join-info", guard);
    assert!(matches!(open(&key, &other, guard), Err(CryptoError::Decryption)));

    // Intact checksum over bytes that are not a ciphertext blob.
    let garbage = guard.wrap(vec![7u8; 64]);
    assert!(matches!(
        open(&key, &garbage, guard),
        Err(CryptoError::MalformedKeyMaterial(_))
    ));
}

/// Remote authorities only ever send public shares.
#[test]
fn test_parameters_from_remote_public_shares() {
    let (shards, params, _) = three_shard_system();
    let authority = ThresholdIbeAuthority::<Bls>::new();

    let received: Vec<_> = shards
        .iter()
        .rev()
        .map(|s| parse_public_share::<Bls>(&format_public_share(&s.public_share())).unwrap())
        .collect();
    assert_eq!(authority.generate_parameters(&received).unwrap(), params);

    let folded = received
        .iter()
        .fold(PublicAccumulator::<Bls>::new(), |acc, share| acc.add(share))
        .finish()
        .unwrap();
    assert_eq!(folded, params);
    assert_eq!(
        parse_system_params::<Bls>(&format_system_params(&params)).unwrap(),
        params
    );
}

#[test]
fn test_cache_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ibe-cache.json");

    let names = IbeCache::preset_names(&["client-%05d".to_string()], 3, 2);
    let cache = IbeCache::generate::<Bls, _>(&names, 2, &mut OsRng).unwrap();
    cache.save(&path).unwrap();

    let mut loaded = IbeCache::load(&path).unwrap();
    assert_eq!(loaded, cache);
    assert!(loaded.contains("client-00002"));
    assert!(loaded.contains("overlay-client-registration-2"));

    let params = loaded.system_parameters::<Bls>().unwrap();
    let guard = ChecksumGuard::default();
    let package = seal(&params, "client-00001", b"registration", guard);
    let key = loaded.private_key::<Bls>("client-00001").unwrap();
    assert_eq!(open(&key, &package, guard).unwrap(), b"registration");

    // A key derived later from the cached shards works the same way.
    let derived = loaded.derive::<Bls>("epoch:12").unwrap();
    let package = seal(&params, "epoch:12", b"late joiner", guard);
    assert_eq!(open(&derived, &package, guard).unwrap(), b"late joiner");
    assert!(loaded.private_key::<Bls>("epoch:13").is_err());
}

// =========================
// EPOCH CHAIN
// =========================

struct Node {
    transport: Arc<MemoryTransport>,
    context: EpochContext,
    params: SystemParameters<Bls>,
    secret: SystemSecret<Bls>,
}

impl Node {
    fn new() -> Self {
        let (_, params, secret) = three_shard_system();
        let transport = Arc::new(MemoryTransport::new());
        let config = EpochConfig {
            crypto_workers: 2,
            drain_timeout_ms: 1_000,
            ..EpochConfig::default()
        };
        let context = EpochContext::new(transport.clone(), config).unwrap();
        Self {
            transport,
            context,
            params,
            secret,
        }
    }

    fn key(&self, id: EpochId) -> PrivateKey<Bls> {
        ThresholdIbeAuthority::<Bls>::new().generate_private_key(&self.secret, &id.identity())
    }

    async fn start(
        &self,
        id: u64,
        ancestor: Option<&EpochHandle>,
    ) -> (EpochHandle, tokio::sync::mpsc::Receiver<Vec<u8>>) {
        let id = EpochId(id);
        let lifecycle = EpochLifecycle::new(
            &self.context,
            id,
            ancestor.map(EpochHandle::index),
            self.params,
            self.key(id),
        )
        .unwrap();
        let (handle, inbox) = lifecycle.spawn();
        tokio::time::timeout(Duration::from_secs(10), handle.wait_running())
            .await
            .unwrap()
            .unwrap();
        (handle, inbox)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_epoch_chain_handoff() {
    let node = Node::new();
    let guard = node.context.config.checksum_guard().unwrap();

    let (first, _first_inbox) = node.start(1, None).await;
    let (second, mut second_inbox) = node.start(2, Some(&first)).await;

    // The second epoch's ARK was flooded through the first and opens with
    // the second epoch's key.
    let floods = node.transport.floods();
    assert_eq!(floods.len(), 1);
    assert_eq!(floods[0].0, EpochId(1));
    let announcement = open(&node.key(EpochId(2)), &floods[0].1, guard).unwrap();
    let announcement = EpochAnnouncement::from_bytes(&announcement).unwrap();
    assert_eq!(announcement.epoch, EpochId(2));
    assert_eq!(announcement.link_address, "memory://epoch:2");
    assert_eq!(second.snapshot().ark_digest, Some(floods[0].1.digest_hex()));

    // Traffic flows from the old epoch to the new one before handoff.
    first.send("epoch:2", b"membership list".to_vec()).await.unwrap();
    let payload = tokio::time::timeout(Duration::from_secs(10), second_inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, b"membership list");

    first.handoff().await.unwrap();
    first.wait_off().await.unwrap();
    assert!(!node.transport.has_link("epoch:1"));
    assert!(matches!(
        first.send("epoch:2", b"too late".to_vec()).await,
        Err(EpochError::LifecycleViolation { .. })
    ));

    // The first epoch is OFF, so the third does not ask it to flood.
    let (third, _third_inbox) = node.start(3, Some(&first)).await;
    assert_eq!(node.transport.floods().len(), 1);
    assert_eq!(third.snapshot().ancestor, Some(EpochId(1)));

    assert_eq!(second.state(), EpochState::Running);
    for handle in [&second, &third] {
        handle.handoff().await.unwrap();
        handle.wait_off().await.unwrap();
    }

    let states: Vec<_> = node.context.arena.records().iter().map(|r| r.state).collect();
    assert_eq!(states, vec![EpochState::Off; 3]);
}
