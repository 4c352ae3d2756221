//! The per-epoch state machine.
//!
//! ```text
//! PRE_RUN ──► RUNNING ──► HANDOFF ──► OFF
//!    │           │           │         ▲
//!    └───────────┴───────────┴─cancel──┘
//! ```
//!
//! - **PRE_RUN**: open the receive link, build the ARK (an
//!   [`EpochAnnouncement`] encrypted to the epoch identity), ask the ancestor
//!   to flood it.
//! - **RUNNING**: connect to peers, seal outgoing payloads and open incoming
//!   packages under this epoch's keys.
//! - **HANDOFF**: admit no new work, wait for in-flight work, release the
//!   link and the private key.
//! - **OFF**: terminal; only the arena record remains.
//!
//! Every step checks the current state first and reports a
//! [`EpochError::LifecycleViolation`] instead of acting out of order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use overlay_crypto::{
    decrypt, encrypt, format_ciphertext, format_system_params, parse_ciphertext, ChecksumGuard,
    PairingBackend, PrivateKey, SystemParameters,
};
use overlay_types::{sha256, EpochAnnouncement, EpochId, EpochState, Package};

use crate::arena::{EpochArena, EpochIndex};
use crate::config::EpochConfig;
use crate::error::EpochError;
use crate::pool::CryptoPool;
use crate::transport::{ReceiveLink, Transport};

/// Node-wide collaborators shared by every epoch.
#[derive(Clone)]
pub struct EpochContext {
    pub arena: Arc<EpochArena>,
    pub transport: Arc<dyn Transport>,
    pub pool: CryptoPool,
    pub config: Arc<EpochConfig>,
}

impl EpochContext {
    pub fn new(transport: Arc<dyn Transport>, config: EpochConfig) -> Result<Self, EpochError> {
        config.validate()?;
        Ok(Self {
            arena: Arc::new(EpochArena::new()),
            transport,
            pool: CryptoPool::new(config.crypto_workers),
            config: Arc::new(config),
        })
    }
}

/// Secret-free view of an epoch, for status output and debugging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSnapshot {
    pub id: EpochId,
    pub serial: u64,
    pub state: EpochState,
    pub ancestor: Option<EpochId>,
    pub link_address: Option<String>,
    /// Hex SHA-256 of the wrapped ARK package
    pub ark_digest: Option<String>,
    pub dropped_packages: u64,
}

/// Resolves once an outgoing payload has been handed to the transport.
#[derive(Debug)]
pub struct DeliveryTicket {
    rx: oneshot::Receiver<Result<(), EpochError>>,
}

impl DeliveryTicket {
    pub async fn wait(self) -> Result<(), EpochError> {
        self.rx.await.unwrap_or(Err(EpochError::Aborted))
    }
}

pub struct EpochLifecycle<B: PairingBackend> {
    index: EpochIndex,
    id: EpochId,
    serial: u64,
    ancestor: Option<EpochIndex>,
    ancestor_id: Option<EpochId>,
    context: EpochContext,
    guard: ChecksumGuard,
    params: SystemParameters<B>,
    key: Option<Arc<PrivateKey<B>>>,
    link: Option<Arc<dyn ReceiveLink>>,
    ark: Option<Package>,
    inbox: Option<mpsc::Sender<Vec<u8>>>,
    in_flight: JoinSet<()>,
    dropped: Arc<AtomicU64>,
    span: Span,
}

impl<B: PairingBackend> EpochLifecycle<B> {
    /// Register a new epoch in PRE_RUN.
    ///
    /// `key` must be the private key for `id`'s identity; `ancestor`, if any,
    /// must already be registered in the context's arena.
    pub fn new(
        context: &EpochContext,
        id: EpochId,
        ancestor: Option<EpochIndex>,
        params: SystemParameters<B>,
        key: PrivateKey<B>,
    ) -> Result<Self, EpochError> {
        if key.identity() != id.identity() {
            return Err(EpochError::KeyMismatch {
                epoch: id,
                identity: key.identity().to_string(),
            });
        }
        let ancestor_id = match ancestor {
            Some(ancestor) => Some(
                context
                    .arena
                    .get(ancestor)
                    .map(|r| r.id)
                    .ok_or(EpochError::UnknownEpoch(ancestor.get()))?,
            ),
            None => None,
        };
        let guard = context.config.checksum_guard()?;

        let index = context.arena.register(id, ancestor);
        let serial = context
            .arena
            .get(index)
            .map(|r| r.serial)
            .ok_or(EpochError::UnknownEpoch(index.get()))?;
        let span = info_span!("epoch", epoch = %id, serial);

        Ok(Self {
            index,
            id,
            serial,
            ancestor,
            ancestor_id,
            context: context.clone(),
            guard,
            params,
            key: Some(Arc::new(key)),
            link: None,
            ark: None,
            inbox: None,
            in_flight: JoinSet::new(),
            dropped: Arc::new(AtomicU64::new(0)),
            span,
        })
    }

    pub fn index(&self) -> EpochIndex {
        self.index
    }

    pub fn id(&self) -> EpochId {
        self.id
    }

    pub fn state(&self) -> EpochState {
        // Only OFF records are ever compacted away.
        self.context
            .arena
            .state(self.index)
            .unwrap_or(EpochState::Off)
    }

    pub fn config(&self) -> &EpochConfig {
        &self.context.config
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn ark(&self) -> Option<&Package> {
        self.ark.as_ref()
    }

    pub fn link(&self) -> Option<Arc<dyn ReceiveLink>> {
        self.link.clone()
    }

    pub fn holds_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn dropped_packages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    /// Open a fresh inbox for decrypted payloads. A previous inbox stops
    /// receiving.
    pub fn subscribe_inbox(&mut self) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(self.context.config.inbox_capacity);
        self.inbox = Some(tx);
        rx
    }

    pub fn snapshot(&self) -> EpochSnapshot {
        EpochSnapshot {
            id: self.id,
            serial: self.serial,
            state: self.state(),
            ancestor: self.ancestor_id,
            link_address: self.link.as_ref().map(|l| l.address().to_string()),
            ark_digest: self.ark.as_ref().map(Package::digest_hex),
            dropped_packages: self.dropped_packages(),
        }
    }

    fn violation(&self, operation: &'static str) -> EpochError {
        EpochError::LifecycleViolation {
            epoch: self.id,
            state: self.state(),
            operation,
        }
    }

    fn require(&self, expected: EpochState, operation: &'static str) -> Result<(), EpochError> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(self.violation(operation))
        }
    }

    /// Drop finished jobs from the in-flight set. Returns the jobs still running.
    fn reap_finished(&mut self) -> usize {
        while self.in_flight.try_join_next().is_some() {}
        self.in_flight.len()
    }

    fn key(&self, operation: &'static str) -> Result<Arc<PrivateKey<B>>, EpochError> {
        self.key.clone().ok_or_else(|| self.violation(operation))
    }

    // =========================
    // STEPS
    // =========================

    /// PRE_RUN: open the link, build the ARK, request the ancestor flood.
    ///
    /// The flood request only needs to be accepted; its failure is logged
    /// and does not hold the epoch back.
    pub async fn pre_run(&mut self) -> Result<(), EpochError> {
        self.require(EpochState::PreRun, "pre_run")?;
        if self.ark.is_some() {
            return Err(self.violation("pre_run"));
        }

        let link = self.context.transport.create_link(self.id).await?;
        let announcement = EpochAnnouncement {
            epoch: self.id,
            serial: self.serial,
            link_address: link.address().to_string(),
            params_digest: sha256(&format_system_params(&self.params)),
        };
        self.link = Some(link);

        let ark = seal(
            &self.context.pool,
            self.guard,
            self.params,
            self.id.identity(),
            announcement.to_bytes()?,
        )
        .await?;
        debug!(parent: &self.span, ark = %ark.digest_hex(), bytes = ark.len(), "Built ARK");
        self.ark = Some(ark.clone());

        self.request_flood(ark).await;
        Ok(())
    }

    async fn request_flood(&self, ark: Package) {
        let Some(ancestor) = self.ancestor else {
            debug!(parent: &self.span, "No ancestor; skipping flood request");
            return;
        };
        let Some(record) = self.context.arena.get(ancestor) else {
            info!(parent: &self.span, ancestor = ancestor.get(), "Ancestor compacted away; skipping flood request");
            return;
        };
        if record.state.is_terminal() {
            info!(parent: &self.span, ancestor = %record.id, "Ancestor is OFF; skipping flood request");
            return;
        }

        match self.context.transport.request_flood(record.id, ark).await {
            Ok(()) => info!(parent: &self.span, ancestor = %record.id, "Requested ARK flood"),
            Err(e) => warn!(parent: &self.span, ancestor = %record.id, error = %e, "Flood request failed"),
        }
    }

    /// PRE_RUN -> RUNNING, then connect to peers.
    pub async fn start_running(&mut self) -> Result<(), EpochError> {
        self.require(EpochState::PreRun, "start_running")?;
        if self.ark.is_none() {
            return Err(self.violation("start_running"));
        }
        self.context
            .arena
            .advance(self.index, EpochState::Running, "start_running")?;
        info!(parent: &self.span, "Epoch running");

        if let Err(e) = self.context.transport.connect_peers(self.id).await {
            warn!(parent: &self.span, error = %e, "Peer connection failed");
        }
        Ok(())
    }

    /// RUNNING -> HANDOFF. New sends and inbound packages are refused from here on.
    pub fn begin_handoff(&mut self) -> Result<(), EpochError> {
        self.context
            .arena
            .advance(self.index, EpochState::Handoff, "begin_handoff")?;
        let in_flight = self.reap_finished();
        info!(parent: &self.span, in_flight, "Epoch handing off");
        Ok(())
    }

    /// HANDOFF -> OFF once in-flight work finishes or the drain timeout passes.
    pub async fn drain(&mut self) -> Result<(), EpochError> {
        self.require(EpochState::Handoff, "drain")?;

        let timeout = self.context.config.drain_timeout();
        let in_flight = &mut self.in_flight;
        let drained = tokio::time::timeout(timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                parent: &self.span,
                remaining = self.in_flight.len(),
                timeout_ms = self.context.config.drain_timeout_ms,
                "Drain timed out; abandoning in-flight work"
            );
            self.in_flight.shutdown().await;
        }

        self.release().await;
        self.context
            .arena
            .advance(self.index, EpochState::Off, "drain")?;
        info!(parent: &self.span, "Epoch off");
        Ok(())
    }

    /// Abandon the epoch from any live state.
    pub async fn cancel(&mut self) -> Result<(), EpochError> {
        if self.state().is_terminal() {
            return Err(self.violation("cancel"));
        }

        self.in_flight.shutdown().await;
        self.release().await;
        let previous = self.context.arena.retire(self.index)?;
        info!(parent: &self.span, from = %previous, "Epoch cancelled");
        Ok(())
    }

    async fn release(&mut self) {
        // Cleared only after `close` returns, so a drain cut short by cancel
        // leaves the link for the cancel to close.
        if let Some(link) = self.link.clone() {
            link.close().await;
            self.link = None;
        }
        // Jobs hold clones of the key; the last one to finish wipes it.
        self.key = None;
        self.inbox = None;
    }

    // =========================
    // TRAFFIC
    // =========================

    /// Seal `payload` to `identity` and send it. RUNNING only.
    pub fn send(
        &mut self,
        identity: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<DeliveryTicket, EpochError> {
        self.require(EpochState::Running, "send")?;

        let identity = identity.into();
        let pool = self.context.pool.clone();
        let transport = Arc::clone(&self.context.transport);
        let guard = self.guard;
        let params = self.params;
        let (tx, rx) = oneshot::channel();

        self.reap_finished();
        self.in_flight.spawn(
            async move {
                let result = async {
                    let package = seal(&pool, guard, params, identity.clone(), payload).await?;
                    debug!(to = %identity, bytes = package.len(), "Sending package");
                    transport.send(&identity, package).await?;
                    Ok::<(), EpochError>(())
                }
                .await;
                if let Err(e) = &result {
                    warn!(error = %e, "Outgoing package failed");
                }
                let _ = tx.send(result);
            }
            .instrument(self.span.clone()),
        );

        Ok(DeliveryTicket { rx })
    }

    /// Verify, decrypt and deliver an inbound package. RUNNING only.
    ///
    /// Packages that fail any check are counted and dropped; they never reach
    /// the inbox.
    pub fn accept(&mut self, package: Package) -> Result<(), EpochError> {
        self.require(EpochState::Running, "accept")?;

        let key = self.key("accept")?;
        let pool = self.context.pool.clone();
        let guard = self.guard;
        let inbox = self.inbox.clone();
        let dropped = Arc::clone(&self.dropped);

        self.reap_finished();
        self.in_flight.spawn(
            async move {
                match open(&pool, guard, key, &package).await {
                    Ok(payload) => match inbox {
                        Some(inbox) => {
                            if inbox.send(payload).await.is_err() {
                                debug!("Inbox closed; discarding payload");
                            }
                        }
                        None => debug!("No inbox subscribed; discarding payload"),
                    },
                    Err(e) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            package = %package.digest_hex(),
                            bytes = package.len(),
                            error = %e,
                            "Dropped inbound package"
                        );
                    }
                }
            }
            .instrument(self.span.clone()),
        );
        Ok(())
    }

    /// The link delivered `None`: stop listening on it.
    pub(crate) fn link_lost(&mut self) {
        if self.link.take().is_some() {
            warn!(parent: &self.span, "Receive link closed by transport");
        }
    }
}

/// Encrypt, format and wrap on the pool.
async fn seal<B: PairingBackend>(
    pool: &CryptoPool,
    guard: ChecksumGuard,
    params: SystemParameters<B>,
    identity: String,
    payload: Vec<u8>,
) -> Result<Package, EpochError> {
    let ciphertext = pool
        .run(move || {
            encrypt(&params, &identity, &payload, &mut OsRng).map(|ct| format_ciphertext(&ct))
        })
        .await??;
    Ok(guard.wrap(ciphertext))
}

/// Unwrap, parse and decrypt on the pool.
async fn open<B: PairingBackend>(
    pool: &CryptoPool,
    guard: ChecksumGuard,
    key: Arc<PrivateKey<B>>,
    package: &Package,
) -> Result<Vec<u8>, EpochError> {
    let bytes = guard.unwrap(package)?;
    let payload = pool
        .run(move || {
            let ciphertext = parse_ciphertext::<B>(&bytes)?;
            decrypt(&*key, &ciphertext)
        })
        .await??;
    Ok(payload)
}
