//! Runs an [`EpochLifecycle`] as its own task.
//!
//! The task drives the epoch through PRE_RUN and RUNNING on its own, then
//! serves commands and inbound packages until it is told to hand off or
//! cancel:
//!
//! ```text
//! EpochHandle ──commands──► task ──► EpochLifecycle
//!      ▲                     │  ▲
//!      └────── snapshot ─────┘  └── ReceiveLink packages
//! ```

use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use overlay_crypto::PairingBackend;
use overlay_types::{EpochId, EpochState, Package};

use crate::arena::EpochIndex;
use crate::error::EpochError;
use crate::lifecycle::{DeliveryTicket, EpochLifecycle, EpochSnapshot};
use crate::transport::ReceiveLink;

enum EpochCommand {
    Handoff,
    Send {
        identity: String,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<DeliveryTicket, EpochError>>,
    },
}

/// Control handle for a spawned epoch. Dropping it cancels the epoch.
#[derive(Debug)]
pub struct EpochHandle {
    index: EpochIndex,
    id: EpochId,
    commands: mpsc::Sender<EpochCommand>,
    cancel: watch::Sender<bool>,
    snapshot: watch::Receiver<EpochSnapshot>,
    dropped: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl EpochHandle {
    pub fn index(&self) -> EpochIndex {
        self.index
    }

    pub fn id(&self) -> EpochId {
        self.id
    }

    pub fn state(&self) -> EpochState {
        self.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> EpochSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn dropped_packages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn violation(&self, operation: &'static str) -> EpochError {
        EpochError::LifecycleViolation {
            epoch: self.id,
            state: self.state(),
            operation,
        }
    }

    /// Ask a running epoch to hand off. Queued until PRE_RUN has finished.
    pub async fn handoff(&self) -> Result<(), EpochError> {
        if !matches!(self.state(), EpochState::PreRun | EpochState::Running) {
            return Err(self.violation("handoff"));
        }
        self.commands
            .send(EpochCommand::Handoff)
            .await
            .map_err(|_| self.violation("handoff"))
    }

    /// Abandon the epoch from any live state and wait until it is OFF.
    ///
    /// Seen by the task in every phase, including a blocked PRE_RUN and a
    /// HANDOFF still draining.
    pub async fn cancel(&self) -> Result<(), EpochError> {
        if self.state().is_terminal() {
            return Err(self.violation("cancel"));
        }
        self.cancel.send_replace(true);
        self.wait_off().await
    }

    /// Seal `payload` to `identity` under this epoch and send it.
    pub async fn send(&self, identity: impl Into<String>, payload: Vec<u8>) -> Result<(), EpochError> {
        if !matches!(self.state(), EpochState::PreRun | EpochState::Running) {
            return Err(self.violation("send"));
        }

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(EpochCommand::Send {
                identity: identity.into(),
                payload,
                reply,
            })
            .await
            .map_err(|_| self.violation("send"))?;

        // A dropped reply means the task left RUNNING before serving us.
        let ticket = rx.await.map_err(|_| self.violation("send"))??;
        ticket.wait().await
    }

    /// Wait until PRE_RUN is over. Fails if the epoch did not start.
    pub async fn wait_running(&self) -> Result<(), EpochError> {
        let mut snapshot = self.snapshot.clone();
        let state = match snapshot.wait_for(|s| s.state != EpochState::PreRun).await {
            Ok(snapshot) => snapshot.state,
            Err(_) => return Err(EpochError::TaskStopped),
        };
        if state == EpochState::Off {
            return Err(self.violation("start_running"));
        }
        Ok(())
    }

    /// Wait until the epoch reaches OFF.
    pub async fn wait_off(&self) -> Result<(), EpochError> {
        let mut snapshot = self.snapshot.clone();
        let reached = snapshot.wait_for(|s| s.state.is_terminal()).await.is_ok();
        if reached {
            Ok(())
        } else {
            Err(EpochError::TaskStopped)
        }
    }

    /// Wait for the task itself to exit.
    pub async fn join(self) -> Result<(), EpochError> {
        self.task.await.map_err(|_| EpochError::TaskStopped)
    }
}

impl<B: PairingBackend> EpochLifecycle<B> {
    /// Run the epoch on its own task.
    ///
    /// Returns the control handle and the inbox of decrypted inbound payloads.
    pub fn spawn(mut self) -> (EpochHandle, mpsc::Receiver<Vec<u8>>) {
        let capacity = self.config().inbox_capacity;
        let inbox = self.subscribe_inbox();
        let (commands_tx, commands_rx) = mpsc::channel(capacity);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(self.snapshot());

        let index = self.index();
        let id = self.id();
        let dropped = self.dropped_counter();
        let span = self.span().clone();
        let task = tokio::spawn(run(self, commands_rx, cancel_rx, snapshot_tx).instrument(span));

        let handle = EpochHandle {
            index,
            id,
            commands: commands_tx,
            cancel: cancel_tx,
            snapshot: snapshot_rx,
            dropped,
            task,
        };
        (handle, inbox)
    }
}

async fn receive(link: Option<Arc<dyn ReceiveLink>>) -> Option<Package> {
    match link {
        Some(link) => link.receive().await,
        None => pending().await,
    }
}

/// Resolves on an explicit cancel or once the handle is dropped.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

async fn abandon<B: PairingBackend>(epoch: &mut EpochLifecycle<B>) {
    if let Err(e) = epoch.cancel().await {
        error!(error = %e, "Cancel failed");
    }
}

async fn run<B: PairingBackend>(
    mut epoch: EpochLifecycle<B>,
    mut commands: mpsc::Receiver<EpochCommand>,
    mut cancel: watch::Receiver<bool>,
    snapshot: watch::Sender<EpochSnapshot>,
) {
    let publish = |epoch: &EpochLifecycle<B>| {
        snapshot.send_replace(epoch.snapshot());
    };

    let started = tokio::select! {
        started = async {
            epoch.pre_run().await?;
            publish(&epoch);
            epoch.start_running().await
        } => Some(started),
        _ = cancelled(&mut cancel) => None,
    };
    match started {
        Some(Ok(())) => publish(&epoch),
        Some(Err(e)) => {
            error!(error = %e, "Epoch failed to start");
            abandon(&mut epoch).await;
            publish(&epoch);
            return;
        }
        None => {
            info!("Cancelled during PRE_RUN");
            abandon(&mut epoch).await;
            publish(&epoch);
            return;
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(EpochCommand::Handoff) => break,
                Some(EpochCommand::Send { identity, payload, reply }) => {
                    let _ = reply.send(epoch.send(identity, payload));
                }
                None => {
                    abandon(&mut epoch).await;
                    publish(&epoch);
                    return;
                }
            },
            _ = cancelled(&mut cancel) => {
                abandon(&mut epoch).await;
                publish(&epoch);
                return;
            }
            package = receive(epoch.link()) => match package {
                Some(package) => {
                    if let Err(e) = epoch.accept(package) {
                        error!(error = %e, "Inbound package refused");
                    }
                }
                None => epoch.link_lost(),
            },
        }
    }

    if let Err(e) = epoch.begin_handoff() {
        error!(error = %e, "Handoff refused");
        return;
    }
    publish(&epoch);

    // Commands that arrive while draining are refused by dropping their
    // reply channel once the task exits.
    let drained = tokio::select! {
        drained = epoch.drain() => Some(drained),
        _ = cancelled(&mut cancel) => None,
    };
    match drained {
        Some(Ok(())) => {}
        Some(Err(e)) => error!(error = %e, "Drain failed"),
        None => {
            info!("Cancelled during HANDOFF");
            abandon(&mut epoch).await;
        }
    }
    publish(&epoch);
    info!("Epoch task finished");
}
