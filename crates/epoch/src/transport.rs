//! The narrow interface to the overlay transport.
//!
//! The core never moves bytes itself. It asks the transport for a receive
//! link per epoch, hands it [`Package`]s addressed by IBE identity, and asks
//! an ancestor epoch to flood a package. [`MemoryTransport`] wires epochs on
//! one node together in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use overlay_types::{EpochId, Package};

use crate::error::TransportError;

/// Inbound side of an epoch: packages addressed to the epoch's identity.
#[async_trait]
pub trait ReceiveLink: Send + Sync {
    fn address(&self) -> &str;

    /// Next package, or `None` once the link is closed.
    async fn receive(&self) -> Option<Package>;

    async fn close(&self);
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn create_link(&self, epoch: EpochId) -> Result<Arc<dyn ReceiveLink>, TransportError>;

    /// Send a package toward the holder of `identity`.
    async fn send(&self, identity: &str, package: Package) -> Result<(), TransportError>;

    /// Ask `ancestor` to flood `package`. Returns once the request is
    /// accepted, not once flooding completes.
    async fn request_flood(&self, ancestor: EpochId, package: Package)
        -> Result<(), TransportError>;

    /// Connect the epoch to its peers. Peer selection is up to the transport.
    async fn connect_peers(&self, _epoch: EpochId) -> Result<(), TransportError> {
        Ok(())
    }
}

// =========================
// IN-MEMORY TRANSPORT
// =========================

type Routes = Arc<RwLock<HashMap<String, mpsc::Sender<Package>>>>;

const LINK_CAPACITY: usize = 256;

/// Routes packages between epochs in the same process.
///
/// Every send and flood request is recorded for inspection. Flood refusal,
/// stalled link creation and stalled sends can be switched on to exercise
/// failure paths.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    routes: Routes,
    floods: RwLock<Vec<(EpochId, Package)>>,
    sent: RwLock<Vec<(String, Package)>>,
    connected: RwLock<Vec<EpochId>>,
    refuse_floods: AtomicBool,
    stall_links: AtomicBool,
    stall_sends: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn floods(&self) -> Vec<(EpochId, Package)> {
        self.floods.read().clone()
    }

    pub fn sent(&self) -> Vec<(String, Package)> {
        self.sent.read().clone()
    }

    pub fn connected(&self) -> Vec<EpochId> {
        self.connected.read().clone()
    }

    pub fn has_link(&self, identity: &str) -> bool {
        self.routes.read().contains_key(identity)
    }

    pub fn set_refuse_floods(&self, refuse: bool) {
        self.refuse_floods.store(refuse, Ordering::SeqCst);
    }

    /// While set, `create_link` never completes.
    pub fn set_stall_links(&self, stall: bool) {
        self.stall_links.store(stall, Ordering::SeqCst);
    }

    /// While set, `send` never completes.
    pub fn set_stall_sends(&self, stall: bool) {
        self.stall_sends.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn create_link(&self, epoch: EpochId) -> Result<Arc<dyn ReceiveLink>, TransportError> {
        if self.stall_links.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let identity = epoch.identity();
        let mut routes = self.routes.write();
        if routes.contains_key(&identity) {
            return Err(TransportError::Refused(format!("link for {identity} exists")));
        }

        let (tx, rx) = mpsc::channel(LINK_CAPACITY);
        routes.insert(identity.clone(), tx);
        debug!(%identity, "Created memory link");

        Ok(Arc::new(MemoryLink {
            address: format!("memory://{identity}"),
            identity,
            receiver: Mutex::new(rx),
            routes: Arc::clone(&self.routes),
        }))
    }

    async fn send(&self, identity: &str, package: Package) -> Result<(), TransportError> {
        if self.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        self.sent.write().push((identity.to_string(), package.clone()));
        let route = self.routes.read().get(identity).cloned();
        match route {
            Some(tx) => tx
                .send(package)
                .await
                .map_err(|_| TransportError::LinkClosed),
            None => Err(TransportError::Unreachable(identity.to_string())),
        }
    }

    async fn request_flood(
        &self,
        ancestor: EpochId,
        package: Package,
    ) -> Result<(), TransportError> {
        if self.refuse_floods.load(Ordering::SeqCst) {
            return Err(TransportError::Refused("flooding disabled".into()));
        }
        self.floods.write().push((ancestor, package));
        Ok(())
    }

    async fn connect_peers(&self, epoch: EpochId) -> Result<(), TransportError> {
        self.connected.write().push(epoch);
        Ok(())
    }
}

pub struct MemoryLink {
    address: String,
    identity: String,
    receiver: Mutex<mpsc::Receiver<Package>>,
    routes: Routes,
}

#[async_trait]
impl ReceiveLink for MemoryLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn receive(&self) -> Option<Package> {
        self.receiver.lock().await.recv().await
    }

    async fn close(&self) {
        self.routes.write().remove(&self.identity);
        self.receiver.lock().await.close();
        debug!(identity = %self.identity, "Closed memory link");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_link() {
        let transport = MemoryTransport::new();
        let link = transport.create_link(EpochId(3)).await.unwrap();
        assert_eq!(link.address(), "memory://epoch:3");

        transport
            .send("epoch:3", Package::new(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(link.receive().await, Some(Package::new(vec![1, 2, 3])));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_identity_unreachable() {
        let transport = MemoryTransport::new();
        let result = transport.send("epoch:99", Package::default()).await;
        assert_eq!(result, Err(TransportError::Unreachable("epoch:99".into())));
    }

    #[tokio::test]
    async fn test_duplicate_link_refused() {
        let transport = MemoryTransport::new();
        let _link = transport.create_link(EpochId(1)).await.unwrap();
        assert!(matches!(
            transport.create_link(EpochId(1)).await,
            Err(TransportError::Refused(_))
        ));
    }

    #[tokio::test]
    async fn test_close_removes_route() {
        let transport = MemoryTransport::new();
        let link = transport.create_link(EpochId(2)).await.unwrap();
        link.close().await;

        assert!(!transport.has_link("epoch:2"));
        assert_eq!(link.receive().await, None);
        assert!(transport.create_link(EpochId(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_flood_refusal() {
        let transport = MemoryTransport::new();
        transport
            .request_flood(EpochId(1), Package::new(vec![9]))
            .await
            .unwrap();

        transport.set_refuse_floods(true);
        assert!(transport
            .request_flood(EpochId(1), Package::new(vec![9]))
            .await
            .is_err());
        assert_eq!(transport.floods().len(), 1);
    }
}
