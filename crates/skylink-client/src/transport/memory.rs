//! In-process transport.
//!
//! [`MemoryConnector::new`] returns the connector together with a
//! [`MemoryAcceptor`] that plays the broker side: every successful connect
//! produces a [`MemoryPeer`] that sees what the endpoint sends and can
//! answer, inject failures, or hang up.
//!
//! ```ignore
//! let (connector, mut acceptor) = MemoryConnector::new();
//! let client = Client::with_connector("/test", "secret", connector, ClientConfig::default())?;
//! client.connect("mem://broker").await?;
//!
//! let mut peer = acceptor.accept().await.unwrap();
//! ```

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

use skylink_core::Identity;
use skylink_protocol::FrameSet;

use super::{
    BoxFuture, Connector, Endpoint, EndpointKind, TransportError, TransportResult,
};

/// Connector half of the in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MemoryConnector, MemoryAcceptor) {
        let (peers, incoming) = mpsc::unbounded_channel();
        (MemoryConnector { peers }, MemoryAcceptor { incoming })
    }
}

impl Connector for MemoryConnector {
    type Endpoint = MemoryEndpoint;

    fn connect<'a>(
        &'a self,
        address: &'a str,
        identity: &'a Identity,
        kind: EndpointKind,
    ) -> BoxFuture<'a, TransportResult<MemoryEndpoint>> {
        Box::pin(async move {
            let (outgoing, from_endpoint) = mpsc::unbounded_channel();
            let (to_endpoint, incoming) = mpsc::unbounded_channel();

            let peer = MemoryPeer {
                identity: identity.to_string(),
                kind,
                address: address.to_string(),
                from_endpoint,
                to_endpoint,
            };

            self.peers
                .send(peer)
                .map_err(|_| TransportError::ConnectionRefused(address.to_string()))?;
            debug!(address = %address, kind = kind.as_str(), "memory endpoint connected");

            Ok(MemoryEndpoint { outgoing, incoming })
        })
    }
}

/// Broker side of the in-process transport.
#[derive(Debug)]
pub struct MemoryAcceptor {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryAcceptor {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// Next connection, if one is already pending.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }
}

/// The broker's view of one connected endpoint.
#[derive(Debug)]
pub struct MemoryPeer {
    pub identity: String,
    pub kind: EndpointKind,
    pub address: String,
    from_endpoint: mpsc::UnboundedReceiver<FrameSet>,
    to_endpoint: mpsc::UnboundedSender<TransportResult<FrameSet>>,
}

impl MemoryPeer {
    /// Next message sent by the endpoint, `None` once it is dropped.
    pub async fn recv(&mut self) -> Option<FrameSet> {
        self.from_endpoint.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FrameSet> {
        self.from_endpoint.try_recv().ok()
    }

    /// Deliver a message to the endpoint. Returns false if it is gone.
    pub fn send(&self, frames: impl Into<FrameSet>) -> bool {
        self.to_endpoint.send(Ok(frames.into())).is_ok()
    }

    /// Make the endpoint's next `recv` fail.
    pub fn fail(&self, error: TransportError) -> bool {
        self.to_endpoint.send(Err(error)).is_ok()
    }

    /// Whether the endpoint has been dropped.
    pub fn is_closed(&self) -> bool {
        self.to_endpoint.is_closed()
    }
}

/// Endpoint half of the in-process transport.
#[derive(Debug)]
pub struct MemoryEndpoint {
    outgoing: mpsc::UnboundedSender<FrameSet>,
    incoming: mpsc::UnboundedReceiver<TransportResult<FrameSet>>,
}

impl Endpoint for MemoryEndpoint {
    fn send(&mut self, frames: FrameSet) -> BoxFuture<'_, TransportResult<()>> {
        let result = self
            .outgoing
            .send(frames)
            .map_err(|_| TransportError::Closed);
        Box::pin(async move { result })
    }

    fn recv(&mut self) -> BoxFuture<'_, TransportResult<FrameSet>> {
        Box::pin(async move { self.incoming.recv().await.unwrap_or(Err(TransportError::Closed)) })
    }

    fn try_recv(&mut self) -> Option<TransportResult<FrameSet>> {
        match self.incoming.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TransportError::Closed)),
        }
    }
}
