//! Message transports.
//!
//! The engines talk to the broker through an [`Endpoint`], opened by a
//! [`Connector`]. Two implementations ship with the crate:
//!
//! - [`tcp`]: length-prefixed multipart frames over TCP
//! - [`memory`]: in-process channels, for tests and for driving handlers
//!   without a broker
//!
//! Both `send` and `recv` are cancel-safe: dropping the future before it
//! completes loses nothing that was not already delivered, so the engines
//! can race them against timers.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use skylink_core::Identity;
use skylink_protocol::{FrameSet, ProtocolError};

pub mod memory;
pub mod tcp;

pub use memory::{MemoryAcceptor, MemoryConnector, MemoryEndpoint, MemoryPeer};
pub use tcp::{TcpConnector, TcpEndpoint};

/// A boxed future for the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    #[error("connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Messaging pattern of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Strict request/reply, used by the client.
    Sync,
    /// Free-running dealer, used by the worker.
    Async,
}

impl EndpointKind {
    /// Name announced in the connection greeting.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Sync => "req",
            EndpointKind::Async => "dealer",
        }
    }
}

/// An open connection to the broker. Dropping it closes the connection.
pub trait Endpoint: Send {
    /// Queue a message for delivery.
    fn send(&mut self, frames: FrameSet) -> BoxFuture<'_, TransportResult<()>>;

    /// Wait for the next message.
    fn recv(&mut self) -> BoxFuture<'_, TransportResult<FrameSet>>;

    /// A message that has already arrived, without waiting. `None` when
    /// nothing is queued.
    fn try_recv(&mut self) -> Option<TransportResult<FrameSet>>;
}

/// Opens endpoints.
pub trait Connector: Send + Sync {
    type Endpoint: Endpoint + 'static;

    fn connect<'a>(
        &'a self,
        address: &'a str,
        identity: &'a Identity,
        kind: EndpointKind,
    ) -> BoxFuture<'a, TransportResult<Self::Endpoint>>;
}
