//! Broker client and worker engines, transports, configuration
//!
//! - [`Client`]: request/response calls (broadcast, channels, access tokens)
//! - [`Worker`]: long-lived subscription that survives broker silence
//! - [`Router`]: dispatches worker events to named backends

pub mod client;
pub mod config;
pub mod error;
pub mod router;
pub mod secret;
pub mod transport;
pub mod worker;

pub use client::Client;
pub use config::{BrokerUrl, ClientConfig, Settings, SettingsError, WorkerConfig};
pub use error::{ClientError, ClientResult};
pub use router::{Backend, Replies, Reply, RouteError, Router, forward_replies};
pub use transport::{Connector, Endpoint, EndpointKind, TransportError};
pub use worker::{
    ListenExit, StopHandle, Worker, WorkerError, WorkerHandler, WorkerResult, WorkerState,
    WorkerStats,
};
