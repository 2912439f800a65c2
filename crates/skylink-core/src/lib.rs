//! Core types: connection identity, tracing setup

pub mod identity;
pub mod tracing;

pub use identity::{Identity, IdentityError, Role};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
