//! Fault-tolerant, backpressure-aware client for fleets of
//! Ethereum-compatible JSON-RPC endpoints.
//!
//! [`Client`] composes a primary and backup tier of endpoints behind a
//! four-layer reliability stack: a per-endpoint [`valve::RequestValve`]
//! governs admission and adapts the log-range window, [`safe_node::SafeNode`]
//! wraps raw JSON-RPC into well-typed outcomes and enforces safe-block
//! queries, [`gateway::Gateway`] round-robins across a tier with failover
//! and cascades to backup, and [`log_stream::LogStream`] pipelines a
//! continuous forward scan of log history.

pub mod clock;
pub mod config;
pub mod error;
pub mod node;
pub mod rpc;
pub mod transport;
pub mod types;
pub mod valve;

pub mod safe_node;

pub mod gateway;

pub mod client;

pub mod log_stream;

#[cfg(test)]
pub(crate) mod tests_support;

pub use client::Client;
pub use config::{EndpointQuota, EthEndpoint};
pub use error::{ErrorKind, ValidationError};
pub use log_stream::{LogHandler, LogStream, LogStreamConfig};
