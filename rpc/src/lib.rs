//! HTTP surface of a Meridian node.
//!
//! Serves:
//! - catch-up queries (`/height`, `/blocks`, `/block/:height`)
//! - membership changes forwarded to the replicated log (`/peers/*`)
//! - gossip ingestion (`/gossip`) and transaction submission (`/tx`)
//! - Prometheus metrics (`/metrics`)
//!
//! [`HttpPeers`] is the matching client. It implements the coordinator's
//! catch-up and gossip traits over the same routes.

pub mod client;
pub mod error;
pub mod server;

pub use client::HttpPeers;
pub use error::RpcError;
pub use server::{router, Inbound, RpcServer, RpcState};
