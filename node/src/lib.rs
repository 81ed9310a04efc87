//! Meridian node: orchestrates the ledger, the pool and the coordinator.
//!
//! The node:
//! - loads its configuration from TOML
//! - applies genesis and replays dumped blocks at startup
//! - feeds replicated log entries and gossip into the coordinator
//! - ticks round timers and proposes when it leads
//! - serves the HTTP surface and Prometheus metrics

pub mod config;
pub mod dump;
pub mod error;
pub mod metrics;
pub mod node;
pub mod shutdown;
pub mod single_log;

pub use config::{GenesisAllocation, LoggingConfig, NodeConfig, PeerConfig};
pub use error::NodeError;
pub use metrics::NodeMetrics;
pub use node::{MeridianNode, NodeParts};
pub use shutdown::ShutdownController;
pub use single_log::SingleNodeLog;
