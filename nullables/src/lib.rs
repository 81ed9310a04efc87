//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator the node talks to (storage, time, the replicated log,
//! gossip and catch-up) has an in-process stand-in here that:
//! - returns deterministic values
//! - can be controlled programmatically
//! - never touches the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod catchup;
pub mod clock;
pub mod gossip;
pub mod log;
pub mod store;

pub use catchup::NullCatchUp;
pub use clock::NullClock;
pub use gossip::{NullGossip, NullGossipHub};
pub use log::{NullLog, NullLogCluster};
pub use store::NullStore;
