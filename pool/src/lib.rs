//! Transaction pool for the Meridian chain.
//!
//! Admission validates a transaction against committed ledger state and
//! queues it per sender. Selection walks the queues in arrival order and
//! builds the next batch against a projection of the ledger, using the same
//! balance rule the ledger applies at commit. The pool also holds the vote
//! book the coordinator tallies rounds from.

pub mod config;
pub mod error;
pub mod pool;
mod queue;
pub mod validation;
pub mod votes;

pub use config::PoolConfig;
pub use error::PoolError;
pub use pool::TxPool;
pub use validation::{validate, validate_static};
pub use votes::VoteRecord;
