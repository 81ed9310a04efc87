//! Consensus and replication coordinator for a permissioned Meridian
//! committee.
//!
//! ## Module overview
//!
//! - [`coordinator`]: proposal, validation, voting, commit and catch-up.
//! - [`round`]: per-height round state machine.
//! - [`quorum`]: commit and abandon thresholds.
//! - [`catchup`]: serving blocks to lagging members, and block replay.
//! - [`traits`]: the replicated log, gossip, catch-up client and clock.

pub mod catchup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod quorum;
pub mod round;
pub mod traits;

pub use catchup::{replay_blocks, CatchUpService};
pub use config::CoordinatorConfig;
pub use coordinator::{Collaborators, Coordinator, Outcome, TickReport};
pub use error::ConsensusError;
pub use quorum::Verdict;
pub use round::{Round, RoundState};
pub use traits::{CatchUpClient, Clock, Gossip, ReplicatedLog, SystemClock};
