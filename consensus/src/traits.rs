//! Collaborators the coordinator drives but does not implement.

use async_trait::async_trait;
use meridian_messages::GossipMessage;
use meridian_types::{Block, NodeId, Timestamp};

use crate::ConsensusError;

/// A leader-elected, durable, ordered log shared by the committee.
///
/// Entries passed to [`ReplicatedLog::propose`] are delivered, in log order,
/// to every member's apply channel; how that channel is exposed is up to the
/// implementation.
#[async_trait]
pub trait ReplicatedLog: Send + Sync {
    async fn propose(&self, entry: Vec<u8>) -> Result<(), ConsensusError>;

    fn leader(&self) -> Option<NodeId>;

    fn is_leader(&self) -> bool;

    async fn add_peer(&self, id: NodeId, endpoint: String) -> Result<(), ConsensusError>;

    async fn remove_peer(&self, id: NodeId) -> Result<(), ConsensusError>;

    async fn transfer_leadership(&self) -> Result<(), ConsensusError>;
}

/// Best-effort fan-out to the other committee members.
#[async_trait]
pub trait Gossip: Send + Sync {
    async fn broadcast(&self, message: GossipMessage) -> Result<(), ConsensusError>;
}

/// Block download from the current leader.
#[async_trait]
pub trait CatchUpClient: Send + Sync {
    async fn leader_max_height(&self, leader: NodeId) -> Result<u64, ConsensusError>;

    /// Blocks `lo..=hi` in height order. May return fewer than asked.
    async fn block_range(
        &self,
        leader: NodeId,
        lo: u64,
        hi: u64,
    ) -> Result<Vec<Block>, ConsensusError>;

    async fn block_by_height(
        &self,
        leader: NodeId,
        height: u64,
    ) -> Result<Option<Block>, ConsensusError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
