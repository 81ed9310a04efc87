//! A replicated log with exactly one member.
//!
//! Every proposal is appended locally and handed straight to the apply
//! channel. Peers added through the membership calls are only recorded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use meridian_consensus::{ConsensusError, ReplicatedLog};
use meridian_types::NodeId;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

pub struct SingleNodeLog {
    id: NodeId,
    apply: UnboundedSender<Vec<u8>>,
    next_index: AtomicU64,
    peers: Mutex<BTreeMap<NodeId, String>>,
}

impl SingleNodeLog {
    /// The log and the receiving end of its apply channel.
    pub fn new(id: NodeId) -> (Self, UnboundedReceiver<Vec<u8>>) {
        let (apply, rx) = unbounded_channel();
        (
            Self {
                id,
                apply,
                next_index: AtomicU64::new(1),
                peers: Mutex::new(BTreeMap::new()),
            },
            rx,
        )
    }

    /// Index the next proposal will receive.
    pub fn next_index(&self) -> u64 {
        self.next_index.load(Ordering::SeqCst)
    }

    pub fn peers(&self) -> Vec<(NodeId, String)> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, endpoint)| (*id, endpoint.clone()))
            .collect()
    }
}

#[async_trait]
impl ReplicatedLog for SingleNodeLog {
    async fn propose(&self, entry: Vec<u8>) -> Result<(), ConsensusError> {
        self.apply
            .send(entry)
            .map_err(|_| ConsensusError::Log("apply channel closed".into()))?;
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        debug!(index, "entry appended");
        Ok(())
    }

    fn leader(&self) -> Option<NodeId> {
        Some(self.id)
    }

    fn is_leader(&self) -> bool {
        true
    }

    async fn add_peer(&self, id: NodeId, endpoint: String) -> Result<(), ConsensusError> {
        info!(peer = id, %endpoint, "peer recorded; entries stay local");
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, endpoint);
        Ok(())
    }

    async fn remove_peer(&self, id: NodeId) -> Result<(), ConsensusError> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(())
    }

    async fn transfer_leadership(&self) -> Result<(), ConsensusError> {
        debug!("sole member keeps leadership");
        Ok(())
    }
}
