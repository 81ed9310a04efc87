//! Nullable gossip: in-process fan-out between test members.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use meridian_consensus::{ConsensusError, Gossip};
use meridian_messages::GossipMessage;
use meridian_types::NodeId;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Default)]
struct HubState {
    members: BTreeMap<NodeId, UnboundedSender<GossipMessage>>,
    muted: BTreeSet<NodeId>,
    sent: Vec<(NodeId, GossipMessage)>,
}

/// Shared hub; each member receives what the others broadcast.
#[derive(Clone, Default)]
pub struct NullGossipHub {
    state: Arc<Mutex<HubState>>,
}

impl NullGossipHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn join(&self, id: NodeId) -> (NullGossip, UnboundedReceiver<GossipMessage>) {
        let (tx, rx) = unbounded_channel();
        self.lock().members.insert(id, tx);
        (
            NullGossip {
                id,
                hub: self.clone(),
            },
            rx,
        )
    }

    /// Drop everything `id` broadcasts from now on.
    pub fn mute(&self, id: NodeId) {
        self.lock().muted.insert(id);
    }

    /// Every broadcast so far with its sender, muted ones included.
    pub fn sent(&self) -> Vec<(NodeId, GossipMessage)> {
        self.lock().sent.clone()
    }
}

/// One member's gossip handle.
#[derive(Clone)]
pub struct NullGossip {
    id: NodeId,
    hub: NullGossipHub,
}

#[async_trait]
impl Gossip for NullGossip {
    async fn broadcast(&self, message: GossipMessage) -> Result<(), ConsensusError> {
        let mut state = self.hub.lock();
        state.sent.push((self.id, message.clone()));
        if state.muted.contains(&self.id) {
            return Ok(());
        }
        for (id, tx) in &state.members {
            if *id != self.id {
                let _ = tx.send(message.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_messages::VoteMessage;
    use meridian_types::ResultHash;

    fn vote(voter: NodeId) -> GossipMessage {
        GossipMessage::Vote(VoteMessage {
            voter,
            height: 1,
            result_hash: ResultHash::ZERO,
            agree: true,
        })
    }

    #[tokio::test]
    async fn broadcasts_skip_the_sender() {
        let hub = NullGossipHub::new();
        let (a, mut rx_a) = hub.join(1);
        let (_b, mut rx_b) = hub.join(2);

        a.broadcast(vote(1)).await.unwrap();
        assert_eq!(rx_b.recv().await.unwrap(), vote(1));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn muted_member_is_recorded_but_unheard() {
        let hub = NullGossipHub::new();
        let (a, _rx_a) = hub.join(1);
        let (_b, mut rx_b) = hub.join(2);
        hub.mute(1);

        a.broadcast(vote(1)).await.unwrap();
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.sent().len(), 1);
    }
}
