//! Nullable replicated log: an in-process cluster hub.
//!
//! Every member joined to a [`NullLogCluster`] gets a [`NullLog`] handle and
//! an apply channel. Entries proposed by the leader are recorded in order
//! and pushed to every connected member's channel. Members can be isolated
//! to simulate missed entries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use meridian_consensus::{ConsensusError, ReplicatedLog};
use meridian_types::NodeId;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

#[derive(Default)]
struct ClusterState {
    leader: Option<NodeId>,
    members: BTreeMap<NodeId, UnboundedSender<Vec<u8>>>,
    isolated: BTreeSet<NodeId>,
    endpoints: BTreeMap<NodeId, String>,
    entries: Vec<Vec<u8>>,
}

/// Shared hub the members of one test cluster join.
#[derive(Clone, Default)]
pub struct NullLogCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl NullLogCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a member. The first member to join becomes leader.
    pub fn join(&self, id: NodeId) -> (NullLog, UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = unbounded_channel();
        let mut state = self.lock();
        state.members.insert(id, tx);
        if state.leader.is_none() {
            state.leader = Some(id);
        }
        (
            NullLog {
                id,
                cluster: self.clone(),
            },
            rx,
        )
    }

    pub fn set_leader(&self, id: NodeId) {
        self.lock().leader = Some(id);
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.lock().leader
    }

    /// Stop delivering entries to `id`.
    pub fn isolate(&self, id: NodeId) {
        self.lock().isolated.insert(id);
    }

    pub fn reconnect(&self, id: NodeId) {
        self.lock().isolated.remove(&id);
    }

    /// Every entry proposed so far, in log order.
    pub fn entries(&self) -> Vec<Vec<u8>> {
        self.lock().entries.clone()
    }

    /// Push an entry to one member only, bypassing the leader check.
    pub fn deliver_to(&self, id: NodeId, entry: Vec<u8>) -> bool {
        self.lock()
            .members
            .get(&id)
            .is_some_and(|tx| tx.send(entry).is_ok())
    }

    pub fn endpoint(&self, id: NodeId) -> Option<String> {
        self.lock().endpoints.get(&id).cloned()
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.lock().members.keys().copied().collect()
    }
}

/// One member's view of a [`NullLogCluster`].
#[derive(Clone)]
pub struct NullLog {
    id: NodeId,
    cluster: NullLogCluster,
}

impl NullLog {
    pub fn id(&self) -> NodeId {
        self.id
    }
}

#[async_trait]
impl ReplicatedLog for NullLog {
    async fn propose(&self, entry: Vec<u8>) -> Result<(), ConsensusError> {
        let mut state = self.cluster.lock();
        if state.leader != Some(self.id) {
            return Err(ConsensusError::NotLeader);
        }
        state.entries.push(entry.clone());
        let index = state.entries.len();
        for (id, tx) in &state.members {
            if !state.isolated.contains(id) {
                // A member that dropped its receiver has left; nothing to do.
                let _ = tx.send(entry.clone());
            }
        }
        debug!(leader = self.id, index, "entry replicated");
        Ok(())
    }

    fn leader(&self) -> Option<NodeId> {
        self.cluster.lock().leader
    }

    fn is_leader(&self) -> bool {
        self.leader() == Some(self.id)
    }

    async fn add_peer(&self, id: NodeId, endpoint: String) -> Result<(), ConsensusError> {
        let mut state = self.cluster.lock();
        if state.leader != Some(self.id) {
            return Err(ConsensusError::NotLeader);
        }
        state.endpoints.insert(id, endpoint);
        Ok(())
    }

    async fn remove_peer(&self, id: NodeId) -> Result<(), ConsensusError> {
        let mut state = self.cluster.lock();
        if state.leader != Some(self.id) {
            return Err(ConsensusError::NotLeader);
        }
        state.endpoints.remove(&id);
        state.members.remove(&id);
        Ok(())
    }

    /// Hands leadership to the next member in id order, wrapping around.
    async fn transfer_leadership(&self) -> Result<(), ConsensusError> {
        let mut state = self.cluster.lock();
        if state.leader != Some(self.id) {
            return Err(ConsensusError::NotLeader);
        }
        let next = state
            .members
            .range(self.id + 1..)
            .chain(state.members.range(..self.id))
            .map(|(id, _)| *id)
            .next();
        if let Some(next) = next {
            state.leader = Some(next);
            debug!(from = self.id, to = next, "leadership transferred");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leader_entries_reach_connected_members_in_order() {
        let cluster = NullLogCluster::new();
        let (leader, mut rx1) = cluster.join(1);
        let (follower, mut rx2) = cluster.join(2);
        let (_third, mut rx3) = cluster.join(3);
        cluster.isolate(3);

        assert!(leader.is_leader());
        assert!(!follower.is_leader());
        assert!(matches!(
            follower.propose(b"x".to_vec()).await,
            Err(ConsensusError::NotLeader)
        ));

        leader.propose(b"a".to_vec()).await.unwrap();
        leader.propose(b"b".to_vec()).await.unwrap();
        assert_eq!(rx1.recv().await.unwrap(), b"a".to_vec());
        assert_eq!(rx2.recv().await.unwrap(), b"a".to_vec());
        assert_eq!(rx2.recv().await.unwrap(), b"b".to_vec());
        assert!(rx3.try_recv().is_err());
        assert_eq!(cluster.entries().len(), 2);
    }

    #[tokio::test]
    async fn leadership_rotates_by_id() {
        let cluster = NullLogCluster::new();
        let (one, _r1) = cluster.join(1);
        let (_two, _r2) = cluster.join(2);
        let (three, _r3) = cluster.join(3);

        one.transfer_leadership().await.unwrap();
        assert_eq!(cluster.leader(), Some(2));
        cluster.set_leader(3);
        three.transfer_leadership().await.unwrap();
        assert_eq!(cluster.leader(), Some(1));
    }

    #[tokio::test]
    async fn membership_changes_are_leader_only() {
        let cluster = NullLogCluster::new();
        let (one, _r1) = cluster.join(1);
        let (two, _r2) = cluster.join(2);

        assert!(two.add_peer(9, "http://n9".into()).await.is_err());
        one.add_peer(9, "http://n9".into()).await.unwrap();
        assert_eq!(cluster.endpoint(9).as_deref(), Some("http://n9"));
        one.remove_peer(2).await.unwrap();
        assert_eq!(cluster.members(), vec![1]);
    }
}
