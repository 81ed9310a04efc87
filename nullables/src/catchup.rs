//! Nullable catch-up client: answers straight from other members' services.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use meridian_consensus::{CatchUpClient, CatchUpService, ConsensusError};
use meridian_types::{Block, NodeId};

/// Routes catch-up calls to in-process [`CatchUpService`]s by node id.
#[derive(Clone, Default)]
pub struct NullCatchUp {
    services: Arc<Mutex<BTreeMap<NodeId, CatchUpService>>>,
}

impl NullCatchUp {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<NodeId, CatchUpService>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, id: NodeId, service: CatchUpService) {
        self.lock().insert(id, service);
    }

    /// Make `id` unreachable.
    pub fn unregister(&self, id: NodeId) {
        self.lock().remove(&id);
    }

    fn service(&self, id: NodeId) -> Result<CatchUpService, ConsensusError> {
        self.lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ConsensusError::Rpc(format!("node {id} is unreachable")))
    }
}

#[async_trait]
impl CatchUpClient for NullCatchUp {
    async fn leader_max_height(&self, leader: NodeId) -> Result<u64, ConsensusError> {
        self.service(leader)?.leader_max_height()
    }

    async fn block_range(
        &self,
        leader: NodeId,
        lo: u64,
        hi: u64,
    ) -> Result<Vec<Block>, ConsensusError> {
        self.service(leader)?.block_range(lo, hi)
    }

    async fn block_by_height(
        &self,
        leader: NodeId,
        height: u64,
    ) -> Result<Option<Block>, ConsensusError> {
        self.service(leader)?.block_by_height(height)
    }
}
