//! Serving side of catch-up, membership forwarding, and block replay.

use std::sync::Arc;

use meridian_ledger::{ChainLedger, LedgerError};
use meridian_types::{Block, NodeId};
use tracing::{info, warn};

use crate::traits::ReplicatedLog;
use crate::ConsensusError;

/// Largest range answered in one call.
pub const MAX_RANGE: u64 = 500;

/// Answers catch-up queries from committed state.
#[derive(Clone)]
pub struct CatchUpService {
    ledger: Arc<dyn ChainLedger>,
    log: Arc<dyn ReplicatedLog>,
}

impl CatchUpService {
    pub fn new(ledger: Arc<dyn ChainLedger>, log: Arc<dyn ReplicatedLog>) -> Self {
        Self { ledger, log }
    }

    pub fn leader_max_height(&self) -> Result<u64, ConsensusError> {
        Ok(self.ledger.height()?)
    }

    /// Blocks `lo..=hi`, truncated to the local tip and to [`MAX_RANGE`].
    pub fn block_range(&self, lo: u64, hi: u64) -> Result<Vec<Block>, ConsensusError> {
        let lo = lo.max(1);
        let hi = hi
            .min(self.ledger.height()?)
            .min(lo.saturating_add(MAX_RANGE - 1));
        if hi < lo {
            return Ok(Vec::new());
        }
        Ok(self.ledger.get_block_section(lo, hi)?)
    }

    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, ConsensusError> {
        Ok(self.ledger.block_by_height(height)?)
    }

    pub async fn add_peer(&self, id: NodeId, endpoint: String) -> Result<(), ConsensusError> {
        if !self.log.is_leader() {
            return Err(ConsensusError::NotLeader);
        }
        info!(peer = id, %endpoint, "adding peer");
        self.log.add_peer(id, endpoint).await
    }

    pub async fn remove_peer(&self, id: NodeId) -> Result<(), ConsensusError> {
        if !self.log.is_leader() {
            return Err(ConsensusError::NotLeader);
        }
        info!(peer = id, "removing peer");
        self.log.remove_peer(id).await
    }
}

/// Re-commit recovered blocks in height order, skipping those already
/// applied. Returns the number of blocks committed.
pub fn replay_blocks(
    ledger: &dyn ChainLedger,
    blocks: impl IntoIterator<Item = Block>,
) -> Result<u64, ConsensusError> {
    let mut blocks: Vec<Block> = blocks.into_iter().collect();
    blocks.sort_by_key(|b| b.height);

    let mut applied = 0;
    for block in &blocks {
        let current = ledger.height()?;
        if block.height <= current {
            continue;
        }
        if block.height != current + 1 {
            warn!(expected = current + 1, found = block.height, "gap in replayed blocks");
            return Err(LedgerError::HeightMismatch {
                expected: current + 1,
                got: block.height,
            }
            .into());
        }
        ledger.recover_block(block, &block.miner)?;
        applied += 1;
    }
    if applied > 0 {
        info!(applied, height = ledger.height()?, "replayed blocks");
    }
    Ok(applied)
}
