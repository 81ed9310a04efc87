//! Blocks: height-sequenced batches of transactions.

use serde::{Deserialize, Serialize};

use crate::{Address, BlockHash, MerkleRoot, Timestamp, Transaction, TypesError};

/// A block in the chain. Heights start at 1 and increase by exactly one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    /// Hash of the parent block, or zero at height 1.
    pub prev_hash: BlockHash,
    pub hash: BlockHash,
    pub transactions: Vec<Transaction>,
    pub merkle_root: MerkleRoot,
    pub version: u32,
    pub timestamp: Timestamp,
    pub miner: Address,
}

impl Block {
    /// Bytes the block hash is computed over:
    /// `height_be ‖ prev_hash ‖ bincode(transactions) ‖ timestamp_be`.
    pub fn preimage(&self) -> Result<Vec<u8>, TypesError> {
        let txs = bincode::serialize(&self.transactions)?;
        let mut buf = Vec::with_capacity(8 + 32 + txs.len() + 8);
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(&txs);
        buf.extend_from_slice(&self.timestamp.as_secs().to_be_bytes());
        Ok(buf)
    }

    /// A committed block always ends with a coinbase.
    pub fn ends_with_coinbase(&self) -> bool {
        self.transactions
            .last()
            .map(Transaction::is_coinbase)
            .unwrap_or(false)
    }

    /// Sum of all coinbase amounts, or `None` on overflow.
    pub fn minted(&self) -> Option<u64> {
        self.transactions
            .iter()
            .filter(|tx| tx.is_coinbase())
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.amount))
    }
}
