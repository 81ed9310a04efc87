//! Read and write surfaces the pool and the coordinator depend on.

use meridian_types::{Address, Block, ChainParams, ResultHash, Timestamp, Transaction};

use crate::projection::AccountSource;
use crate::rewards::RewardAddresses;
use crate::LedgerError;

/// Committed account state plus chain parameters: what admission control
/// and batch selection need.
pub trait LedgerView: AccountSource + Send + Sync {
    fn height(&self) -> Result<u64, LedgerError>;
    fn params(&self) -> &ChainParams;
}

/// Everything the consensus coordinator drives.
pub trait ChainLedger: LedgerView {
    fn build_block(
        &self,
        pending: Vec<Transaction>,
        miner: Address,
        rewards: &RewardAddresses,
        timestamp: Timestamp,
    ) -> Result<Block, LedgerError>;

    fn calculation_results(&self, block: &Block) -> Result<ResultHash, LedgerError>;

    fn check_results(&self, block: &Block, claimed: &ResultHash) -> bool;

    fn append(&self, block: &Block, miner: &Address) -> Result<(), LedgerError>;

    fn recover_block(&self, block: &Block, miner: &Address) -> Result<(), LedgerError>;

    fn get_block_section(&self, lo: u64, hi: u64) -> Result<Vec<Block>, LedgerError>;

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, LedgerError>;

    /// Roll back every block from the tip down to and including `height`.
    fn delete_block(&self, height: u64) -> Result<(), LedgerError>;
}
