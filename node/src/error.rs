use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] meridian_ledger::LedgerError),

    #[error("pool rejected transaction: {0}")]
    Pool(#[from] meridian_pool::PoolError),

    #[error("consensus error: {0}")]
    Consensus(#[from] meridian_consensus::ConsensusError),

    #[error("store error: {0}")]
    Store(#[from] meridian_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] meridian_store_lmdb::LmdbError),

    #[error("RPC error: {0}")]
    Rpc(#[from] meridian_rpc::RpcError),

    #[error("config error: {0}")]
    Config(String),

    #[error("block dump {path}: {reason}")]
    Dump { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node already started")]
    AlreadyStarted,
}
