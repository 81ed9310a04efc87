use meridian_ledger::LedgerError;
use meridian_messages::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("this node is not the leader")]
    NotLeader,

    #[error("no leader is known")]
    NoLeader,

    #[error("catch-up request timed out")]
    CatchUpTimeout,

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error(transparent)]
    Codec(#[from] MessageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("replicated log error: {0}")]
    Log(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
