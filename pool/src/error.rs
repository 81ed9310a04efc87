use meridian_ledger::LedgerError;
use meridian_script::ScriptError;
use meridian_types::Address;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool is full")]
    PoolFull,

    #[error("sender {0} has too many pending transactions")]
    SenderLimit(Address),

    #[error("sender {sender} already has a pending transaction with nonce {nonce}")]
    DuplicateNonce { sender: Address, nonce: u64 },

    #[error("malformed {0} address")]
    MalformedAddress(&'static str),

    #[error("transaction hash does not match its contents")]
    BadHash,

    #[error("invalid signature")]
    BadSignature,

    #[error("nonce too low: expected at least {expected}, got {got}")]
    NonceTooLow { expected: u64, got: u64 },

    #[error("insufficient balance for {address}: need {needed}, have {available}")]
    InsufficientBalance {
        address: Address,
        needed: u64,
        available: u64,
    },

    #[error("amount {amount} is below the minimum of {min}")]
    BelowMinimum { amount: u64, min: u64 },

    #[error("token transaction fee {fee} is below the minimum of {min}")]
    FeeTooLow { fee: u64, min: u64 },

    #[error("order is not signed by the marketplace")]
    InvalidOrder,

    #[error("invalid script: {0}")]
    InvalidScript(#[from] ScriptError),

    #[error("{0} is not an admin address")]
    NotAdmin(Address),

    #[error("coinbase transactions are only created by block producers")]
    CoinbaseNotAdmissible,

    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for PoolError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance {
                address,
                needed,
                available,
            } => PoolError::InsufficientBalance {
                address,
                needed,
                available,
            },
            LedgerError::NotAdmin(a) => PoolError::NotAdmin(a),
            other => PoolError::Ledger(other),
        }
    }
}
