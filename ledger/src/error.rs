use meridian_crypto::CryptoError;
use meridian_script::ScriptError;
use meridian_store::StoreError;
use meridian_types::{Address, TypesError};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("insufficient balance for {address}: need {needed}, have {available}")]
    InsufficientBalance {
        address: Address,
        needed: u64,
        available: u64,
    },

    #[error("arithmetic overflow on {0}")]
    Overflow(&'static str),

    #[error("nonce mismatch for {address}: expected {expected}, got {got}")]
    NonceMismatch {
        address: Address,
        expected: u64,
        got: u64,
    },

    #[error("{0} is not an admin address")]
    NotAdmin(Address),

    #[error("block has no transactions")]
    EmptyBlock,

    #[error("block at height {0} not found")]
    BlockNotFound(u64),

    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Codec(e.to_string())
    }
}

impl From<CryptoError> for LedgerError {
    fn from(e: CryptoError) -> Self {
        LedgerError::Codec(e.to_string())
    }
}

impl From<TypesError> for LedgerError {
    fn from(e: TypesError) -> Self {
        LedgerError::Codec(e.to_string())
    }
}
