use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("parse error in statement {statement}: {reason}")]
    Parse { statement: usize, reason: String },

    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    #[error("{op} expects {expected} arguments, got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{op} argument {index} must be a {expected}")]
    ArgType {
        op: &'static str,
        index: usize,
        expected: &'static str,
    },

    #[error("empty script")]
    Empty,

    #[error("invalid address in script: {0}")]
    InvalidAddress(String),

    #[error("token {0} already exists")]
    TokenExists(String),

    #[error("token {0} not found")]
    TokenNotFound(String),

    #[error("permission denied on token {0}")]
    PermissionDenied(String),

    #[error("insufficient {token} balance: need {needed}, have {available}")]
    InsufficientBalance {
        token: String,
        needed: u64,
        available: u64,
    },

    #[error("mint would exceed total supply of {0}")]
    ExceedsSupply(String),

    #[error("holder {holder} is frozen on token {token}")]
    Frozen { token: String, holder: String },

    #[error("arithmetic overflow on token {0}")]
    Overflow(String),

    #[error("corrupt token state at {0}")]
    Corruption(String),

    #[error("storage error: {0}")]
    Store(#[from] meridian_store::StoreError),
}
