//! Error type for malformed primitive values.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for TypesError {
    fn from(e: bincode::Error) -> Self {
        TypesError::Serialization(e.to_string())
    }
}
