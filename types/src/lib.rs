//! Fundamental types for the Meridian chain.
//!
//! This crate defines the data shared across every other crate in the workspace:
//! addresses, hashes, timestamps, transactions, blocks, and chain parameters.
//! Hashing and signing live in `meridian-crypto`; the types here only expose
//! the byte pre-images those digests are computed over.

pub mod address;
pub mod block;
pub mod error;
pub mod hash;
pub mod keys;
pub mod params;
pub mod time;
pub mod transaction;

pub use address::Address;
pub use block::Block;
pub use error::TypesError;
pub use hash::{BlockHash, MerkleRoot, OrderHash, ResultHash, TxHash};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use params::ChainParams;
pub use time::Timestamp;
pub use transaction::{Order, Transaction, TxKind, INITIAL_NONCE};

/// Identifier of a committee member in the replicated log.
pub type NodeId = u64;
