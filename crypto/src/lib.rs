//! Cryptographic primitives for the Meridian chain.
//!
//! - **Ed25519** for transaction and order signatures
//! - **Blake2b-256** for transaction, block, and order hashes
//! - **SHA-256** for Merkle roots and state commitments
//! - Address derivation with the `mrd_` prefix

pub mod address;
pub mod error;
pub mod hash;
pub mod keys;
pub mod merkle;
pub mod sign;

pub use address::{derive_address, is_usable, validate_address};
pub use error::CryptoError;
pub use hash::{
    blake2b_256, blake2b_256_multi, hash_block, hash_order, hash_transaction, sha256, Sha256Writer,
};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use merkle::{merkle_root, transactions_root};
pub use sign::{
    seal_transaction, sign_message, sign_order, sign_transaction, verify_order,
    verify_signature, verify_transaction,
};
