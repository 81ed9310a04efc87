//! LMDB storage backend for the Meridian chain.
//!
//! Implements [`meridian_store::KvStore`] with the `heed` LMDB bindings. The
//! whole logical keyspace lives in one named LMDB database; each
//! [`meridian_store::WriteBatch`] is applied inside a single write transaction.

pub mod environment;
pub mod error;

pub use environment::LmdbStore;
pub use error::LmdbError;
