//! Storage engine contract for the Meridian chain.
//!
//! A backend only has to provide point reads and atomic batch writes over a
//! flat ordered keyspace ([`KvStore::read`] / [`KvStore::apply`]). Everything
//! the ledger needs on top of that (plain keys, named maps, ordered lists,
//! and all-or-nothing [`Transaction`]s) is layered here so every backend
//! behaves identically.

pub mod error;
pub mod keyspace;
pub mod memory;
pub mod transaction;

pub use error::{OptionalExt, StoreError};
pub use memory::MemStore;
pub use transaction::{Transaction, WriteBatch};

/// A storage backend.
///
/// Reads through the default methods observe only committed data; use
/// [`Transaction::begin`] for read-your-writes within an atomic unit.
pub trait KvStore: Send + Sync {
    /// Raw point read of a physical key.
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically apply every operation in `batch`, or none of them.
    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.read(&keyspace::plain(key))?
            .ok_or_else(|| StoreError::not_found(key))
    }

    fn mget(&self, map: &[u8], key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.read(&keyspace::map_entry(map, key))?
            .ok_or_else(|| StoreError::not_found(key))
    }

    /// Items `[start, end)` of a list; absent lists are empty.
    fn lrange(&self, list: &[u8], start: usize, end: usize) -> Result<Vec<Vec<u8>>, StoreError> {
        let meta = keyspace::ListMeta::decode(self.read(&keyspace::list(list))?)?;
        meta.window(start, end)
            .map(|pos| {
                self.read(&keyspace::list_item(list, pos))?
                    .ok_or_else(|| keyspace::missing_item(list, pos))
            })
            .collect()
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.put(keyspace::plain(key), value.to_vec());
        self.apply(batch)
    }

    fn del(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.delete(keyspace::plain(key));
        self.apply(batch)
    }

    fn mset(&self, map: &[u8], key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.put(keyspace::map_entry(map, key), value.to_vec());
        self.apply(batch)
    }

    fn mdel(&self, map: &[u8], key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.delete(keyspace::map_entry(map, key));
        self.apply(batch)
    }
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).read(key)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        (**self).apply(batch)
    }
}
