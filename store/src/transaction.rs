//! Atomic read-your-writes transactions over any [`KvStore`].
//!
//! Writes are buffered in a [`WriteBatch`] and handed to the backend in one
//! [`KvStore::apply`] call on [`Transaction::commit`]. Dropping a transaction
//! without committing discards every buffered write.

use std::collections::BTreeMap;

use crate::keyspace::{self, ListMeta};
use crate::{KvStore, StoreError};

/// Ordered set of pending writes. `None` marks a deletion; the last write
/// to a key wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBatch {
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.insert(key, None);
    }

    /// `Some(None)` if the batch deletes `key`, `None` if it does not touch it.
    pub fn pending(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.ops.get(key).map(|v| v.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Option<&[u8]>)> {
        self.ops.iter().map(|(k, v)| (k.as_slice(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = (Vec<u8>, Option<Vec<u8>>);
    type IntoIter = std::collections::btree_map::IntoIter<Vec<u8>, Option<Vec<u8>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// A storage transaction: `Get/Set/Del`, `Mget/Mset/Mdel`,
/// `Lrange/Lpush/Rpush/Lpop/Lclear`, then `commit` or `cancel`.
pub struct Transaction<'a> {
    store: &'a dyn KvStore,
    batch: WriteBatch,
}

impl<'a> Transaction<'a> {
    pub fn begin(store: &'a dyn KvStore) -> Self {
        Self {
            store,
            batch: WriteBatch::default(),
        }
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.batch.pending(key) {
            Some(v) => Ok(v.map(<[u8]>::to_vec)),
            None => self.store.read(key),
        }
    }

    fn list_meta(&self, name: &[u8]) -> Result<ListMeta, StoreError> {
        ListMeta::decode(self.read(&keyspace::list(name))?)
    }

    fn write_list_meta(&mut self, name: &[u8], meta: ListMeta) {
        let key = keyspace::list(name);
        if meta.len == 0 {
            self.batch.delete(key);
        } else {
            self.batch.put(key, meta.encode());
        }
    }

    // ── Plain keys ──────────────────────────────────────────────────────

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.read(&keyspace::plain(key))?
            .ok_or_else(|| StoreError::not_found(key))
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.batch.put(keyspace::plain(key), value.to_vec());
    }

    pub fn del(&mut self, key: &[u8]) {
        self.batch.delete(keyspace::plain(key));
    }

    // ── Named maps ──────────────────────────────────────────────────────

    pub fn mget(&self, map: &[u8], key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.read(&keyspace::map_entry(map, key))?
            .ok_or_else(|| StoreError::not_found(key))
    }

    pub fn mset(&mut self, map: &[u8], key: &[u8], value: &[u8]) {
        self.batch.put(keyspace::map_entry(map, key), value.to_vec());
    }

    pub fn mdel(&mut self, map: &[u8], key: &[u8]) {
        self.batch.delete(keyspace::map_entry(map, key));
    }

    // ── Lists ───────────────────────────────────────────────────────────

    pub fn lrange(&self, list: &[u8], start: usize, end: usize) -> Result<Vec<Vec<u8>>, StoreError> {
        self.list_meta(list)?
            .window(start, end)
            .map(|pos| {
                self.read(&keyspace::list_item(list, pos))?
                    .ok_or_else(|| keyspace::missing_item(list, pos))
            })
            .collect()
    }

    /// Push to the front; returns the new length.
    pub fn lpush(&mut self, list: &[u8], value: &[u8]) -> Result<usize, StoreError> {
        let mut meta = self.list_meta(list)?;
        meta.head = meta
            .head
            .checked_sub(1)
            .ok_or_else(|| StoreError::Corruption("list grew past its front".into()))?;
        meta.len += 1;
        self.batch
            .put(keyspace::list_item(list, meta.head), value.to_vec());
        self.write_list_meta(list, meta);
        Ok(meta.len as usize)
    }

    /// Push to the back; returns the new length.
    pub fn rpush(&mut self, list: &[u8], value: &[u8]) -> Result<usize, StoreError> {
        let mut meta = self.list_meta(list)?;
        let pos = meta
            .head
            .checked_add(meta.len)
            .ok_or_else(|| StoreError::Corruption("list grew past its back".into()))?;
        meta.len += 1;
        self.batch.put(keyspace::list_item(list, pos), value.to_vec());
        self.write_list_meta(list, meta);
        Ok(meta.len as usize)
    }

    /// Remove and return the front element.
    pub fn lpop(&mut self, list: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut meta = self.list_meta(list)?;
        if meta.len == 0 {
            return Ok(None);
        }
        let key = keyspace::list_item(list, meta.head);
        let value = self
            .read(&key)?
            .ok_or_else(|| keyspace::missing_item(list, meta.head))?;
        self.batch.delete(key);
        meta.head += 1;
        meta.len -= 1;
        self.write_list_meta(list, meta);
        Ok(Some(value))
    }

    pub fn lclear(&mut self, list: &[u8]) -> Result<(), StoreError> {
        let meta = self.list_meta(list)?;
        for pos in meta.window(0, usize::MAX) {
            self.batch.delete(keyspace::list_item(list, pos));
        }
        self.write_list_meta(list, ListMeta::EMPTY);
        Ok(())
    }

    // ── Completion ──────────────────────────────────────────────────────

    /// Number of distinct physical keys this transaction will write.
    pub fn pending_writes(&self) -> usize {
        self.batch.len()
    }

    pub fn commit(self) -> Result<(), StoreError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        self.store.apply(self.batch)
    }

    pub fn cancel(self) {}
}
