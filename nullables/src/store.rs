//! Nullable store: in-memory storage with injectable write failures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use meridian_store::{KvStore, MemStore, StoreError, WriteBatch};

/// An in-memory [`KvStore`] whose writes can be made to fail on demand.
#[derive(Default)]
pub struct NullStore {
    inner: MemStore,
    fail_writes: AtomicBool,
    fail_next_write: AtomicBool,
    commits: AtomicUsize,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only the next write fail.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Number of batches applied successfully.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Copy of every physical key and value.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.inner.snapshot()
    }
}

impl KvStore for NullStore {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.read(key)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) || self.fail_next_write.swap(false, Ordering::SeqCst)
        {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        self.inner.apply(batch)?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_failure_leaves_data_untouched() {
        let store = NullStore::new();
        store.set(b"a", b"1").unwrap();
        let before = store.snapshot();

        store.fail_next_write();
        assert!(matches!(store.set(b"a", b"2"), Err(StoreError::Backend(_))));
        assert_eq!(store.snapshot(), before);

        store.set(b"a", b"2").unwrap();
        assert_eq!(store.get(b"a").unwrap(), b"2".to_vec());
        assert_eq!(store.commits(), 2);
    }

    #[test]
    fn persistent_failure_until_cleared() {
        let store = NullStore::new();
        store.set_fail_writes(true);
        assert!(store.set(b"k", b"v").is_err());
        assert!(store.set(b"k", b"v").is_err());
        store.set_fail_writes(false);
        assert!(store.set(b"k", b"v").is_ok());
    }
}
