//! LMDB environment setup and the [`KvStore`] implementation.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use meridian_store::{KvStore, StoreError, WriteBatch};
use tracing::{debug, info};

use crate::LmdbError;

/// Default map size: 16 GiB of address space (LMDB grows the file lazily).
pub const DEFAULT_MAP_SIZE: usize = 16 << 30;

const DB_NAME: &str = "meridian";

/// An LMDB-backed store holding the whole keyspace in one database.
pub struct LmdbStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open or create an environment at `path`, creating the directory if needed.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per path by this process and
        // the files are not modified externally while it is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path)?
        };
        let mut wtxn = env.write_txn()?;
        let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(DB_NAME))?;
        wtxn.commit()?;
        info!(path = %path.display(), map_size, "opened LMDB store");
        Ok(Self { env, db })
    }
}

impl KvStore for LmdbStore {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let value = self.db.get(&rtxn, key).map_err(LmdbError::from)?;
        Ok(value.map(<[u8]>::to_vec))
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let ops = batch.len();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for (key, value) in batch.iter() {
            match value {
                Some(v) => self.db.put(&mut wtxn, key, v).map_err(LmdbError::from)?,
                None => {
                    self.db.delete(&mut wtxn, key).map_err(LmdbError::from)?;
                }
            }
        }
        // Dropping `wtxn` on an earlier error aborts the LMDB transaction.
        wtxn.commit().map_err(LmdbError::from)?;
        debug!(ops, "applied write batch");
        Ok(())
    }
}
