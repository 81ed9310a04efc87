//! Token contract state: key layout, read access, and undo journals.

use std::collections::BTreeMap;

use meridian_store::{KvStore, OptionalExt, Transaction};
use serde::{Deserialize, Serialize};

use crate::ScriptError;

/// Every token key lives under this plain-key prefix.
pub const TOKEN_NAMESPACE: &[u8] = b"tok/";

pub(crate) fn owner_key(token: &str) -> Vec<u8> {
    key(&["owner", token])
}

pub(crate) fn balance_key(token: &str, holder: &str) -> Vec<u8> {
    key(&["b", token, holder])
}

pub(crate) fn total_key(token: &str) -> Vec<u8> {
    key(&["t", token])
}

pub(crate) fn circulating_key(token: &str) -> Vec<u8> {
    key(&["c", token])
}

pub(crate) fn precision_key(token: &str) -> Vec<u8> {
    key(&["p", token])
}

pub(crate) fn frozen_key(token: &str, holder: &str) -> Vec<u8> {
    key(&["f", token, holder])
}

fn key(parts: &[&str]) -> Vec<u8> {
    let mut out = TOKEN_NAMESPACE.to_vec();
    out.extend_from_slice(parts.join("/").as_bytes());
    out
}

pub(crate) fn decode_u64(key: &[u8], raw: &[u8]) -> Result<u64, ScriptError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| ScriptError::Corruption(String::from_utf8_lossy(key).into_owned()))?;
    Ok(u64::from_le_bytes(bytes))
}

/// Read access to token state. Keys are full plain keys including
/// [`TOKEN_NAMESPACE`].
pub trait ScriptDb {
    fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ScriptError>;
}

impl ScriptDb for Transaction<'_> {
    fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ScriptError> {
        Ok(self.get(key).optional()?)
    }
}

/// Committed-only view of a store, for pure (read-only) execution.
pub struct Committed<'a>(pub &'a dyn KvStore);

impl ScriptDb for Committed<'_> {
    fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ScriptError> {
        Ok(self.0.get(key).optional()?)
    }
}

/// Accumulates the writes of several executions on top of a base view, so
/// a whole block's scripts can be evaluated without touching storage.
pub struct Overlay<'a> {
    base: &'a dyn ScriptDb,
    writes: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl<'a> Overlay<'a> {
    pub fn new(base: &'a dyn ScriptDb) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    pub fn absorb(&mut self, diff: &crate::ScriptDiff) {
        for (k, v) in diff.writes() {
            self.writes.insert(k.to_vec(), v.to_vec());
        }
    }
}

impl ScriptDb for Overlay<'_> {
    fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ScriptError> {
        match self.writes.get(key) {
            Some(v) => Ok(Some(v.clone())),
            None => self.base.load(key),
        }
    }
}

/// Pre-images of every key a script wrote, captured before its first write.
/// Restoring them undoes the script exactly, including keys that did not
/// exist before.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    entries: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl Journal {
    pub(crate) fn from_entries(entries: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Vec<u8>, Option<Vec<u8>>)] {
        &self.entries
    }

    pub fn encode(&self) -> Result<Vec<u8>, ScriptError> {
        bincode::serialize(self).map_err(|e| ScriptError::Store(e.into()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ScriptError> {
        bincode::deserialize(bytes).map_err(|e| ScriptError::Corruption(format!("journal: {e}")))
    }

    pub fn restore(&self, txn: &mut Transaction<'_>) {
        for (key, before) in &self.entries {
            match before {
                Some(v) => txn.set(key, v),
                None => txn.del(key),
            }
        }
    }
}

/// Balance of `holder` in `token`; zero if either is unknown.
pub fn token_balance(db: &dyn ScriptDb, token: &str, holder: &str) -> Result<u64, ScriptError> {
    let key = balance_key(token, holder);
    match db.load(&key)? {
        Some(raw) => decode_u64(&key, &raw),
        None => Ok(0),
    }
}
