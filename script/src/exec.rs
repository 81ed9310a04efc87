//! Instruction execution.

use std::collections::BTreeMap;

use meridian_crypto::merkle_root;
use meridian_store::Transaction;
use meridian_types::{Address, MerkleRoot};
use tracing::trace;

use crate::state::{
    balance_key, circulating_key, decode_u64, frozen_key, owner_key, precision_key, total_key,
    Journal, ScriptDb,
};
use crate::{Instruction, ScriptError};

/// The writes produced by one script, plus the values they replaced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptDiff {
    writes: BTreeMap<Vec<u8>, Vec<u8>>,
    before: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl ScriptDiff {
    pub fn writes(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.writes.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Merkle root over the sorted `key, value, key, value, ...` sequence.
    pub fn root(&self) -> MerkleRoot {
        let leaves: Vec<&[u8]> = self
            .writes
            .iter()
            .flat_map(|(k, v)| [k.as_slice(), v.as_slice()])
            .collect();
        merkle_root(&leaves)
    }

    pub fn flush(&self, txn: &mut Transaction<'_>) {
        for (k, v) in &self.writes {
            txn.set(k, v);
        }
    }

    pub fn journal(&self) -> Journal {
        Journal::from_entries(
            self.before
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

struct Machine<'a> {
    db: &'a dyn ScriptDb,
    diff: ScriptDiff,
}

impl Machine<'_> {
    fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ScriptError> {
        match self.diff.writes.get(key) {
            Some(v) => Ok(Some(v.clone())),
            None => self.db.load(key),
        }
    }

    fn load_u64(&self, key: &[u8]) -> Result<u64, ScriptError> {
        match self.load(key)? {
            Some(raw) => decode_u64(key, &raw),
            None => Ok(0),
        }
    }

    fn store(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), ScriptError> {
        if !self.diff.before.contains_key(&key) {
            let prior = self.db.load(&key)?;
            self.diff.before.insert(key.clone(), prior);
        }
        self.diff.writes.insert(key, value);
        Ok(())
    }

    fn store_u64(&mut self, key: Vec<u8>, value: u64) -> Result<(), ScriptError> {
        self.store(key, value.to_le_bytes().to_vec())
    }

    fn owner(&self, token: &str) -> Result<String, ScriptError> {
        let raw = self
            .load(&owner_key(token))?
            .ok_or_else(|| ScriptError::TokenNotFound(token.to_string()))?;
        String::from_utf8(raw).map_err(|_| ScriptError::Corruption(format!("owner of {token}")))
    }

    fn require_owner(&self, token: &str, executor: &str) -> Result<(), ScriptError> {
        if self.owner(token)? != executor {
            return Err(ScriptError::PermissionDenied(token.to_string()));
        }
        Ok(())
    }

    fn step(&mut self, instr: &Instruction, executor: &str) -> Result<(), ScriptError> {
        match instr {
            Instruction::New {
                token,
                total,
                precision,
            } => {
                if self.load(&owner_key(token))?.is_some() {
                    return Err(ScriptError::TokenExists(token.clone()));
                }
                self.store(owner_key(token), executor.as_bytes().to_vec())?;
                self.store_u64(total_key(token), *total)?;
                self.store_u64(circulating_key(token), 0)?;
                self.store_u64(precision_key(token), *precision)?;
                self.store_u64(balance_key(token, executor), 0)?;
                self.store_u64(frozen_key(token, executor), 0)?;
            }
            Instruction::Mint { token, amount } => {
                self.require_owner(token, executor)?;
                let circulating = self
                    .load_u64(&circulating_key(token))?
                    .checked_add(*amount)
                    .ok_or_else(|| ScriptError::Overflow(token.clone()))?;
                if circulating > self.load_u64(&total_key(token))? {
                    return Err(ScriptError::ExceedsSupply(token.clone()));
                }
                let balance = self
                    .load_u64(&balance_key(token, executor))?
                    .checked_add(*amount)
                    .ok_or_else(|| ScriptError::Overflow(token.clone()))?;
                self.store_u64(circulating_key(token), circulating)?;
                self.store_u64(balance_key(token, executor), balance)?;
            }
            Instruction::Transfer { token, amount, to } => {
                check_address(to)?;
                self.owner(token)?;
                if self.load_u64(&frozen_key(token, executor))? != 0 {
                    return Err(ScriptError::Frozen {
                        token: token.clone(),
                        holder: executor.to_string(),
                    });
                }
                let available = self.load_u64(&balance_key(token, executor))?;
                let remaining =
                    available
                        .checked_sub(*amount)
                        .ok_or_else(|| ScriptError::InsufficientBalance {
                            token: token.clone(),
                            needed: *amount,
                            available,
                        })?;
                self.store_u64(balance_key(token, executor), remaining)?;
                // Read after the debit so a self-transfer nets to zero.
                let credited = self
                    .load_u64(&balance_key(token, to))?
                    .checked_add(*amount)
                    .ok_or_else(|| ScriptError::Overflow(token.clone()))?;
                self.store_u64(balance_key(token, to), credited)?;
            }
            Instruction::Freeze { token, holder } => {
                check_address(holder)?;
                self.require_owner(token, executor)?;
                self.store_u64(frozen_key(token, holder), 1)?;
            }
            Instruction::Unfreeze { token, holder } => {
                check_address(holder)?;
                self.require_owner(token, executor)?;
                self.store_u64(frozen_key(token, holder), 0)?;
            }
        }
        trace!(op = instr.opcode(), token = instr.token(), "script step");
        Ok(())
    }
}

fn check_address(s: &str) -> Result<(), ScriptError> {
    s.parse::<Address>()
        .map(|_| ())
        .map_err(|_| ScriptError::InvalidAddress(s.to_string()))
}

/// Run `program` as `executor` against `db`. Nothing is written; the caller
/// flushes the returned diff. Any failing step fails the whole script.
pub fn execute(
    db: &dyn ScriptDb,
    program: &[Instruction],
    executor: &str,
) -> Result<ScriptDiff, ScriptError> {
    check_address(executor)?;
    let mut machine = Machine {
        db,
        diff: ScriptDiff::default(),
    };
    for instr in program {
        machine.step(instr, executor)?;
    }
    Ok(machine.diff)
}
