//! The ledger state engine.
//!
//! All mutation happens inside one [`meridian_store::Transaction`] per
//! block: a failure anywhere drops the transaction and nothing is written.
//! Readers share a `RwLock` with the writers (append, delete, recover and
//! genesis) so a query never observes a half-applied block.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use meridian_crypto::{hash_block, transactions_root};
use meridian_script::{compile, execute, Committed, Journal, Overlay};
use meridian_store::{KvStore, StoreError, Transaction as StoreTxn};
use meridian_types::{
    Address, Block, BlockHash, ChainParams, ResultHash, Timestamp, Transaction, TxHash, TxKind,
};
use tracing::{debug, info, warn};

use crate::keys::{self, StateReader, TxLocation};
use crate::projection::{
    apply_effect, revert_effect, Account, AccountProjection, AccountSource, Totals,
};
use crate::rewards::{self, RewardAddresses};
use crate::view::{ChainLedger, LedgerView};
use crate::LedgerError;

pub struct Ledger {
    store: Arc<dyn KvStore>,
    params: ChainParams,
    lock: RwLock<()>,
}

impl Ledger {
    pub fn new(store: Arc<dyn KvStore>, params: ChainParams) -> Self {
        Self {
            store,
            params,
            lock: RwLock::new(()),
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn committed(&self) -> &dyn KvStore {
        &*self.store
    }

    // ── Block production ────────────────────────────────────────────────

    /// Assemble the next block: `pending` followed by the coinbase rewards.
    pub fn build_block(
        &self,
        mut pending: Vec<Transaction>,
        miner: Address,
        rewards: &RewardAddresses,
        timestamp: Timestamp,
    ) -> Result<Block, LedgerError> {
        let _guard = self.read_guard();
        let store = self.committed();
        let height = keys::read_height(store)? + 1;
        let prev_hash = if height == 1 {
            BlockHash::ZERO
        } else {
            hash_at(store, height - 1)?.ok_or(LedgerError::BlockNotFound(height - 1))?
        };

        let coinbases =
            rewards::coinbase_transactions(&self.params, height, timestamp, &pending, rewards);
        pending.extend(coinbases);
        if pending.is_empty() {
            return Err(LedgerError::EmptyBlock);
        }

        let merkle_root = transactions_root(&pending)?;
        let mut block = Block {
            height,
            prev_hash,
            hash: BlockHash::ZERO,
            transactions: pending,
            merkle_root,
            version: self.params.block_version,
            timestamp,
            miner,
        };
        block.hash = hash_block(&block)?;
        debug!(height, txs = block.transactions.len(), hash = %block.hash, "built block");
        Ok(block)
    }

    // ── Forward application ─────────────────────────────────────────────

    /// Commit `block` on top of the current tip, crediting fees to `miner`.
    pub fn append(&self, block: &Block, miner: &Address) -> Result<(), LedgerError> {
        let _guard = self.write_guard();
        self.commit_block(block, miner)?;
        info!(height = block.height, hash = %block.hash, txs = block.transactions.len(), "appended block");
        Ok(())
    }

    /// Same effects as [`Ledger::append`], used when replaying blocks fetched
    /// from a peer or read back from disk.
    pub fn recover_block(&self, block: &Block, miner: &Address) -> Result<(), LedgerError> {
        let _guard = self.write_guard();
        self.commit_block(block, miner)?;
        info!(height = block.height, hash = %block.hash, "recovered block");
        Ok(())
    }

    fn commit_block(&self, block: &Block, miner: &Address) -> Result<(), LedgerError> {
        if block.transactions.is_empty() {
            return Err(LedgerError::EmptyBlock);
        }
        let mut txn = StoreTxn::begin(self.committed());
        let height = keys::read_height(&txn)?;
        if block.height != height + 1 {
            return Err(LedgerError::HeightMismatch {
                expected: height + 1,
                got: block.height,
            });
        }

        let (accounts, totals) = {
            let mut proj = AccountProjection::new(&txn);
            for tx in &block.transactions {
                apply_effect(&mut proj, tx, miner, &self.params)?;
            }
            proj.into_changes()
        };
        write_changes(&mut txn, &accounts, totals.as_ref());

        for (index, tx) in block.transactions.iter().enumerate() {
            if let Some(script) = tx.script() {
                let program = compile(script)?;
                let diff = execute(&txn, &program, &tx.from.to_string())?;
                diff.flush(&mut txn);
                txn.set(&keys::undo(&tx.hash), &diff.journal().encode()?);
            }
            index_transaction(&mut txn, tx, block.height, index as u32)?;
        }

        txn.set(&keys::block_hash_at(block.height), block.hash.as_bytes());
        txn.set(&keys::block(&block.hash), &bincode::serialize(block)?);
        keys::write_height(&mut txn, block.height);
        txn.commit()?;
        Ok(())
    }

    // ── Verification ────────────────────────────────────────────────────

    /// State commitment of `block` replayed over committed state. Nothing
    /// is written.
    pub fn calculation_results(&self, block: &Block) -> Result<ResultHash, LedgerError> {
        if block.transactions.is_empty() {
            return Err(LedgerError::EmptyBlock);
        }
        let _guard = self.read_guard();
        let store = self.committed();
        let mut proj = AccountProjection::new(store);
        let base = Committed(store);
        let mut tokens = Overlay::new(&base);

        for tx in &block.transactions {
            apply_effect(&mut proj, tx, &block.miner, &self.params)?;
            if let Some(script) = tx.script() {
                let diff = execute(&tokens, &compile(script)?, &tx.from.to_string())?;
                tokens.absorb(&diff);
            }
        }
        Ok(proj.commitment())
    }

    /// Whether `claimed` is the commitment this node computes for `block`.
    pub fn check_results(&self, block: &Block, claimed: &ResultHash) -> bool {
        if !block.ends_with_coinbase() {
            debug!(height = block.height, "block does not end with a coinbase");
            return false;
        }
        let unauthorised = block.transactions.iter().any(|tx| {
            matches!(tx.kind, TxKind::Freeze | TxKind::Unfreeze) && !self.params.is_admin(&tx.from)
        });
        if unauthorised {
            debug!(height = block.height, "freeze from a non-admin address");
            return false;
        }
        match self.calculation_results(block) {
            Ok(hash) => hash == *claimed,
            Err(e) => {
                debug!(height = block.height, error = %e, "result recomputation failed");
                false
            }
        }
    }

    // ── Rollback ────────────────────────────────────────────────────────

    /// Roll back every block from the tip down to and including `height`,
    /// one store transaction per block.
    pub fn delete_block(&self, height: u64) -> Result<(), LedgerError> {
        let _guard = self.write_guard();
        let current = keys::read_height(self.committed())?;
        if height == 0 || height > current {
            return Err(LedgerError::HeightMismatch {
                expected: current,
                got: height,
            });
        }
        for h in (height..=current).rev() {
            self.rollback_tip(h)?;
        }
        warn!(from = current, to = height - 1, "rolled back blocks");
        Ok(())
    }

    fn rollback_tip(&self, height: u64) -> Result<(), LedgerError> {
        let mut txn = StoreTxn::begin(self.committed());
        let block = load_block_at(&txn, height)?.ok_or(LedgerError::BlockNotFound(height))?;

        let (accounts, totals) = {
            let mut proj = AccountProjection::new(&txn);
            for tx in block.transactions.iter().rev() {
                revert_effect(&mut proj, tx, &block.miner)?;
            }
            proj.into_changes()
        };
        write_changes(&mut txn, &accounts, totals.as_ref());

        for tx in block.transactions.iter().rev() {
            if tx.script().is_some() {
                let undo_key = keys::undo(&tx.hash);
                let raw = txn.get(&undo_key)?;
                Journal::decode(&raw)?.restore(&mut txn);
                txn.del(&undo_key);
            }
            unindex_transaction(&mut txn, tx)?;
        }

        txn.del(&keys::block_hash_at(height));
        txn.del(&keys::block(&block.hash));
        keys::write_height(&mut txn, height - 1);
        txn.commit()?;
        debug!(height, hash = %block.hash, "rolled back block");
        Ok(())
    }

    // ── Genesis ─────────────────────────────────────────────────────────

    /// Credit initial balances on an empty chain. Returns `false` without
    /// writing anything if genesis was already applied or blocks exist.
    pub fn apply_genesis(&self, allocations: &[(Address, u64)]) -> Result<bool, LedgerError> {
        let _guard = self.write_guard();
        let mut txn = StoreTxn::begin(self.committed());
        if txn.get_opt(keys::GENESIS)?.is_some() || keys::read_height(&txn)? > 0 {
            return Ok(false);
        }

        let mut credited: Vec<(Address, Account)> = Vec::new();
        for (addr, amount) in allocations {
            let mut acct = match credited.iter().position(|(a, _)| a == addr) {
                Some(i) => credited.remove(i).1,
                None => keys::read_account(&txn, addr)?,
            };
            acct.balance = acct
                .balance
                .checked_add(*amount)
                .ok_or(LedgerError::Overflow("genesis balance"))?;
            credited.push((*addr, acct));
        }
        write_changes(&mut txn, &credited, None);
        txn.set(keys::GENESIS, b"1");
        txn.commit()?;
        info!(accounts = credited.len(), "applied genesis allocations");
        Ok(true)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn height(&self) -> Result<u64, LedgerError> {
        let _guard = self.read_guard();
        keys::read_height(self.committed())
    }

    pub fn account(&self, addr: &Address) -> Result<Account, LedgerError> {
        let _guard = self.read_guard();
        keys::read_account(self.committed(), addr)
    }

    pub fn balance(&self, addr: &Address) -> Result<u64, LedgerError> {
        Ok(self.account(addr)?.balance)
    }

    pub fn available_balance(&self, addr: &Address) -> Result<u64, LedgerError> {
        Ok(self.account(addr)?.available())
    }

    pub fn frozen_balance(&self, addr: &Address) -> Result<u64, LedgerError> {
        Ok(self.account(addr)?.frozen)
    }

    /// Next nonce `addr` must use.
    pub fn nonce(&self, addr: &Address) -> Result<u64, LedgerError> {
        Ok(self.account(addr)?.nonce)
    }

    pub fn pck_balance(&self, addr: &Address) -> Result<u64, LedgerError> {
        Ok(self.account(addr)?.pck)
    }

    pub fn dkto_balance(&self, addr: &Address) -> Result<u64, LedgerError> {
        Ok(self.account(addr)?.dkto)
    }

    pub fn totals(&self) -> Result<Totals, LedgerError> {
        let _guard = self.read_guard();
        keys::read_totals(self.committed())
    }

    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, LedgerError> {
        let _guard = self.read_guard();
        load_block_at(self.committed(), height)
    }

    pub fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>, LedgerError> {
        let _guard = self.read_guard();
        load_block(self.committed(), hash)
    }

    /// Blocks `lo..=hi`. A missing height in the range is an error.
    pub fn get_block_section(&self, lo: u64, hi: u64) -> Result<Vec<Block>, LedgerError> {
        let _guard = self.read_guard();
        let store = self.committed();
        (lo..=hi)
            .map(|h| load_block_at(store, h)?.ok_or(LedgerError::BlockNotFound(h)))
            .collect()
    }

    pub fn transaction_by_hash(
        &self,
        hash: &TxHash,
    ) -> Result<Option<(Transaction, TxLocation)>, LedgerError> {
        let _guard = self.read_guard();
        let store = self.committed();
        let Some(raw) = store.get_opt(&keys::tx_index(hash))? else {
            return Ok(None);
        };
        let location: TxLocation = bincode::deserialize(&raw)?;
        let block = load_block_at(store, location.height)?
            .ok_or(LedgerError::BlockNotFound(location.height))?;
        Ok(block
            .transactions
            .into_iter()
            .nth(location.index as usize)
            .map(|tx| (tx, location)))
    }

    /// Hashes of transactions touching `addr`, newest first.
    pub fn transactions_by_address(
        &self,
        addr: &Address,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TxHash>, LedgerError> {
        let _guard = self.read_guard();
        let items = self.committed().lrange(
            &keys::address_list(addr),
            offset,
            offset.saturating_add(limit),
        )?;
        items
            .into_iter()
            .map(|raw| {
                let bytes: [u8; 32] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Codec("tx hash in address list".into()))?;
                Ok(TxHash::new(bytes))
            })
            .collect()
    }

    pub fn token_balance(&self, token: &str, holder: &Address) -> Result<u64, LedgerError> {
        let _guard = self.read_guard();
        let base = Committed(self.committed());
        Ok(meridian_script::token_balance(&base, token, &holder.to_string())?)
    }
}

fn hash_at<R: StateReader + ?Sized>(r: &R, height: u64) -> Result<Option<BlockHash>, LedgerError> {
    match r.get_opt(&keys::block_hash_at(height))? {
        None => Ok(None),
        Some(raw) => {
            let bytes: [u8; 32] = raw
                .as_slice()
                .try_into()
                .map_err(|_| LedgerError::Codec(format!("block hash at {height}")))?;
            Ok(Some(BlockHash::new(bytes)))
        }
    }
}

fn load_block<R: StateReader + ?Sized>(
    r: &R,
    hash: &BlockHash,
) -> Result<Option<Block>, LedgerError> {
    match r.get_opt(&keys::block(hash))? {
        None => Ok(None),
        Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
    }
}

fn load_block_at<R: StateReader + ?Sized>(r: &R, height: u64) -> Result<Option<Block>, LedgerError> {
    match hash_at(r, height)? {
        None => Ok(None),
        Some(hash) => load_block(r, &hash),
    }
}

fn write_changes(txn: &mut StoreTxn<'_>, accounts: &[(Address, Account)], totals: Option<&Totals>) {
    for (addr, acct) in accounts {
        keys::write_account(txn, addr, acct);
    }
    if let Some(t) = totals {
        keys::write_totals(txn, t);
    }
}

/// Addresses whose history lists a transaction.
fn indexed_addresses(tx: &Transaction) -> Vec<Address> {
    let mut out = Vec::with_capacity(2);
    let candidates = if tx.is_coinbase() {
        [Some(tx.to), None]
    } else if tx.is_conversion() {
        [Some(tx.from), None]
    } else {
        [Some(tx.from), Some(tx.to)]
    };
    for addr in candidates.into_iter().flatten() {
        if !addr.is_zero() && !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}

fn index_transaction(
    txn: &mut StoreTxn<'_>,
    tx: &Transaction,
    height: u64,
    index: u32,
) -> Result<(), LedgerError> {
    let location = TxLocation { height, index };
    txn.set(&keys::tx_index(&tx.hash), &bincode::serialize(&location)?);
    for addr in indexed_addresses(tx) {
        txn.lpush(&keys::address_list(&addr), tx.hash.as_bytes())?;
    }
    Ok(())
}

fn unindex_transaction(txn: &mut StoreTxn<'_>, tx: &Transaction) -> Result<(), LedgerError> {
    txn.del(&keys::tx_index(&tx.hash));
    // Blocks unwind newest first, so each history starts with this hash.
    for addr in indexed_addresses(tx) {
        match txn.lpop(&keys::address_list(&addr))? {
            Some(front) if front.as_slice() == tx.hash.as_bytes() => {}
            _ => {
                return Err(StoreError::Corruption(format!(
                    "history of {addr} does not start with {}",
                    tx.hash
                ))
                .into())
            }
        }
    }
    Ok(())
}

impl AccountSource for Ledger {
    fn account(&self, addr: &Address) -> Result<Account, LedgerError> {
        Ledger::account(self, addr)
    }

    fn totals(&self) -> Result<Totals, LedgerError> {
        Ledger::totals(self)
    }
}

impl LedgerView for Ledger {
    fn height(&self) -> Result<u64, LedgerError> {
        Ledger::height(self)
    }

    fn params(&self) -> &ChainParams {
        &self.params
    }
}

impl ChainLedger for Ledger {
    fn build_block(
        &self,
        pending: Vec<Transaction>,
        miner: Address,
        rewards: &RewardAddresses,
        timestamp: Timestamp,
    ) -> Result<Block, LedgerError> {
        Ledger::build_block(self, pending, miner, rewards, timestamp)
    }

    fn calculation_results(&self, block: &Block) -> Result<ResultHash, LedgerError> {
        Ledger::calculation_results(self, block)
    }

    fn check_results(&self, block: &Block, claimed: &ResultHash) -> bool {
        Ledger::check_results(self, block, claimed)
    }

    fn append(&self, block: &Block, miner: &Address) -> Result<(), LedgerError> {
        Ledger::append(self, block, miner)
    }

    fn recover_block(&self, block: &Block, miner: &Address) -> Result<(), LedgerError> {
        Ledger::recover_block(self, block, miner)
    }

    fn get_block_section(&self, lo: u64, hi: u64) -> Result<Vec<Block>, LedgerError> {
        Ledger::get_block_section(self, lo, hi)
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, LedgerError> {
        Ledger::block_by_height(self, height)
    }

    fn delete_block(&self, height: u64) -> Result<(), LedgerError> {
        Ledger::delete_block(self, height)
    }
}
