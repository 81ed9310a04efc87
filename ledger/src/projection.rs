//! In-memory account projection and the per-tag balance rules.
//!
//! [`apply_effect`] is the single definition of what a transaction does to
//! account state. Append runs it over a projection seeded from the open
//! store transaction, CalculationResults over committed state, and the pool
//! over the ledger view while selecting a batch. [`revert_effect`] is its
//! exact inverse, used by DeleteBlock.

use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

use meridian_crypto::Sha256Writer;
use meridian_store::{KvStore, Transaction as StoreTxn};
use meridian_types::{Address, ChainParams, ResultHash, Transaction, TxKind, INITIAL_NONCE};

use crate::keys;
use crate::LedgerError;

/// One account's persisted counters. `balance` is the total owned; the
/// spendable part is [`Account::available`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Account {
    pub balance: u64,
    pub frozen: u64,
    pub nonce: u64,
    pub pck: u64,
    pub dkto: u64,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            balance: 0,
            frozen: 0,
            nonce: INITIAL_NONCE,
            pck: 0,
            dkto: 0,
        }
    }
}

impl Account {
    pub fn available(&self) -> u64 {
        self.balance.saturating_sub(self.frozen)
    }
}

/// Chain-wide conversion counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub pck: u64,
    pub dkto: u64,
}

/// Where a projection reads accounts it has not seen yet.
pub trait AccountSource {
    fn account(&self, addr: &Address) -> Result<Account, LedgerError>;
    fn totals(&self) -> Result<Totals, LedgerError>;
}

impl<T: AccountSource + ?Sized> AccountSource for &T {
    fn account(&self, addr: &Address) -> Result<Account, LedgerError> {
        (**self).account(addr)
    }

    fn totals(&self) -> Result<Totals, LedgerError> {
        (**self).totals()
    }
}

impl AccountSource for dyn KvStore + '_ {
    fn account(&self, addr: &Address) -> Result<Account, LedgerError> {
        keys::read_account(self, addr)
    }

    fn totals(&self) -> Result<Totals, LedgerError> {
        keys::read_totals(self)
    }
}

impl AccountSource for StoreTxn<'_> {
    fn account(&self, addr: &Address) -> Result<Account, LedgerError> {
        keys::read_account(self, addr)
    }

    fn totals(&self) -> Result<Totals, LedgerError> {
        keys::read_totals(self)
    }
}

/// Lazily seeded, write-back view of account state.
pub struct AccountProjection<S> {
    source: S,
    accounts: BTreeMap<Address, Account>,
    totals: Option<Totals>,
    touched: BTreeSet<Address>,
}

impl<S: AccountSource> AccountProjection<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            accounts: BTreeMap::new(),
            totals: None,
            touched: BTreeSet::new(),
        }
    }

    pub fn account(&mut self, addr: &Address) -> Result<Account, LedgerError> {
        match self.accounts.entry(*addr) {
            Entry::Occupied(e) => Ok(*e.get()),
            Entry::Vacant(v) => Ok(*v.insert(self.source.account(addr)?)),
        }
    }

    pub fn totals(&mut self) -> Result<Totals, LedgerError> {
        match self.totals {
            Some(t) => Ok(t),
            None => {
                let t = self.source.totals()?;
                self.totals = Some(t);
                Ok(t)
            }
        }
    }

    /// Addresses whose counters changed, in byte order.
    pub fn touched(&self) -> impl Iterator<Item = &Address> {
        self.touched.iter()
    }

    /// Changed accounts and, if any conversion ran, the new totals.
    pub fn into_changes(self) -> (Vec<(Address, Account)>, Option<Totals>) {
        let accounts = self
            .touched
            .iter()
            .filter_map(|a| self.accounts.get(a).map(|acct| (*a, *acct)))
            .collect();
        (accounts, self.totals)
    }

    /// The state commitment over every touched address: available
    /// balances, then frozen balances, then `pck ‖ dkto`, each domain
    /// sorted by the address text form.
    pub fn commitment(&self) -> ResultHash {
        let rows: BTreeMap<String, Account> = self
            .touched
            .iter()
            .filter_map(|a| self.accounts.get(a).map(|acct| (a.to_string(), *acct)))
            .collect();

        let mut w = Sha256Writer::new();
        for (addr, acct) in &rows {
            w.write(addr.as_bytes());
            w.write(&acct.available().to_be_bytes());
        }
        for (addr, acct) in &rows {
            w.write(addr.as_bytes());
            w.write(&acct.frozen.to_be_bytes());
        }
        for (addr, acct) in &rows {
            w.write(addr.as_bytes());
            w.write(&acct.pck.to_be_bytes());
            w.write(&acct.dkto.to_be_bytes());
        }
        w.finish()
    }
}

/// Writes of one transaction, held back until every check has passed so a
/// failing transaction leaves the projection untouched.
struct Staged<'p, S> {
    proj: &'p mut AccountProjection<S>,
    accounts: Vec<(Address, Account)>,
    totals: Option<Totals>,
}

impl<'p, S: AccountSource> Staged<'p, S> {
    fn new(proj: &'p mut AccountProjection<S>) -> Self {
        Self {
            proj,
            accounts: Vec::new(),
            totals: None,
        }
    }

    fn get(&mut self, addr: &Address) -> Result<Account, LedgerError> {
        if let Some((_, acct)) = self.accounts.iter().find(|(a, _)| a == addr) {
            return Ok(*acct);
        }
        self.proj.account(addr)
    }

    fn put(&mut self, addr: Address, acct: Account) {
        match self.accounts.iter_mut().find(|(a, _)| *a == addr) {
            Some(slot) => slot.1 = acct,
            None => self.accounts.push((addr, acct)),
        }
    }

    fn totals(&mut self) -> Result<Totals, LedgerError> {
        match self.totals {
            Some(t) => Ok(t),
            None => self.proj.totals(),
        }
    }

    fn commit(self) {
        for (addr, acct) in self.accounts {
            self.proj.accounts.insert(addr, acct);
            self.proj.touched.insert(addr);
        }
        if let Some(t) = self.totals {
            self.proj.totals = Some(t);
        }
    }

    fn credit(&mut self, addr: &Address, amount: u64) -> Result<(), LedgerError> {
        let mut acct = self.get(addr)?;
        acct.balance = add(acct.balance, amount, "balance")?;
        self.put(*addr, acct);
        Ok(())
    }

    fn debit(&mut self, addr: &Address, amount: u64) -> Result<(), LedgerError> {
        let mut acct = self.get(addr)?;
        if acct.available() < amount {
            return Err(LedgerError::InsufficientBalance {
                address: *addr,
                needed: amount,
                available: acct.available(),
            });
        }
        acct.balance -= amount;
        self.put(*addr, acct);
        Ok(())
    }

    fn advance_nonce(&mut self, addr: &Address, nonce: u64) -> Result<(), LedgerError> {
        let mut acct = self.get(addr)?;
        if acct.nonce != nonce {
            return Err(LedgerError::NonceMismatch {
                address: *addr,
                expected: acct.nonce,
                got: nonce,
            });
        }
        acct.nonce = add(acct.nonce, 1, "nonce")?;
        self.put(*addr, acct);
        Ok(())
    }

    fn rewind_nonce(&mut self, addr: &Address, nonce: u64) -> Result<(), LedgerError> {
        let mut acct = self.get(addr)?;
        acct.nonce = nonce;
        self.put(*addr, acct);
        Ok(())
    }
}

fn add(a: u64, b: u64, what: &'static str) -> Result<u64, LedgerError> {
    a.checked_add(b).ok_or(LedgerError::Overflow(what))
}

fn sub(address: &Address, have: u64, need: u64) -> Result<u64, LedgerError> {
    have.checked_sub(need)
        .ok_or(LedgerError::InsufficientBalance {
            address: *address,
            needed: need,
            available: have,
        })
}

fn require_admin(params: &ChainParams, addr: &Address) -> Result<(), LedgerError> {
    if params.is_admin(addr) {
        Ok(())
    } else {
        Err(LedgerError::NotAdmin(*addr))
    }
}

/// Apply `tx` to the projection, crediting any fee to `miner`.
pub fn apply_effect<S: AccountSource>(
    proj: &mut AccountProjection<S>,
    tx: &Transaction,
    miner: &Address,
    params: &ChainParams,
) -> Result<(), LedgerError> {
    let mut st = Staged::new(proj);
    match &tx.kind {
        TxKind::Coinbase => {
            st.credit(&tx.to, tx.amount)?;
        }
        TxKind::Freeze => {
            require_admin(params, &tx.from)?;
            st.advance_nonce(&tx.from, tx.nonce)?;
            let mut to = st.get(&tx.to)?;
            if to.available() < tx.amount {
                return Err(LedgerError::InsufficientBalance {
                    address: tx.to,
                    needed: tx.amount,
                    available: to.available(),
                });
            }
            to.frozen = add(to.frozen, tx.amount, "frozen")?;
            st.put(tx.to, to);
        }
        TxKind::Unfreeze => {
            require_admin(params, &tx.from)?;
            st.advance_nonce(&tx.from, tx.nonce)?;
            let mut to = st.get(&tx.to)?;
            to.frozen = sub(&tx.to, to.frozen, tx.amount)?;
            st.put(tx.to, to);
        }
        TxKind::ConvertToPck { pck } => {
            st.advance_nonce(&tx.from, tx.nonce)?;
            st.debit(&tx.from, tx.amount)?;
            let mut from = st.get(&tx.from)?;
            from.pck = add(from.pck, *pck, "pck")?;
            from.dkto = add(from.dkto, tx.amount, "dkto")?;
            st.put(tx.from, from);
            let mut totals = st.totals()?;
            totals.pck = add(totals.pck, *pck, "pck_total")?;
            totals.dkto = add(totals.dkto, tx.amount, "dkto_total")?;
            st.totals = Some(totals);
        }
        TxKind::ConvertToKto { pck } => {
            st.advance_nonce(&tx.from, tx.nonce)?;
            let mut from = st.get(&tx.from)?;
            from.pck = sub(&tx.from, from.pck, *pck)?;
            from.dkto = sub(&tx.from, from.dkto, tx.amount)?;
            from.balance = add(from.balance, tx.amount, "balance")?;
            st.put(tx.from, from);
            let mut totals = st.totals()?;
            totals.pck = sub(&tx.from, totals.pck, *pck)?;
            totals.dkto = sub(&tx.from, totals.dkto, tx.amount)?;
            st.totals = Some(totals);
        }
        TxKind::Transfer { .. } => {
            st.advance_nonce(&tx.from, tx.nonce)?;
            st.debit(&tx.from, add(tx.amount, tx.fee, "amount + fee")?)?;
            st.credit(&tx.to, tx.amount)?;
            if tx.fee > 0 {
                st.credit(miner, tx.fee)?;
            }
        }
    }
    st.commit();
    Ok(())
}

/// Undo `tx`: the inverse of [`apply_effect`], with the sender's nonce
/// rewound to `tx.nonce`.
pub fn revert_effect<S: AccountSource>(
    proj: &mut AccountProjection<S>,
    tx: &Transaction,
    miner: &Address,
) -> Result<(), LedgerError> {
    let mut st = Staged::new(proj);
    match &tx.kind {
        TxKind::Coinbase => {
            let mut to = st.get(&tx.to)?;
            to.balance = sub(&tx.to, to.balance, tx.amount)?;
            st.put(tx.to, to);
        }
        TxKind::Freeze => {
            let mut to = st.get(&tx.to)?;
            to.frozen = sub(&tx.to, to.frozen, tx.amount)?;
            st.put(tx.to, to);
            st.rewind_nonce(&tx.from, tx.nonce)?;
        }
        TxKind::Unfreeze => {
            let mut to = st.get(&tx.to)?;
            to.frozen = add(to.frozen, tx.amount, "frozen")?;
            st.put(tx.to, to);
            st.rewind_nonce(&tx.from, tx.nonce)?;
        }
        TxKind::ConvertToPck { pck } => {
            let mut totals = st.totals()?;
            totals.pck = sub(&tx.from, totals.pck, *pck)?;
            totals.dkto = sub(&tx.from, totals.dkto, tx.amount)?;
            st.totals = Some(totals);
            let mut from = st.get(&tx.from)?;
            from.pck = sub(&tx.from, from.pck, *pck)?;
            from.dkto = sub(&tx.from, from.dkto, tx.amount)?;
            from.balance = add(from.balance, tx.amount, "balance")?;
            st.put(tx.from, from);
            st.rewind_nonce(&tx.from, tx.nonce)?;
        }
        TxKind::ConvertToKto { pck } => {
            let mut totals = st.totals()?;
            totals.pck = add(totals.pck, *pck, "pck_total")?;
            totals.dkto = add(totals.dkto, tx.amount, "dkto_total")?;
            st.totals = Some(totals);
            let mut from = st.get(&tx.from)?;
            from.balance = sub(&tx.from, from.balance, tx.amount)?;
            from.pck = add(from.pck, *pck, "pck")?;
            from.dkto = add(from.dkto, tx.amount, "dkto")?;
            st.put(tx.from, from);
            st.rewind_nonce(&tx.from, tx.nonce)?;
        }
        TxKind::Transfer { .. } => {
            if tx.fee > 0 {
                let mut m = st.get(miner)?;
                m.balance = sub(miner, m.balance, tx.fee)?;
                st.put(*miner, m);
            }
            let mut to = st.get(&tx.to)?;
            to.balance = sub(&tx.to, to.balance, tx.amount)?;
            st.put(tx.to, to);
            st.credit(&tx.from, add(tx.amount, tx.fee, "amount + fee")?)?;
            st.rewind_nonce(&tx.from, tx.nonce)?;
        }
    }
    st.commit();
    Ok(())
}
