//! Persisted key layout and typed account access.
//!
//! ```text
//! height                 u64 be, absent at zero
//! bh/<height>            block hash
//! blk/<hash hex>         bincode block
//! txi/<hash hex>         bincode TxLocation
//! bal/<addr>             total owned (available + frozen)
//! freeze[<addr>]         frozen balance (named map)
//! nonce[<addr>]          next expected nonce, absent when INITIAL_NONCE
//! pck/<addr>             pck counter
//! dkto/<addr>            locked kto counter
//! pck_total, dkto_total  global counters
//! addr/<addr>            list of tx hashes, newest first
//! undo/<tx hash hex>     token-script journal
//! genesis                marker set once allocations are credited
//! ```
//!
//! Zero values are never stored, so rolling a block back leaves the store
//! byte-identical to its state before the block.

use meridian_store::{KvStore, OptionalExt, StoreError, Transaction};
use meridian_types::{Address, BlockHash, TxHash, INITIAL_NONCE};
use serde::{Deserialize, Serialize};

use crate::projection::{Account, Totals};
use crate::LedgerError;

pub const HEIGHT: &[u8] = b"height";
pub const PCK_TOTAL: &[u8] = b"pck_total";
pub const DKTO_TOTAL: &[u8] = b"dkto_total";
pub const GENESIS: &[u8] = b"genesis";
pub const FREEZE_MAP: &[u8] = b"freeze";
pub const NONCE_MAP: &[u8] = b"nonce";

pub fn block_hash_at(height: u64) -> Vec<u8> {
    format!("bh/{height}").into_bytes()
}

pub fn block(hash: &BlockHash) -> Vec<u8> {
    format!("blk/{hash}").into_bytes()
}

pub fn tx_index(hash: &TxHash) -> Vec<u8> {
    format!("txi/{hash}").into_bytes()
}

pub fn undo(hash: &TxHash) -> Vec<u8> {
    format!("undo/{hash}").into_bytes()
}

pub fn balance(addr: &Address) -> Vec<u8> {
    format!("bal/{addr}").into_bytes()
}

pub fn pck(addr: &Address) -> Vec<u8> {
    format!("pck/{addr}").into_bytes()
}

pub fn dkto(addr: &Address) -> Vec<u8> {
    format!("dkto/{addr}").into_bytes()
}

pub fn address_list(addr: &Address) -> Vec<u8> {
    format!("addr/{addr}").into_bytes()
}

/// Where a committed transaction lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLocation {
    pub height: u64,
    pub index: u32,
}

pub fn decode_u64(raw: &[u8]) -> Result<u64, LedgerError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| StoreError::Corruption(format!("expected 8-byte integer, got {}", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Point reads shared by committed stores and open transactions.
pub trait StateReader {
    fn get_opt(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn mget_opt(&self, map: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
}

impl StateReader for dyn KvStore + '_ {
    fn get_opt(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(key).optional()
    }

    fn mget_opt(&self, map: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.mget(map, key).optional()
    }
}

impl StateReader for Transaction<'_> {
    fn get_opt(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(key).optional()
    }

    fn mget_opt(&self, map: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.mget(map, key).optional()
    }
}

pub fn read_u64<R: StateReader + ?Sized>(r: &R, key: &[u8]) -> Result<u64, LedgerError> {
    r.get_opt(key)?.map_or(Ok(0), |raw| decode_u64(&raw))
}

pub fn read_height<R: StateReader + ?Sized>(r: &R) -> Result<u64, LedgerError> {
    read_u64(r, HEIGHT)
}

pub fn read_account<R: StateReader + ?Sized>(r: &R, addr: &Address) -> Result<Account, LedgerError> {
    let key = addr.to_string();
    let frozen = match r.mget_opt(FREEZE_MAP, key.as_bytes())? {
        Some(raw) => decode_u64(&raw)?,
        None => 0,
    };
    let nonce = match r.mget_opt(NONCE_MAP, key.as_bytes())? {
        Some(raw) => decode_u64(&raw)?,
        None => INITIAL_NONCE,
    };
    Ok(Account {
        balance: read_u64(r, &balance(addr))?,
        frozen,
        nonce,
        pck: read_u64(r, &pck(addr))?,
        dkto: read_u64(r, &dkto(addr))?,
    })
}

pub fn read_totals<R: StateReader + ?Sized>(r: &R) -> Result<Totals, LedgerError> {
    Ok(Totals {
        pck: read_u64(r, PCK_TOTAL)?,
        dkto: read_u64(r, DKTO_TOTAL)?,
    })
}

fn put_u64(txn: &mut Transaction<'_>, key: &[u8], value: u64) {
    if value == 0 {
        txn.del(key);
    } else {
        txn.set(key, &value.to_be_bytes());
    }
}

pub fn write_height(txn: &mut Transaction<'_>, height: u64) {
    put_u64(txn, HEIGHT, height);
}

pub fn write_account(txn: &mut Transaction<'_>, addr: &Address, account: &Account) {
    let key = addr.to_string();
    put_u64(txn, &balance(addr), account.balance);
    put_u64(txn, &pck(addr), account.pck);
    put_u64(txn, &dkto(addr), account.dkto);
    if account.frozen == 0 {
        txn.mdel(FREEZE_MAP, key.as_bytes());
    } else {
        txn.mset(FREEZE_MAP, key.as_bytes(), &account.frozen.to_be_bytes());
    }
    if account.nonce == INITIAL_NONCE {
        txn.mdel(NONCE_MAP, key.as_bytes());
    } else {
        txn.mset(NONCE_MAP, key.as_bytes(), &account.nonce.to_be_bytes());
    }
}

pub fn write_totals(txn: &mut Transaction<'_>, totals: &Totals) {
    put_u64(txn, PCK_TOTAL, totals.pck);
    put_u64(txn, DKTO_TOTAL, totals.dkto);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct_per_kind() {
        let a = Address::new([7; 32]);
        let keys = [balance(&a), pck(&a), dkto(&a), address_list(&a)];
        for (i, x) in keys.iter().enumerate() {
            for y in &keys[i + 1..] {
                assert_ne!(x, y);
            }
        }
        assert_eq!(block_hash_at(12), b"bh/12".to_vec());
    }

    fn account_through_borrowed_store(store: &dyn KvStore, addr: &Address) -> Account {
        read_account(store, addr).unwrap()
    }

    #[test]
    fn reads_work_through_a_short_lived_store_borrow() {
        let store = meridian_store::MemStore::new();
        let addr = Address::new([3; 32]);
        let mut txn = Transaction::begin(&store);
        write_height(&mut txn, 4);
        write_account(
            &mut txn,
            &addr,
            &Account {
                balance: 70,
                frozen: 20,
                nonce: 3,
                pck: 0,
                dkto: 0,
            },
        );
        txn.commit().unwrap();

        let account = account_through_borrowed_store(&store, &addr);
        assert_eq!((account.balance, account.frozen, account.nonce), (70, 20, 3));
        assert_eq!(read_height(&store as &dyn KvStore).unwrap(), 4);
    }

    #[test]
    fn integers_are_big_endian() {
        assert_eq!(decode_u64(&5u64.to_be_bytes()).unwrap(), 5);
        assert!(matches!(
            decode_u64(&[1, 2]),
            Err(LedgerError::Store(StoreError::Corruption(_)))
        ));
    }
}
