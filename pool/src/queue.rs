//! Per-sender pending queues.
//!
//! Each sender's entries are keyed by nonce, so a sender never holds two
//! transactions with the same nonce. Across senders, service order follows
//! the arrival of each sender's lowest-nonce entry.

use std::cmp::Reverse;
use std::collections::{btree_map, BTreeMap, BinaryHeap, HashMap};

use meridian_types::{Address, Timestamp, Transaction, TxHash};

#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub tx: Transaction,
    pub arrival: Timestamp,
    pub seq: u64,
}

impl Entry {
    fn rank(&self) -> (Timestamp, u64) {
        (self.arrival, self.seq)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Queues {
    by_sender: HashMap<Address, BTreeMap<u64, Entry>>,
    by_hash: HashMap<TxHash, (Address, u64)>,
    next_seq: u64,
}

impl Queues {
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn sender_len(&self, sender: &Address) -> usize {
        self.by_sender.get(sender).map_or(0, BTreeMap::len)
    }

    pub fn has_nonce(&self, sender: &Address, nonce: u64) -> bool {
        self.by_sender
            .get(sender)
            .is_some_and(|q| q.contains_key(&nonce))
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &TxHash) -> Option<&Entry> {
        let (sender, nonce) = self.by_hash.get(hash)?;
        self.by_sender.get(sender)?.get(nonce)
    }

    /// Insert without checks; the caller has already ruled out duplicates.
    pub fn insert(&mut self, tx: Transaction, arrival: Timestamp) {
        let sender = tx.sender();
        let nonce = tx.nonce;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_hash.insert(tx.hash, (sender, nonce));
        self.by_sender
            .entry(sender)
            .or_default()
            .insert(nonce, Entry { tx, arrival, seq });
    }

    pub fn remove(&mut self, sender: &Address, nonce: u64) -> Option<Entry> {
        let queue = self.by_sender.get_mut(sender)?;
        let entry = queue.remove(&nonce)?;
        if queue.is_empty() {
            self.by_sender.remove(sender);
        }
        self.by_hash.remove(&entry.tx.hash);
        Some(entry)
    }

    /// Drop every entry for which `keep` returns false. Returns the number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Entry) -> bool) -> usize {
        let mut doomed = Vec::new();
        for (sender, q) in &self.by_sender {
            for entry in q.values() {
                if !keep(entry) {
                    doomed.push((*sender, entry.tx.nonce));
                }
            }
        }
        for (sender, nonce) in &doomed {
            self.remove(sender, *nonce);
        }
        doomed.len()
    }

    /// The sender's pending transactions in nonce order.
    pub fn pending_for(&self, sender: &Address) -> Vec<Transaction> {
        self.by_sender
            .get(sender)
            .map(|q| q.values().map(|e| e.tx.clone()).collect())
            .unwrap_or_default()
    }

    /// All entries in service order.
    ///
    /// The sender whose current head arrived first is served next; within a
    /// sender, entries come out in nonce order.
    pub fn serve_order(&self) -> Vec<&Entry> {
        let mut cursors: HashMap<&Address, btree_map::Values<'_, u64, Entry>> =
            HashMap::with_capacity(self.by_sender.len());
        let mut heads = BinaryHeap::with_capacity(self.by_sender.len());

        for (sender, q) in &self.by_sender {
            let mut it = q.values();
            if let Some(head) = it.next() {
                heads.push(Reverse((head.rank(), sender, head.tx.nonce)));
                cursors.insert(sender, it);
            }
        }

        let mut out = Vec::with_capacity(self.len());
        while let Some(Reverse((_, sender, nonce))) = heads.pop() {
            if let Some(entry) = self.by_sender.get(sender).and_then(|q| q.get(&nonce)) {
                out.push(entry);
            }
            if let Some(next) = cursors.get_mut(sender).and_then(Iterator::next) {
                heads.push(Reverse((next.rank(), sender, next.tx.nonce)));
            }
        }
        out
    }
}
