//! The transaction pool.
//!
//! One [`RwLock`] guards the pending queues and the vote book. Admission runs
//! the full validation outside the lock and re-checks the bounds once it
//! holds the write guard.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use meridian_ledger::{apply_effect, AccountProjection, LedgerView};
use meridian_types::{Address, Block, ResultHash, Timestamp, Transaction, TxHash};
use tracing::{debug, trace};

use crate::queue::Queues;
use crate::votes::{VoteBook, VoteRecord};
use crate::{validate, PoolConfig, PoolError};

#[derive(Debug, Default)]
struct Inner {
    queues: Queues,
    votes: VoteBook,
}

/// Bounded pool of admitted transactions awaiting a block.
#[derive(Debug)]
pub struct TxPool {
    config: PoolConfig,
    inner: RwLock<Inner>,
}

impl TxPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate `tx` against committed state and queue it.
    pub fn admit<L: LedgerView + ?Sized>(
        &self,
        tx: Transaction,
        ledger: &L,
        now: Timestamp,
    ) -> Result<TxHash, PoolError> {
        if self.read().queues.len() >= self.config.capacity {
            return Err(PoolError::PoolFull);
        }

        validate(&tx, ledger)?;

        let sender = tx.sender();
        let mut inner = self.write();
        if inner.queues.len() >= self.config.capacity {
            return Err(PoolError::PoolFull);
        }
        if inner.queues.has_nonce(&sender, tx.nonce) {
            return Err(PoolError::DuplicateNonce {
                sender,
                nonce: tx.nonce,
            });
        }
        if inner.queues.sender_len(&sender) >= self.config.per_sender_cap {
            return Err(PoolError::SenderLimit(sender));
        }

        let hash = tx.hash;
        debug!(%hash, %sender, nonce = tx.nonce, kind = tx.kind.name(), "admitted transaction");
        inner.queues.insert(tx, now);
        Ok(hash)
    }

    /// Pick the next block's transactions.
    ///
    /// Entries are walked in service order against a projection of the
    /// ledger. A transaction is taken when its nonce is the sender's next
    /// one and its effect applies; one further ahead, within the lookahead,
    /// is left for a later batch; anything else is dropped from the pool.
    /// Selected transactions stay queued until [`TxPool::filter`] sees them
    /// in a committed block.
    pub fn select<L: LedgerView + ?Sized>(&self, ledger: &L) -> Vec<Transaction> {
        let params = ledger.params();
        let mut inner = self.write();
        let mut proj = AccountProjection::new(ledger);
        let mut picked = Vec::new();
        let mut doomed: Vec<(Address, u64)> = Vec::new();
        let mut deferred = 0usize;

        for entry in inner.queues.serve_order() {
            if picked.len() >= self.config.batch_cap {
                break;
            }
            let tx = &entry.tx;
            let expected = match proj.account(&tx.from) {
                Ok(account) => account.nonce,
                Err(e) => {
                    debug!(hash = %tx.hash, error = %e, "skipping transaction, sender unreadable");
                    continue;
                }
            };

            if tx.nonce < expected || tx.nonce > expected.saturating_add(self.config.nonce_lookahead) {
                trace!(hash = %tx.hash, nonce = tx.nonce, expected, "dropping out-of-window nonce");
                doomed.push((tx.sender(), tx.nonce));
                continue;
            }
            if tx.nonce > expected {
                deferred += 1;
                continue;
            }

            match apply_effect(&mut proj, tx, &Address::ZERO, params) {
                Ok(()) => picked.push(tx.clone()),
                Err(e) => {
                    debug!(hash = %tx.hash, error = %e, "dropping transaction that no longer applies");
                    doomed.push((tx.sender(), tx.nonce));
                }
            }
        }

        for (sender, nonce) in &doomed {
            inner.queues.remove(sender, *nonce);
        }
        debug!(
            selected = picked.len(),
            deferred,
            dropped = doomed.len(),
            remaining = inner.queues.len(),
            "selected batch"
        );
        picked
    }

    /// Remove what `block` committed, plus entries older than the staleness
    /// limit. Returns the number of entries removed.
    pub fn filter(&self, block: &Block, now: Timestamp) -> usize {
        let mut inner = self.write();
        let mut removed = 0;
        for tx in &block.transactions {
            if inner.queues.remove(&tx.sender(), tx.nonce).is_some() {
                removed += 1;
            }
        }
        let stale_after = self.config.stale_after_secs;
        let stale = inner
            .queues
            .retain(|e| e.arrival.elapsed_since(now) <= stale_after);
        if removed + stale > 0 {
            debug!(height = block.height, committed = removed, stale, "filtered pool");
        }
        removed + stale
    }

    pub fn exists(&self, hash: &TxHash) -> bool {
        self.read().queues.contains(hash)
    }

    pub fn get(&self, hash: &TxHash) -> Option<Transaction> {
        self.read().queues.get(hash).map(|e| e.tx.clone())
    }

    /// A sender's pending transactions in nonce order.
    pub fn pending_for(&self, sender: &Address) -> Vec<Transaction> {
        self.read().queues.pending_for(sender)
    }

    pub fn len(&self) -> usize {
        self.read().queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a vote. Returns false for a duplicate.
    pub fn set_check_data(&self, record: VoteRecord) -> bool {
        self.write().votes.insert(record)
    }

    /// `(agree, disagree)` counts for a proposal.
    pub fn votes_for(&self, height: u64, result_hash: &ResultHash) -> (usize, usize) {
        self.read().votes.tally(height, result_hash)
    }

    /// Forget votes for heights at or below `committed_height`.
    pub fn purge_votes(&self, committed_height: u64) -> usize {
        let mut state = self.write();
        let purged = state.votes.purge(committed_height);
        if purged > 0 {
            debug!(committed_height, purged, remaining = state.votes.len(), "votes purged");
        }
        purged
    }
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
