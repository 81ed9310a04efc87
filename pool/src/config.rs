use serde::{Deserialize, Serialize};

/// Pool bounds and selection limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum pending transactions across all senders.
    pub capacity: usize,
    /// Maximum pending transactions for one sender.
    pub per_sender_cap: usize,
    /// Maximum transactions handed to one block.
    pub batch_cap: usize,
    /// How far ahead of the expected nonce a transaction may sit and still
    /// be kept for a later batch.
    pub nonce_lookahead: u64,
    /// Residency after which a pending transaction is dropped.
    pub stale_after_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 3000,
            per_sender_cap: 1000,
            batch_cap: 500,
            nonce_lookahead: 200,
            stale_after_secs: 10,
        }
    }
}
