//! Vote book for in-flight block rounds.

use std::collections::HashMap;

use meridian_types::{NodeId, ResultHash};
use serde::{Deserialize, Serialize};

/// One committee member's verdict on a proposed block.
///
/// `result_hash` is the state commitment carried by the proposal; `agree`
/// says whether the voter reproduced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: NodeId,
    pub height: u64,
    pub result_hash: ResultHash,
    pub agree: bool,
}

#[derive(Debug, Default)]
pub(crate) struct VoteBook {
    records: HashMap<(NodeId, ResultHash), VoteRecord>,
}

impl VoteBook {
    /// Returns false when the voter already has a record for this hash.
    pub fn insert(&mut self, record: VoteRecord) -> bool {
        let key = (record.voter, record.result_hash);
        if self.records.contains_key(&key) {
            return false;
        }
        self.records.insert(key, record);
        true
    }

    pub fn tally(&self, height: u64, result_hash: &ResultHash) -> (usize, usize) {
        self.records
            .values()
            .filter(|r| r.height == height && r.result_hash == *result_hash)
            .fold((0, 0), |(yes, no), r| {
                if r.agree {
                    (yes + 1, no)
                } else {
                    (yes, no + 1)
                }
            })
    }

    pub fn purge(&mut self, committed_height: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.height > committed_height);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
