//! Per-height round state machine.
//!
//! `Proposed → Validating → Voting → Committed`, with `Abandoned` reachable
//! from any open state. A leader opens its round at `Proposed`; followers
//! open theirs when the entry arrives from the log.

use meridian_pool::VoteRecord;
use meridian_types::{Block, BlockHash, ResultHash, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Proposed,
    Validating,
    Voting,
    Committed,
    Abandoned,
}

impl RoundState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundState::Committed | RoundState::Abandoned)
    }

    fn can_move_to(self, next: RoundState) -> bool {
        use RoundState::*;
        matches!(
            (self, next),
            (Proposed, Validating)
                | (Validating, Voting)
                | (Voting, Committed)
                | (Proposed | Validating | Voting, Abandoned)
        )
    }
}

#[derive(Clone, Debug)]
pub struct Round {
    pub block: Block,
    pub result_hash: ResultHash,
    pub state: RoundState,
    /// This node's vote, once cast.
    pub local_vote: Option<VoteRecord>,
    pub opened_at: Timestamp,
    pub last_broadcast: Timestamp,
}

impl Round {
    pub fn new(block: Block, result_hash: ResultHash, now: Timestamp) -> Self {
        Self {
            block,
            result_hash,
            state: RoundState::Proposed,
            local_vote: None,
            opened_at: now,
            last_broadcast: now,
        }
    }

    pub fn height(&self) -> u64 {
        self.block.height
    }

    pub fn block_hash(&self) -> BlockHash {
        self.block.hash
    }

    /// Move to `next` if the transition is legal. Returns whether it moved.
    pub fn advance(&mut self, next: RoundState) -> bool {
        if self.state.can_move_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    pub fn is_open(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn timed_out(&self, timeout_secs: u64, now: Timestamp) -> bool {
        self.is_open() && self.opened_at.has_expired(timeout_secs, now)
    }

    /// The local vote to resend, if one is due.
    pub fn rebroadcast_due(&self, interval_secs: u64, now: Timestamp) -> Option<VoteRecord> {
        if self.state != RoundState::Voting {
            return None;
        }
        let vote = self.local_vote?;
        self.last_broadcast
            .has_expired(interval_secs, now)
            .then_some(vote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{Address, MerkleRoot};

    fn round() -> Round {
        let block = Block {
            height: 4,
            prev_hash: BlockHash::ZERO,
            hash: BlockHash::new([4; 32]),
            transactions: vec![],
            merkle_root: MerkleRoot::ZERO,
            version: 1,
            timestamp: Timestamp::new(10),
            miner: Address::ZERO,
        };
        Round::new(block, ResultHash::new([1; 32]), Timestamp::new(100))
    }

    #[test]
    fn follows_the_happy_path() {
        let mut r = round();
        assert!(r.advance(RoundState::Validating));
        assert!(r.advance(RoundState::Voting));
        assert!(r.advance(RoundState::Committed));
        assert!(!r.is_open());
    }

    #[test]
    fn rejects_skips_and_resurrection() {
        let mut r = round();
        assert!(!r.advance(RoundState::Voting));
        assert!(!r.advance(RoundState::Committed));
        assert!(r.advance(RoundState::Abandoned));
        assert!(!r.advance(RoundState::Validating));
        assert!(!r.advance(RoundState::Abandoned));
        assert_eq!(r.state, RoundState::Abandoned);
    }

    #[test]
    fn timeout_only_applies_to_open_rounds() {
        let mut r = round();
        assert!(!r.timed_out(60, Timestamp::new(159)));
        assert!(r.timed_out(60, Timestamp::new(160)));
        r.advance(RoundState::Abandoned);
        assert!(!r.timed_out(60, Timestamp::new(500)));
    }

    #[test]
    fn rebroadcast_needs_a_cast_vote() {
        let mut r = round();
        r.advance(RoundState::Validating);
        r.advance(RoundState::Voting);
        assert_eq!(r.rebroadcast_due(1, Timestamp::new(105)), None);

        let vote = VoteRecord {
            voter: 1,
            height: 4,
            result_hash: r.result_hash,
            agree: true,
        };
        r.local_vote = Some(vote);
        assert_eq!(r.rebroadcast_due(1, Timestamp::new(100)), None);
        assert_eq!(r.rebroadcast_due(1, Timestamp::new(101)), Some(vote));
    }
}
