//! The consensus and replication coordinator.
//!
//! The leader turns a pool batch into a block and appends it, with its state
//! commitment, to the replicated log. Every member validates the entry as it
//! comes off the log, votes, and gossips the vote. Once ⌈2N/3⌉ members agree
//! the block is appended to the ledger; more than ⌊N/3⌋ disagreements abandon
//! the round. A member that sees an entry from too far ahead first downloads
//! the missing blocks from the leader, and a follower whose chain has
//! diverged from the leader's rolls back to the last shared block.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use meridian_crypto::{hash_block, transactions_root};
use meridian_ledger::{ChainLedger, LedgerError};
use meridian_messages::{GossipMessage, ProposalEntry};
use meridian_pool::{validate_static, PoolError, TxPool, VoteRecord};
use meridian_types::{Block, BlockHash, NodeId, Timestamp, TxHash};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::quorum::{self, Verdict};
use crate::round::{Round, RoundState};
use crate::traits::{CatchUpClient, Clock, Gossip, ReplicatedLog};
use crate::{ConsensusError, CoordinatorConfig};

/// External services the coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub log: Arc<dyn ReplicatedLog>,
    pub gossip: Arc<dyn Gossip>,
    pub catch_up: Arc<dyn CatchUpClient>,
    pub clock: Arc<dyn Clock>,
}

/// What handling a log entry or a vote led to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The entry's height is already committed here.
    AlreadyApplied,
    /// A round is open; `agree` is this node's own verdict, which only
    /// counts when it is a committee member.
    Voting { height: u64, agree: bool },
    Committed { height: u64 },
    Abandoned { height: u64 },
    /// Catch-up brought this node past the entry.
    CaughtUp { height: u64 },
    /// Nothing to do: a duplicate delivery, a competing proposal, or an
    /// entry this node cannot place yet.
    Ignored,
}

/// What one tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub abandoned: Vec<u64>,
    pub rebroadcast: usize,
    pub proposed: Option<u64>,
    /// Lowest height replaced by the leader's chain, if a fork was repaired.
    pub repaired: Option<u64>,
}

#[derive(Debug, Error)]
enum Rejection {
    #[error("block hash does not match its contents")]
    BlockHash,
    #[error("merkle root does not match the transactions")]
    MerkleRoot,
    #[error("previous hash {got} does not extend tip {expected}")]
    PrevHash { expected: BlockHash, got: BlockHash },
    #[error("coinbase mints {got:?}, expected {expected}")]
    Minted { expected: u64, got: Option<u64> },
    #[error("transaction {hash}: {error}")]
    Transaction { hash: TxHash, error: PoolError },
    #[error("state commitment differs")]
    Results,
    #[error("ledger: {0}")]
    Ledger(LedgerError),
}

pub struct Coordinator {
    config: CoordinatorConfig,
    ledger: Arc<dyn ChainLedger>,
    pool: Arc<TxPool>,
    log: Arc<dyn ReplicatedLog>,
    gossip: Arc<dyn Gossip>,
    catch_up: Arc<dyn CatchUpClient>,
    clock: Arc<dyn Clock>,
    rounds: Mutex<BTreeMap<u64, Round>>,
    last_fork_check: Mutex<Option<Timestamp>>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        ledger: Arc<dyn ChainLedger>,
        pool: Arc<TxPool>,
        services: Collaborators,
    ) -> Self {
        Self {
            config,
            ledger,
            pool,
            log: services.log,
            gossip: services.gossip,
            catch_up: services.catch_up,
            clock: services.clock,
            rounds: Mutex::new(BTreeMap::new()),
            last_fork_check: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn node_id(&self) -> NodeId {
        self.config.node_id
    }

    pub async fn round_state(&self, height: u64) -> Option<RoundState> {
        self.rounds.lock().await.get(&height).map(|r| r.state)
    }

    // ── Leader ──────────────────────────────────────────────────────────

    /// Build the next block from the pool and append it to the log.
    ///
    /// Returns the proposed height, or `None` while a round for the next
    /// height is still open.
    pub async fn propose(&self) -> Result<Option<u64>, ConsensusError> {
        if !self.log.is_leader() {
            return Err(ConsensusError::NotLeader);
        }
        let next = self.ledger.height()? + 1;
        if self
            .rounds
            .lock()
            .await
            .get(&next)
            .is_some_and(Round::is_open)
        {
            trace!(height = next, "round in flight, not proposing");
            return Ok(None);
        }

        let now = self.clock.now();
        let batch = self.pool.select(&*self.ledger);
        let block = self
            .ledger
            .build_block(batch, self.config.miner, &self.config.rewards(), now)?;
        if block.height != next {
            return Err(LedgerError::HeightMismatch {
                expected: next,
                got: block.height,
            }
            .into());
        }
        let result_hash = self.ledger.calculation_results(&block)?;
        let txs = block.transactions.len();
        let entry = ProposalEntry { block, result_hash };
        let bytes = entry.encode()?;

        self.rounds
            .lock()
            .await
            .insert(next, Round::new(entry.block, result_hash, now));
        if let Err(e) = self.log.propose(bytes).await {
            if let Some(round) = self.rounds.lock().await.get_mut(&next) {
                round.advance(RoundState::Abandoned);
            }
            return Err(e);
        }
        info!(height = next, txs, result = %result_hash, "proposed block");
        Ok(Some(next))
    }

    // ── Log delivery ────────────────────────────────────────────────────

    /// Handle an entry delivered by the replicated log.
    pub async fn on_replicated_entry(&self, bytes: &[u8]) -> Result<Outcome, ConsensusError> {
        let entry = ProposalEntry::decode(bytes)?;
        let height = entry.height();
        let current = self.ledger.height()?;

        if height <= current {
            debug!(height, current, "entry already applied");
            return Ok(Outcome::AlreadyApplied);
        }
        if height > current + 1 {
            if self.log.is_leader() {
                warn!(height, current, "leader received an entry from beyond its own tip");
                return Ok(Outcome::Ignored);
            }
            self.catch_up_to_leader().await?;
            let current = self.ledger.height()?;
            if height <= current {
                return Ok(Outcome::CaughtUp { height: current });
            }
            if height > current + 1 {
                debug!(height, current, "still behind after catch-up");
                return Ok(Outcome::Ignored);
            }
        }
        self.deliver(entry).await
    }

    async fn deliver(&self, entry: ProposalEntry) -> Result<Outcome, ConsensusError> {
        let now = self.clock.now();
        let height = entry.height();
        self.pool.filter(&entry.block, now);

        let vote = {
            let mut rounds = self.rounds.lock().await;
            let own_proposal = rounds.get(&height).is_some_and(|r| {
                r.state == RoundState::Proposed && r.block_hash() == entry.block.hash
            });
            if !own_proposal {
                if let Some(existing) = rounds.get(&height) {
                    if existing.is_open() && existing.state != RoundState::Proposed {
                        debug!(height, block = %entry.block.hash, "round already voting, ignoring entry");
                        return Ok(Outcome::Ignored);
                    }
                }
                rounds.insert(
                    height,
                    Round::new(entry.block.clone(), entry.result_hash, now),
                );
            }
            let Some(round) = rounds.get_mut(&height) else {
                return Ok(Outcome::Ignored);
            };
            round.advance(RoundState::Validating);

            let agree = match self.verify_proposal(&entry) {
                Ok(()) => true,
                Err(reason) => {
                    warn!(height, block = %entry.block.hash, %reason, "rejecting proposal");
                    false
                }
            };
            let vote = VoteRecord {
                voter: self.config.node_id,
                height,
                result_hash: entry.result_hash,
                agree,
            };
            round.advance(RoundState::Voting);
            if self.config.is_member(vote.voter) {
                round.local_vote = Some(vote);
                round.last_broadcast = now;
            }
            vote
        };

        if self.config.is_member(vote.voter) {
            self.pool.set_check_data(vote);
            if let Err(e) = self.gossip.broadcast(GossipMessage::Vote(vote.into())).await {
                warn!(height, error = %e, "vote broadcast failed");
            }
            debug!(height, agree = vote.agree, "voted");
        } else {
            debug!(height, agree = vote.agree, "observer, not voting");
        }

        Ok(self
            .evaluate(height)
            .await?
            .unwrap_or(Outcome::Voting {
                height,
                agree: vote.agree,
            }))
    }

    fn verify_proposal(&self, entry: &ProposalEntry) -> Result<(), Rejection> {
        let block = &entry.block;
        let params = self.ledger.params();

        if !matches!(hash_block(block), Ok(h) if h == block.hash) {
            return Err(Rejection::BlockHash);
        }
        if !matches!(transactions_root(&block.transactions), Ok(r) if r == block.merkle_root) {
            return Err(Rejection::MerkleRoot);
        }
        let expected = self.tip_hash(block.height - 1).map_err(Rejection::Ledger)?;
        if block.prev_hash != expected {
            return Err(Rejection::PrevHash {
                expected,
                got: block.prev_hash,
            });
        }
        let reward = params.block_reward(block.height);
        if block.minted() != Some(reward) {
            return Err(Rejection::Minted {
                expected: reward,
                got: block.minted(),
            });
        }
        for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
            validate_static(tx, params).map_err(|error| Rejection::Transaction {
                hash: tx.hash,
                error,
            })?;
        }
        if !self.ledger.check_results(block, &entry.result_hash) {
            return Err(Rejection::Results);
        }
        Ok(())
    }

    fn tip_hash(&self, height: u64) -> Result<BlockHash, LedgerError> {
        if height == 0 {
            return Ok(BlockHash::ZERO);
        }
        self.ledger
            .block_by_height(height)?
            .map(|b| b.hash)
            .ok_or(LedgerError::BlockNotFound(height))
    }

    // ── Votes ───────────────────────────────────────────────────────────

    /// Record a vote gossiped by another member.
    pub async fn on_vote(&self, vote: VoteRecord) -> Result<Option<Outcome>, ConsensusError> {
        if !self.config.is_member(vote.voter) {
            debug!(
                voter = vote.voter,
                height = vote.height,
                "vote from outside the committee dropped"
            );
            return Ok(None);
        }
        if vote.height <= self.ledger.height()? {
            return Ok(None);
        }
        if !self.pool.set_check_data(vote) {
            return Ok(None);
        }
        trace!(voter = vote.voter, height = vote.height, agree = vote.agree, "vote recorded");
        self.evaluate(vote.height).await
    }

    async fn evaluate(&self, height: u64) -> Result<Option<Outcome>, ConsensusError> {
        let mut rounds = self.rounds.lock().await;
        let Some(round) = rounds.get_mut(&height) else {
            return Ok(None);
        };
        if round.state != RoundState::Voting {
            return Ok(None);
        }

        let (agree, disagree) = self.pool.votes_for(height, &round.result_hash);
        match quorum::evaluate(agree, disagree, self.config.committee_size) {
            Verdict::Pending => Ok(None),
            Verdict::Abandon => {
                round.advance(RoundState::Abandoned);
                warn!(height, agree, disagree, "round abandoned");
                Ok(Some(Outcome::Abandoned { height }))
            }
            Verdict::Commit => {
                if self.ledger.height()? >= height {
                    round.advance(RoundState::Committed);
                    return Ok(Some(Outcome::AlreadyApplied));
                }
                let block = round.block.clone();
                if let Err(e) = self.ledger.append(&block, &block.miner) {
                    round.advance(RoundState::Abandoned);
                    error!(height, error = %e, "append failed");
                    return Err(e.into());
                }
                round.advance(RoundState::Committed);
                rounds.retain(|h, _| *h >= height);
                drop(rounds);
                self.pool.purge_votes(height);
                info!(height, agree, disagree, hash = %block.hash, "block committed");
                Ok(Some(Outcome::Committed { height }))
            }
        }
    }

    // ── Timers ──────────────────────────────────────────────────────────

    /// Expire stale rounds, resend due votes and, on the leader, propose.
    pub async fn tick(&self) -> Result<TickReport, ConsensusError> {
        let now = self.clock.now();
        let mut report = TickReport::default();
        let mut due = Vec::new();
        {
            let mut rounds = self.rounds.lock().await;
            for round in rounds.values_mut() {
                if round.timed_out(self.config.commit_timeout_secs, now) {
                    round.advance(RoundState::Abandoned);
                    warn!(height = round.height(), "round timed out");
                    report.abandoned.push(round.height());
                } else if let Some(vote) =
                    round.rebroadcast_due(self.config.rebroadcast_interval_secs, now)
                {
                    round.last_broadcast = now;
                    due.push(vote);
                }
            }
        }

        for vote in due {
            match self.gossip.broadcast(GossipMessage::Vote(vote.into())).await {
                Ok(()) => report.rebroadcast += 1,
                Err(e) => warn!(height = vote.height, error = %e, "vote rebroadcast failed"),
            }
        }

        if !report.abandoned.is_empty() && self.log.is_leader() {
            info!("handing over leadership after a timed-out round");
            if let Err(e) = self.log.transfer_leadership().await {
                warn!(error = %e, "leadership transfer failed");
            }
        }
        if self.log.is_leader() {
            report.proposed = self.propose().await?;
        } else if self.fork_check_due(now).await {
            match self.repair_fork().await {
                Ok(repaired) => report.repaired = repaired,
                Err(e) => warn!(error = %e, "fork check failed"),
            }
        }
        Ok(report)
    }

    // ── Catch-up ────────────────────────────────────────────────────────

    /// Download and commit every block the leader has beyond the local tip.
    /// Returns the number of blocks applied.
    pub async fn catch_up_to_leader(&self) -> Result<u64, ConsensusError> {
        let leader = self.log.leader().ok_or(ConsensusError::NoLeader)?;
        let wait = Duration::from_secs(self.config.catch_up_timeout_secs);
        let target = timeout(wait, self.catch_up.leader_max_height(leader))
            .await
            .map_err(|_| ConsensusError::CatchUpTimeout)??;
        let start = self.ledger.height()?;
        if target <= start {
            return Ok(0);
        }
        info!(leader, from = start + 1, to = target, "catching up");

        let mut applied = 0;
        let mut next = start + 1;
        while next <= target {
            let hi = next
                .saturating_add(self.config.catch_up_chunk - 1)
                .min(target);
            let blocks = timeout(wait, self.catch_up.block_range(leader, next, hi))
                .await
                .map_err(|_| ConsensusError::CatchUpTimeout)??;

            let before = applied;
            for block in blocks {
                if self.recover(&block)? {
                    applied += 1;
                }
            }
            if applied == before {
                return Err(ConsensusError::Rpc(format!(
                    "leader returned nothing usable for {next}..={hi}"
                )));
            }
            next = self.ledger.height()? + 1;
        }

        let height = self.ledger.height()?;
        self.pool.purge_votes(height);
        self.rounds.lock().await.retain(|h, _| *h > height);
        info!(height, applied, "caught up");
        Ok(applied)
    }

    async fn fork_check_due(&self, now: Timestamp) -> bool {
        let mut last = self.last_fork_check.lock().await;
        if last.is_some_and(|t| !t.has_expired(self.config.fork_check_interval_secs, now)) {
            return false;
        }
        *last = Some(now);
        true
    }

    // ── Fork repair ─────────────────────────────────────────────────────

    /// Compare the local chain with the leader's and, if they differ, roll
    /// back to the last shared block and catch up from there. Transactions
    /// from the discarded blocks go back to the pool.
    ///
    /// Returns the lowest height that was replaced. A leader that is behind
    /// the local tip is left alone.
    pub async fn repair_fork(&self) -> Result<Option<u64>, ConsensusError> {
        if self.log.is_leader() {
            return Ok(None);
        }
        let Some(leader) = self.log.leader() else {
            return Ok(None);
        };
        let tip = self.ledger.height()?;

        let mut diverged = None;
        let mut height = tip;
        while height > 0 {
            let Some(theirs) = self.leader_block(leader, height).await? else {
                return Ok(None);
            };
            if theirs.hash == self.tip_hash(height)? {
                break;
            }
            diverged = Some(height);
            height -= 1;
        }
        let Some(from) = diverged else {
            trace!(height = tip, "tip matches the leader");
            return Ok(None);
        };

        warn!(leader, from, tip, "chain diverged from the leader, rolling back");
        let orphaned = self.ledger.get_block_section(from, tip)?;
        self.ledger.delete_block(from)?;
        self.rounds.lock().await.retain(|h, _| *h < from);
        if let Err(e) = self.catch_up_to_leader().await {
            warn!(from, error = %e, "catch-up after rollback failed");
        }

        let now = self.clock.now();
        let readmitted = orphaned
            .into_iter()
            .flat_map(|b| b.transactions)
            .filter(|tx| !tx.is_coinbase())
            .filter(|tx| self.pool.admit(tx.clone(), &*self.ledger, now).is_ok())
            .count();
        info!(from, height = self.ledger.height()?, readmitted, "fork repaired");
        Ok(Some(from))
    }

    async fn leader_block(
        &self,
        leader: NodeId,
        height: u64,
    ) -> Result<Option<Block>, ConsensusError> {
        let wait = Duration::from_secs(self.config.catch_up_timeout_secs);
        timeout(wait, self.catch_up.block_by_height(leader, height))
            .await
            .map_err(|_| ConsensusError::CatchUpTimeout)?
    }

    /// Commit one fetched block if it is next. Returns whether it was applied.
    fn recover(&self, block: &Block) -> Result<bool, ConsensusError> {
        let current = self.ledger.height()?;
        if block.height <= current {
            return Ok(false);
        }
        if block.height != current + 1 {
            return Err(ConsensusError::Rpc(format!(
                "expected block {}, got {}",
                current + 1,
                block.height
            )));
        }
        if !matches!(hash_block(block), Ok(h) if h == block.hash)
            || block.prev_hash != self.tip_hash(current)?
        {
            return Err(ConsensusError::Rpc(format!(
                "block {} does not link to the local chain",
                block.height
            )));
        }
        self.ledger.recover_block(block, &block.miner)?;
        self.pool.filter(block, self.clock.now());
        Ok(true)
    }
}
