use std::collections::BTreeSet;

use meridian_ledger::RewardAddresses;
use meridian_types::{Address, NodeId};
use serde::{Deserialize, Serialize};

use crate::ConsensusError;

/// Committee membership, reward recipients and round timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub node_id: NodeId,
    /// Number of voting members, N.
    pub committee_size: usize,
    /// Ids of the voting members. Empty means `1..=committee_size`. A node
    /// whose id is not listed follows the chain without voting.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<NodeId>,
    /// Recorded as the block miner and paid the technical share.
    pub miner: Address,
    pub community: Address,
    pub marketplace: Address,
    pub commit_timeout_secs: u64,
    pub rebroadcast_interval_secs: u64,
    /// Blocks requested per catch-up call.
    pub catch_up_chunk: u64,
    pub catch_up_timeout_secs: u64,
    /// How often a follower compares its tip with the leader's chain.
    pub fork_check_interval_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            committee_size: 1,
            members: Vec::new(),
            miner: Address::ZERO,
            community: Address::ZERO,
            marketplace: Address::ZERO,
            commit_timeout_secs: 60,
            rebroadcast_interval_secs: 1,
            catch_up_chunk: 50,
            catch_up_timeout_secs: 2,
            fork_check_interval_secs: 10,
        }
    }
}

impl CoordinatorConfig {
    pub fn rewards(&self) -> RewardAddresses {
        RewardAddresses {
            community: self.community,
            tech: self.miner,
            marketplace: self.marketplace,
        }
    }

    /// The voting members, as configured or numbered from 1.
    pub fn committee(&self) -> BTreeSet<NodeId> {
        if self.members.is_empty() {
            (1..=self.committee_size as NodeId).collect()
        } else {
            self.members.iter().copied().collect()
        }
    }

    pub fn is_member(&self, id: NodeId) -> bool {
        if self.members.is_empty() {
            (1..=self.committee_size as NodeId).contains(&id)
        } else {
            self.members.contains(&id)
        }
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.committee_size == 0 {
            return Err(ConsensusError::Config("committee_size must be at least 1".into()));
        }
        if !self.members.is_empty() && self.committee().len() != self.committee_size {
            return Err(ConsensusError::Config(format!(
                "{} distinct members listed for a committee of {}",
                self.committee().len(),
                self.committee_size
            )));
        }

        if self.catch_up_chunk == 0 {
            return Err(ConsensusError::Config("catch_up_chunk must be at least 1".into()));
        }
        if self.miner.is_zero() {
            return Err(ConsensusError::Config("miner address is not set".into()));
        }
        Ok(())
    }
}
