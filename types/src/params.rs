//! Chain parameters shared by the ledger, the pool, and the coordinator.
//!
//! These values are fixed at node construction. Every node in a committee must
//! run with identical parameters or state commitments will diverge.

use serde::{Deserialize, Serialize};

use crate::Address;

/// Immutable chain-wide constants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    // ── Rewards ──────────────────────────────────────────────────────────
    /// Coinbase total minted per block before any decay is applied.
    pub initial_reward: u64,

    /// Number of blocks per reward epoch. At each completed epoch the
    /// per-block reward is multiplied by `reward_decay_num / reward_decay_den`.
    pub reward_epoch_blocks: u64,

    pub reward_decay_num: u64,
    pub reward_decay_den: u64,

    // ── Admission ────────────────────────────────────────────────────────
    /// Smallest amount accepted for transfer, freeze, and unfreeze, and the
    /// smallest fee accepted for a token transaction.
    pub min_amount: u64,

    // ── Authorities ──────────────────────────────────────────────────────
    /// Addresses allowed to issue freeze and unfreeze transactions.
    pub admins: Vec<Address>,

    /// Key that signs marketplace orders.
    pub marketplace: Address,

    pub block_version: u32,
}

impl ChainParams {
    pub fn meridian_defaults() -> Self {
        Self {
            initial_reward: 49_460_000_000,
            reward_epoch_blocks: 31_536_000,
            reward_decay_num: 8,
            reward_decay_den: 10,
            min_amount: 500_000,
            admins: Vec::new(),
            marketplace: Address::ZERO,
            block_version: 1,
        }
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        !address.is_zero() && self.admins.contains(address)
    }

    /// Total coinbase minted for a block at `height`.
    pub fn block_reward(&self, height: u64) -> u64 {
        let epochs = if self.reward_epoch_blocks == 0 {
            0
        } else {
            height / self.reward_epoch_blocks
        };
        let mut total = self.initial_reward;
        for _ in 0..epochs {
            if total == 0 {
                break;
            }
            // Numerator below denominator keeps this within u64.
            total = (total as u128 * self.reward_decay_num as u128
                / self.reward_decay_den.max(1) as u128) as u64;
        }
        total
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::meridian_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_decays_per_epoch() {
        let p = ChainParams {
            reward_epoch_blocks: 10,
            ..ChainParams::default()
        };
        assert_eq!(p.block_reward(1), 49_460_000_000);
        assert_eq!(p.block_reward(9), 49_460_000_000);
        assert_eq!(p.block_reward(10), 39_568_000_000);
        assert_eq!(p.block_reward(25), 31_654_400_000);
    }

    #[test]
    fn zero_address_is_never_admin() {
        let p = ChainParams {
            admins: vec![Address::ZERO],
            ..ChainParams::default()
        };
        assert!(!p.is_admin(&Address::ZERO));
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let p: ChainParams = serde_json::from_str(r#"{ "min_amount": 7 }"#).unwrap();
        assert_eq!(p.min_amount, 7);
        assert_eq!(p.initial_reward, 49_460_000_000);
    }
}
