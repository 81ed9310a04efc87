//! Coinbase reward split.
//!
//! The block reward is cut into tenths. Four go to the technical (mining)
//! address along with the division remainder, four to the community
//! address, and two to the marketplace. When the batch carries orders
//! signed by the marketplace key, one of the marketplace's tenths is
//! shared between the order beneficiaries instead.

use meridian_crypto::{seal_transaction, verify_order};
use meridian_types::{Address, ChainParams, Timestamp, Transaction, TxKind};

/// Reward recipients for one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardAddresses {
    pub community: Address,
    pub tech: Address,
    pub marketplace: Address,
}

/// Beneficiaries of every transfer in `pending` whose order verifies under
/// the configured marketplace key, in batch order.
pub fn order_beneficiaries(pending: &[Transaction], params: &ChainParams) -> Vec<Address> {
    pending
        .iter()
        .filter_map(Transaction::order)
        .filter(|order| verify_order(order, &params.marketplace))
        .map(|order| order.beneficiary)
        .collect()
}

/// `(recipient, amount)` pairs in append order: beneficiaries, marketplace,
/// tech, community.
pub fn reward_split(
    total: u64,
    beneficiaries: &[Address],
    to: &RewardAddresses,
) -> Vec<(Address, u64)> {
    let each = total / 10;
    let rem = total % 10;
    let mut out = Vec::with_capacity(beneficiaries.len() + 3);

    if beneficiaries.is_empty() {
        out.push((to.marketplace, 2 * each));
    } else {
        let n = beneficiaries.len() as u64;
        out.extend(beneficiaries.iter().map(|b| (*b, each / n)));
        out.push((to.marketplace, each + each % n));
    }
    out.push((to.tech, 4 * each + rem));
    out.push((to.community, 4 * each));
    out
}

/// Sealed coinbase transactions for a block at `height`.
pub fn coinbase_transactions(
    params: &ChainParams,
    height: u64,
    timestamp: Timestamp,
    pending: &[Transaction],
    to: &RewardAddresses,
) -> Vec<Transaction> {
    let beneficiaries = order_beneficiaries(pending, params);
    reward_split(params.block_reward(height), &beneficiaries, to)
        .into_iter()
        .map(|(recipient, amount)| {
            let mut tx = Transaction::new(
                TxKind::Coinbase,
                height,
                Address::ZERO,
                recipient,
                amount,
                timestamp,
            );
            seal_transaction(&mut tx);
            tx
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_crypto::{keypair_from_seed, sign_order};
    use meridian_types::Order;
    use proptest::prelude::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 32])
    }

    fn targets() -> RewardAddresses {
        RewardAddresses {
            community: addr(1),
            tech: addr(2),
            marketplace: addr(3),
        }
    }

    #[test]
    fn split_without_orders() {
        let split = reward_split(49_460_000_000, &[], &targets());
        assert_eq!(
            split,
            vec![
                (addr(3), 9_892_000_000),
                (addr(2), 19_784_000_000),
                (addr(1), 19_784_000_000),
            ]
        );
    }

    #[test]
    fn split_with_orders_shares_one_tenth() {
        let split = reward_split(1_007, &[addr(7), addr(8), addr(9)], &targets());
        // each = 100, rem = 7; 100 / 3 = 33 per beneficiary, marketplace 100 + 1
        assert_eq!(
            split,
            vec![
                (addr(7), 33),
                (addr(8), 33),
                (addr(9), 33),
                (addr(3), 101),
                (addr(2), 407),
                (addr(1), 400),
            ]
        );
    }

    #[test]
    fn only_marketplace_signed_orders_count() {
        let market = keypair_from_seed(&[42; 32]);
        let params = ChainParams {
            marketplace: Address::from_public_key(&market.public),
            ..ChainParams::default()
        };
        let mut good = Order::new("o-1", addr(7), 10, "tea", "eu");
        sign_order(&mut good, &market);
        let mut forged = Order::new("o-2", addr(8), 10, "tea", "eu");
        sign_order(&mut forged, &keypair_from_seed(&[1; 32]));

        let with = |order: Order| {
            Transaction::new(
                TxKind::Transfer {
                    script: None,
                    order: Some(order),
                },
                1,
                addr(5),
                addr(6),
                500_000,
                Timestamp::new(1),
            )
        };
        let pending = vec![with(good), with(forged)];
        assert_eq!(order_beneficiaries(&pending, &params), vec![addr(7)]);
    }

    #[test]
    fn coinbases_use_height_as_nonce() {
        let txs = coinbase_transactions(
            &ChainParams::default(),
            12,
            Timestamp::new(99),
            &[],
            &targets(),
        );
        assert_eq!(txs.len(), 3);
        assert!(txs.iter().all(|t| t.is_coinbase() && t.nonce == 12));
        assert!(txs.iter().all(|t| t.time == Timestamp::new(99) && !t.hash.is_zero()));
    }

    proptest! {
        #[test]
        fn split_sums_to_total(total in 0u64..u64::MAX / 4, n in 0usize..12) {
            let beneficiaries: Vec<Address> = (0..n).map(|i| addr(100 + i as u8)).collect();
            let split = reward_split(total, &beneficiaries, &targets());
            let sum: u128 = split.iter().map(|(_, a)| *a as u128).sum();
            prop_assert_eq!(sum, total as u128);
            prop_assert_eq!(split.len(), n + 3);
        }
    }
}
