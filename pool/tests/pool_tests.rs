use std::sync::Arc;

use meridian_crypto::{keypair_from_seed, seal_transaction, sign_transaction};
use meridian_ledger::{Ledger, RewardAddresses};
use meridian_pool::{PoolConfig, PoolError, TxPool, VoteRecord};
use meridian_store::MemStore;
use meridian_types::{
    Address, ChainParams, KeyPair, ResultHash, Timestamp, Transaction, TxKind,
};
use proptest::prelude::*;

const FUNDS: u64 = 100_000_000;
const AMOUNT: u64 = 1_000_000;

fn key(seed: u8) -> KeyPair {
    keypair_from_seed(&[seed; 32])
}

fn addr(seed: u8) -> Address {
    Address::from_public_key(&key(seed).public)
}

fn params() -> ChainParams {
    ChainParams {
        admins: vec![addr(50)],
        ..ChainParams::meridian_defaults()
    }
}

fn ledger_with(funded: &[u8]) -> Ledger {
    let ledger = Ledger::new(Arc::new(MemStore::new()), params());
    let allocs: Vec<_> = funded.iter().map(|s| (addr(*s), FUNDS)).collect();
    ledger.apply_genesis(&allocs).unwrap();
    ledger
}

fn signed(kind: TxKind, nonce: u64, from: u8, to: Address, amount: u64, fee: u64) -> Transaction {
    let mut tx = Transaction::new(kind, nonce, addr(from), to, amount, Timestamp::new(1))
        .with_fee(fee);
    sign_transaction(&mut tx, &key(from));
    tx
}

fn transfer(nonce: u64, from: u8, to: u8, amount: u64) -> Transaction {
    signed(TxKind::plain_transfer(), nonce, from, addr(to), amount, 0)
}

fn now(secs: u64) -> Timestamp {
    Timestamp::new(secs)
}

fn rewards() -> RewardAddresses {
    RewardAddresses {
        community: addr(60),
        tech: addr(61),
        marketplace: addr(62),
    }
}

#[test]
fn admits_valid_transfer() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::default();
    let tx = transfer(1, 1, 2, AMOUNT);
    let hash = pool.admit(tx.clone(), &ledger, now(0)).unwrap();

    assert_eq!(hash, tx.hash);
    assert!(pool.exists(&hash));
    assert_eq!(pool.get(&hash), Some(tx.clone()));
    assert_eq!(pool.pending_for(&addr(1)), vec![tx]);
    assert_eq!(pool.len(), 1);
}

#[test]
fn second_transaction_with_same_nonce_is_rejected() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::default();
    pool.admit(transfer(1, 1, 2, AMOUNT), &ledger, now(0))
        .unwrap();

    let again = transfer(1, 1, 3, 2 * AMOUNT);
    assert_eq!(
        pool.admit(again, &ledger, now(0)),
        Err(PoolError::DuplicateNonce {
            sender: addr(1),
            nonce: 1
        })
    );
    assert_eq!(pool.len(), 1);
}

#[test]
fn rejects_stale_nonce() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::default();
    assert_eq!(
        pool.admit(transfer(0, 1, 2, AMOUNT), &ledger, now(0)),
        Err(PoolError::NonceTooLow {
            expected: 1,
            got: 0
        })
    );
}

#[test]
fn future_nonce_is_admitted() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::default();
    assert!(pool
        .admit(transfer(7, 1, 2, AMOUNT), &ledger, now(0))
        .is_ok());
}

#[test]
fn rejects_unfunded_sender() {
    let ledger = ledger_with(&[]);
    let pool = TxPool::default();
    assert!(matches!(
        pool.admit(transfer(1, 1, 2, AMOUNT), &ledger, now(0)),
        Err(PoolError::InsufficientBalance { address, .. }) if address == addr(1)
    ));
}

#[test]
fn rejects_tampered_and_foreign_signatures() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::default();

    let mut tampered = transfer(1, 1, 2, AMOUNT);
    tampered.amount += 1;
    assert_eq!(
        pool.admit(tampered, &ledger, now(0)),
        Err(PoolError::BadHash)
    );

    let mut foreign = Transaction::new(
        TxKind::plain_transfer(),
        1,
        addr(1),
        addr(2),
        AMOUNT,
        Timestamp::new(1),
    );
    sign_transaction(&mut foreign, &key(9));
    assert_eq!(
        pool.admit(foreign, &ledger, now(0)),
        Err(PoolError::BadSignature)
    );
}

#[test]
fn rejects_malformed_addresses() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::default();

    let to_nil = signed(TxKind::plain_transfer(), 1, 1, Address::ZERO, AMOUNT, 0);
    assert_eq!(
        pool.admit(to_nil, &ledger, now(0)),
        Err(PoolError::MalformedAddress("to"))
    );

    let mut conversion = Transaction::new(
        TxKind::ConvertToPck { pck: 10 },
        1,
        addr(1),
        addr(2),
        AMOUNT,
        Timestamp::new(1),
    );
    seal_transaction(&mut conversion);
    assert_eq!(
        pool.admit(conversion, &ledger, now(0)),
        Err(PoolError::MalformedAddress("to"))
    );
}

#[test]
fn coinbase_is_never_admitted() {
    let ledger = ledger_with(&[]);
    let pool = TxPool::default();
    let mut coinbase = Transaction::new(
        TxKind::Coinbase,
        1,
        Address::ZERO,
        addr(2),
        AMOUNT,
        Timestamp::new(1),
    );
    seal_transaction(&mut coinbase);
    assert_eq!(
        pool.admit(coinbase, &ledger, now(0)),
        Err(PoolError::CoinbaseNotAdmissible)
    );
}

#[test]
fn enforces_minimums() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::default();
    assert_eq!(
        pool.admit(transfer(1, 1, 2, 499_999), &ledger, now(0)),
        Err(PoolError::BelowMinimum {
            amount: 499_999,
            min: 500_000
        })
    );

    let token = |fee| {
        signed(
            TxKind::Transfer {
                script: Some("new \"gold\" 1000 2".into()),
                order: None,
            },
            1,
            1,
            addr(2),
            AMOUNT,
            fee,
        )
    };
    assert_eq!(
        pool.admit(token(10), &ledger, now(0)),
        Err(PoolError::FeeTooLow {
            fee: 10,
            min: 500_000
        })
    );
    assert!(pool.admit(token(500_000), &ledger, now(0)).is_ok());
}

#[test]
fn rejects_uncompilable_script() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::default();
    let tx = signed(
        TxKind::Transfer {
            script: Some("burn \"gold\" 5".into()),
            order: None,
        },
        1,
        1,
        addr(2),
        AMOUNT,
        500_000,
    );
    assert!(matches!(
        pool.admit(tx, &ledger, now(0)),
        Err(PoolError::InvalidScript(_))
    ));
}

#[test]
fn freeze_needs_admin_and_target_funds() {
    let ledger = ledger_with(&[1, 50]);
    let pool = TxPool::default();

    let by_user = signed(TxKind::Freeze, 1, 1, addr(2), AMOUNT, 0);
    assert_eq!(
        pool.admit(by_user, &ledger, now(0)),
        Err(PoolError::NotAdmin(addr(1)))
    );

    let unfunded_target = signed(TxKind::Freeze, 1, 50, addr(2), AMOUNT, 0);
    assert!(matches!(
        pool.admit(unfunded_target, &ledger, now(0)),
        Err(PoolError::InsufficientBalance { .. })
    ));

    let ok = signed(TxKind::Freeze, 1, 50, addr(1), AMOUNT, 0);
    assert!(pool.admit(ok, &ledger, now(0)).is_ok());
}

#[test]
fn capacity_and_sender_limits() {
    let ledger = ledger_with(&[1, 2]);
    let pool = TxPool::new(PoolConfig {
        capacity: 3,
        per_sender_cap: 2,
        ..PoolConfig::default()
    });
    pool.admit(transfer(1, 1, 3, AMOUNT), &ledger, now(0)).unwrap();
    pool.admit(transfer(2, 1, 3, AMOUNT), &ledger, now(0)).unwrap();
    assert_eq!(
        pool.admit(transfer(3, 1, 3, AMOUNT), &ledger, now(0)),
        Err(PoolError::SenderLimit(addr(1)))
    );
    pool.admit(transfer(1, 2, 3, AMOUNT), &ledger, now(0)).unwrap();
    assert_eq!(
        pool.admit(transfer(2, 2, 3, AMOUNT), &ledger, now(0)),
        Err(PoolError::PoolFull)
    );
}

#[test]
fn select_follows_nonces_and_arrival() {
    let ledger = ledger_with(&[1, 2]);
    let pool = TxPool::default();
    let a2 = transfer(2, 1, 3, AMOUNT);
    let a1 = transfer(1, 1, 3, AMOUNT);
    let b1 = transfer(1, 2, 3, AMOUNT);
    pool.admit(a2.clone(), &ledger, now(1)).unwrap();
    pool.admit(b1.clone(), &ledger, now(2)).unwrap();
    pool.admit(a1.clone(), &ledger, now(3)).unwrap();

    // Sender 1's head (nonce 1) arrived last, so sender 2 goes first.
    let batch = pool.select(&ledger);
    assert_eq!(batch, vec![b1, a1, a2]);
    // Selection does not consume entries.
    assert_eq!(pool.len(), 3);
}

#[test]
fn select_defers_gaps_and_drops_what_no_longer_fits() {
    let ledger = ledger_with(&[1, 2]);
    let pool = TxPool::new(PoolConfig {
        nonce_lookahead: 5,
        ..PoolConfig::default()
    });
    let gap = transfer(3, 1, 3, AMOUNT);
    let far = transfer(20, 1, 3, AMOUNT);
    let first = transfer(1, 2, 3, FUNDS - AMOUNT);
    let overdraw = transfer(2, 2, 3, 2 * AMOUNT);
    for tx in [&gap, &far, &first, &overdraw] {
        pool.admit(tx.clone(), &ledger, now(0)).unwrap();
    }

    let batch = pool.select(&ledger);
    assert_eq!(batch, vec![first.clone()]);
    assert!(pool.exists(&gap.hash));
    assert!(!pool.exists(&far.hash));
    assert!(!pool.exists(&overdraw.hash));
    assert!(pool.exists(&first.hash));
}

#[test]
fn select_respects_batch_cap() {
    let ledger = ledger_with(&[1]);
    let pool = TxPool::new(PoolConfig {
        batch_cap: 2,
        ..PoolConfig::default()
    });
    for nonce in 1..=4 {
        pool.admit(transfer(nonce, 1, 3, AMOUNT), &ledger, now(0))
            .unwrap();
    }
    let batch = pool.select(&ledger);
    assert_eq!(
        batch.iter().map(|t| t.nonce).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[test]
fn filter_removes_committed_and_stale_entries() {
    let ledger = ledger_with(&[1, 2]);
    let pool = TxPool::default();
    let a1 = transfer(1, 1, 3, AMOUNT);
    let b1 = transfer(1, 2, 3, AMOUNT);
    let b2 = transfer(2, 2, 3, AMOUNT);
    pool.admit(a1.clone(), &ledger, now(100)).unwrap();
    pool.admit(b1.clone(), &ledger, now(100)).unwrap();
    pool.admit(b2.clone(), &ledger, now(120)).unwrap();

    let block = ledger
        .build_block(vec![a1.clone()], addr(61), &rewards(), now(125))
        .unwrap();
    let result = ledger.calculation_results(&block).unwrap();
    assert!(ledger.check_results(&block, &result));
    ledger.append(&block, &block.miner).unwrap();

    // a1 is committed, b1 has sat for 25s, b2 for 5s.
    assert_eq!(pool.filter(&block, now(125)), 2);
    assert!(!pool.exists(&a1.hash));
    assert!(!pool.exists(&b1.hash));
    assert!(pool.exists(&b2.hash));
}

#[test]
fn votes_are_tallied_per_proposal() {
    let pool = TxPool::default();
    let hash = ResultHash::new([4; 32]);
    let vote = |voter, agree| VoteRecord {
        voter,
        height: 3,
        result_hash: hash,
        agree,
    };
    assert!(pool.set_check_data(vote(1, true)));
    assert!(pool.set_check_data(vote(2, true)));
    assert!(pool.set_check_data(vote(3, false)));
    assert!(!pool.set_check_data(vote(1, false)));
    assert_eq!(pool.votes_for(3, &hash), (2, 1));

    assert_eq!(pool.purge_votes(3), 3);
    assert_eq!(pool.votes_for(3, &hash), (0, 0));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn selected_nonces_are_contiguous_per_sender(
        plan in prop::collection::vec((0u8..4, 1u64..8), 1..30)
    ) {
        let senders = [1u8, 2, 3, 4];
        let ledger = ledger_with(&senders);
        let pool = TxPool::new(PoolConfig {
            batch_cap: 10,
            ..PoolConfig::default()
        });
        for (i, (s, nonce)) in plan.iter().enumerate() {
            let _ = pool.admit(transfer(*nonce, senders[*s as usize], 9, AMOUNT), &ledger, now(i as u64));
        }

        let batch = pool.select(&ledger);
        prop_assert!(batch.len() <= 10);
        for s in senders {
            let nonces: Vec<u64> = batch
                .iter()
                .filter(|t| t.from == addr(s))
                .map(|t| t.nonce)
                .collect();
            let expected: Vec<u64> = (1..=nonces.len() as u64).collect();
            prop_assert_eq!(nonces, expected);
        }
    }
}
