//! Integration tests running whole nodes against in-process collaborators:
//! submission → gossip → proposal → replicated entry → votes → commit.
//!
//! Every member shares one nullable log cluster, gossip hub, catch-up router
//! and clock, so each test drives delivery explicitly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use meridian_consensus::{CatchUpService, CoordinatorConfig, Outcome};
use meridian_crypto::{keypair_from_seed, sign_transaction};
use meridian_ledger::RewardAddresses;
use meridian_messages::GossipMessage;
use meridian_node::{dump, GenesisAllocation, MeridianNode, NodeConfig, NodeError, NodeParts};
use meridian_nullables::{NullCatchUp, NullClock, NullGossipHub, NullLogCluster, NullStore};
use meridian_pool::PoolError;
use meridian_rpc::Inbound;
use meridian_types::{Address, NodeId, Timestamp, Transaction, TxKind, INITIAL_NONCE};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key_addr(seed: u8) -> Address {
    Address::from_public_key(&keypair_from_seed(&[seed; 32]).public)
}

fn genesis() -> Vec<GenesisAllocation> {
    vec![GenesisAllocation {
        address: key_addr(1),
        amount: 100_000_000,
    }]
}

fn transfer(nonce: u64) -> Transaction {
    let mut tx = Transaction::new(
        TxKind::plain_transfer(),
        nonce,
        key_addr(1),
        key_addr(2),
        1_000_000,
        Timestamp::new(1),
    );
    sign_transaction(&mut tx, &keypair_from_seed(&[1; 32]));
    tx
}

fn config(id: NodeId, committee: usize, genesis: Vec<GenesisAllocation>) -> NodeConfig {
    NodeConfig {
        genesis,
        tick_interval_ms: 20,
        consensus: CoordinatorConfig {
            node_id: id,
            committee_size: committee,
            miner: Address::new([70; 32]),
            community: Address::new([71; 32]),
            marketplace: Address::new([72; 32]),
            catch_up_chunk: 2,
            catch_up_timeout_secs: 1,
            ..CoordinatorConfig::default()
        },
        ..NodeConfig::default()
    }
}

struct Member {
    id: NodeId,
    node: Arc<MeridianNode>,
    store: Arc<NullStore>,
    entries: UnboundedReceiver<Vec<u8>>,
    gossip: UnboundedReceiver<GossipMessage>,
}

struct Cluster {
    log: NullLogCluster,
    hub: NullGossipHub,
    catch_up: NullCatchUp,
    clock: Arc<NullClock>,
    members: Vec<Member>,
}

impl Cluster {
    fn new() -> Self {
        Self {
            log: NullLogCluster::new(),
            hub: NullGossipHub::new(),
            catch_up: NullCatchUp::new(),
            clock: Arc::new(NullClock::new(1_000)),
            members: Vec::new(),
        }
    }

    /// A cluster of `n` members, ids `1..=n`, node 1 leading.
    fn with_members(n: u64, committee: usize) -> Self {
        let mut cluster = Self::new();
        for id in 1..=n {
            cluster.add(config(id, committee, genesis()));
        }
        cluster
    }

    fn add(&mut self, config: NodeConfig) -> Arc<MeridianNode> {
        let id = config.consensus.node_id;
        let store = Arc::new(NullStore::new());
        let (log, entries) = self.log.join(id);
        let (gossip, gossip_rx) = self.hub.join(id);
        let parts = NodeParts {
            store: store.clone(),
            log: Arc::new(log.clone()),
            entries: None,
            gossip: Arc::new(gossip),
            catch_up: Arc::new(self.catch_up.clone()),
            clock: self.clock.clone(),
        };
        let node = Arc::new(MeridianNode::with_parts(config, parts).expect("node builds"));
        self.catch_up.register(
            id,
            CatchUpService::new(node.ledger().clone(), Arc::new(log)),
        );
        self.members.push(Member {
            id,
            node: node.clone(),
            store,
            entries,
            gossip: gossip_rx,
        });
        node
    }

    fn node(&self, id: NodeId) -> &Arc<MeridianNode> {
        &self
            .members
            .iter()
            .find(|m| m.id == id)
            .expect("member exists")
            .node
    }

    /// Hand every queued log entry to its member, in id order.
    async fn deliver_entries(&mut self) -> Vec<(NodeId, Outcome)> {
        let mut outcomes = Vec::new();
        for member in &mut self.members {
            while let Ok(entry) = member.entries.try_recv() {
                let outcome = member.node.handle_entry(&entry).await.expect("entry handled");
                outcomes.push((member.id, outcome));
            }
        }
        outcomes
    }

    /// Deliver gossip until no member has anything left to read.
    async fn pump_gossip(&mut self) {
        loop {
            let mut delivered = 0;
            for member in &mut self.members {
                while let Ok(message) = member.gossip.try_recv() {
                    delivered += 1;
                    let _ = member.node.handle_gossip(message).await;
                }
            }
            if delivered == 0 {
                break;
            }
        }
    }

    /// One full round led by node 1.
    async fn round(&mut self) -> Vec<(NodeId, Outcome)> {
        self.node(1).propose().await.expect("leader proposes");
        let outcomes = self.deliver_entries().await;
        self.pump_gossip().await;
        outcomes
    }
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_nonce_is_rejected_across_the_committee() {
    let mut cluster = Cluster::with_members(2, 2);
    let first = transfer(INITIAL_NONCE);
    cluster.node(1).submit(first.clone()).await.unwrap();
    cluster.pump_gossip().await;
    assert!(cluster.node(2).pool().exists(&first.hash));

    let err = cluster.node(2).submit(first.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Pool(PoolError::DuplicateNonce { nonce: INITIAL_NONCE, .. })
    ));

    let mut rival = transfer(INITIAL_NONCE);
    rival.amount = 2_000_000;
    sign_transaction(&mut rival, &keypair_from_seed(&[1; 32]));
    assert!(cluster.node(1).submit(rival).await.is_err());
    assert_eq!(cluster.node(1).pool().len(), 1);
    assert_eq!(cluster.node(1).metrics().transactions_rejected.get(), 1);
}

#[tokio::test]
async fn http_submissions_count_in_the_metrics_and_are_gossiped() {
    let mut cluster = Cluster::with_members(2, 2);
    let tx = transfer(INITIAL_NONCE);

    let (reply, answer) = oneshot::channel();
    cluster
        .node(1)
        .handle_inbound(Inbound::Submit {
            tx: tx.clone(),
            reply,
        })
        .await
        .unwrap();
    assert_eq!(answer.await.unwrap(), Ok(tx.hash));

    let (reply, answer) = oneshot::channel();
    cluster
        .node(1)
        .handle_inbound(Inbound::Submit {
            tx: tx.clone(),
            reply,
        })
        .await
        .unwrap();
    assert!(matches!(
        answer.await.unwrap(),
        Err(PoolError::DuplicateNonce { .. })
    ));

    let metrics = cluster.node(1).metrics();
    assert_eq!(metrics.transactions_received.get(), 2);
    assert_eq!(metrics.transactions_rejected.get(), 1);
    assert_eq!(metrics.pool_size.get(), 1);

    cluster.pump_gossip().await;
    assert!(cluster.node(2).pool().exists(&tx.hash));
}

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_agree_one_dissent_commits() {
    let mut cluster = Cluster::new();
    for id in 1..=3 {
        cluster.add(config(id, 4, genesis()));
    }
    // Node 4 starts from different balances, so its state commitment for
    // the same block differs and it votes against.
    let mut skewed = genesis();
    skewed.push(GenesisAllocation {
        address: key_addr(9),
        amount: 5_000_000,
    });
    cluster.add(config(4, 4, skewed));

    let tx = transfer(INITIAL_NONCE);
    cluster.node(1).submit(tx.clone()).await.unwrap();
    cluster.pump_gossip().await;

    cluster.node(1).propose().await.unwrap();
    let outcomes = cluster.deliver_entries().await;
    assert!(outcomes.contains(&(4, Outcome::Voting { height: 1, agree: false })));
    for id in 1..=3 {
        assert!(outcomes.contains(&(id, Outcome::Voting { height: 1, agree: true })));
    }
    cluster.pump_gossip().await;

    let tip = cluster.node(1).ledger().block_by_height(1).unwrap().unwrap();
    assert_eq!(tip.transactions[0].hash, tx.hash);
    for id in 1..=3 {
        let node = cluster.node(id);
        assert_eq!(node.height().unwrap(), 1, "node {id}");
        assert_eq!(node.ledger().block_by_height(1).unwrap().unwrap().hash, tip.hash);
        assert!(node.pool().is_empty());
        assert_eq!(node.metrics().blocks_committed.get(), 1);
        assert_eq!(node.metrics().committed_height.get(), 1);
    }

    let dissent = cluster
        .hub
        .sent()
        .into_iter()
        .filter(|(from, m)| *from == 4 && matches!(m, GossipMessage::Vote(v) if !v.agree))
        .count();
    assert_eq!(dissent, 1);
}

#[tokio::test]
async fn timed_out_round_is_abandoned_and_leadership_moves() {
    let mut cluster = Cluster::with_members(2, 2);
    cluster.log.isolate(2);

    let report = cluster.node(1).tick().await.unwrap();
    assert_eq!(report.proposed, Some(1));
    let outcomes = cluster.deliver_entries().await;
    assert_eq!(outcomes, vec![(1, Outcome::Voting { height: 1, agree: true })]);

    cluster.clock.advance(61);
    let report = cluster.node(1).tick().await.unwrap();
    assert_eq!(report.abandoned, vec![1]);
    assert_eq!(report.proposed, None);
    assert_eq!(cluster.log.leader(), Some(2));
    assert_eq!(cluster.node(1).height().unwrap(), 0);
    assert_eq!(cluster.node(1).metrics().blocks_abandoned.get(), 1);
}

// ---------------------------------------------------------------------------
// Catch-up and recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn follower_catches_up_from_nine_to_eleven() {
    let mut cluster = Cluster::with_members(2, 1);
    for _ in 0..9 {
        cluster.round().await;
    }
    assert_eq!(cluster.node(2).height().unwrap(), 9);

    cluster.log.isolate(2);
    cluster.round().await;
    assert_eq!(cluster.node(1).height().unwrap(), 10);
    assert_eq!(cluster.node(2).height().unwrap(), 9);

    cluster.log.reconnect(2);
    let outcomes = cluster.round().await;
    assert_eq!(
        outcomes,
        vec![
            (1, Outcome::Committed { height: 11 }),
            (2, Outcome::CaughtUp { height: 11 }),
        ]
    );

    let follower = cluster.node(2);
    assert_eq!(follower.height().unwrap(), 11);
    assert_eq!(follower.metrics().catch_up_blocks.get(), 2);
    for h in 10..=11 {
        assert_eq!(
            follower.ledger().block_by_height(h).unwrap(),
            cluster.node(1).ledger().block_by_height(h).unwrap()
        );
    }
}

#[tokio::test]
async fn diverged_follower_rolls_back_and_follows_the_leader() {
    let dumps = tempfile::tempdir().unwrap();
    let mut cluster = Cluster::new();
    cluster.add(config(1, 1, genesis()));
    let mut cfg = config(2, 1, genesis());
    cfg.block_dump_dir = Some(dumps.path().to_path_buf());
    cluster.add(cfg);
    cluster.round().await;
    assert_eq!(cluster.node(2).height().unwrap(), 1);

    // Node 2 commits a block of its own at height 2 while cut off.
    cluster.log.isolate(2);
    let follower = cluster.node(2).clone();
    let rewards = RewardAddresses {
        community: Address::new([71; 32]),
        tech: Address::new([70; 32]),
        marketplace: Address::new([72; 32]),
    };
    let stray = transfer(INITIAL_NONCE);
    let fork = follower
        .ledger()
        .build_block(
            vec![stray.clone()],
            Address::new([70; 32]),
            &rewards,
            Timestamp::new(1_001),
        )
        .unwrap();
    follower.ledger().append(&fork, &fork.miner).unwrap();
    dump::write_block(dumps.path(), &fork).unwrap();

    cluster.round().await;
    cluster.round().await;
    assert_eq!(cluster.node(1).height().unwrap(), 3);
    assert_eq!(follower.height().unwrap(), 2);

    cluster.log.reconnect(2);
    let report = follower.tick().await.unwrap();
    assert_eq!(report.repaired, Some(2));
    assert_eq!(follower.height().unwrap(), 3);
    for h in 1..=3 {
        assert_eq!(
            follower.ledger().block_by_height(h).unwrap(),
            cluster.node(1).ledger().block_by_height(h).unwrap()
        );
    }
    assert!(follower.pool().exists(&stray.hash));

    let metrics = follower.metrics();
    assert_eq!(metrics.forks_repaired.get(), 1);
    assert_eq!(metrics.catch_up_blocks.get(), 2);
    assert_eq!(metrics.committed_height.get(), 3);

    let dumped = dump::read_blocks(dumps.path()).unwrap();
    assert_eq!(dumped.len(), 3);
    assert!(dumped.iter().all(|b| b.hash != fork.hash));

    // Once in step, later checks leave the chain alone.
    cluster.clock.advance(60);
    assert_eq!(follower.tick().await.unwrap().repaired, None);
    assert_eq!(metrics.forks_repaired.get(), 1);
}

#[tokio::test]
async fn replaying_a_block_dump_is_idempotent() {
    let dump = tempfile::tempdir().unwrap();
    let mut cluster = Cluster::new();
    let mut cfg = config(1, 1, genesis());
    cfg.block_dump_dir = Some(dump.path().to_path_buf());
    cluster.add(cfg);

    cluster.node(1).submit(transfer(INITIAL_NONCE)).await.unwrap();
    for _ in 0..3 {
        cluster.round().await;
    }
    assert_eq!(std::fs::read_dir(dump.path()).unwrap().count(), 3);

    let mut fresh = Cluster::new();
    let mut cfg = config(1, 1, genesis());
    cfg.replay_dir = Some(dump.path().to_path_buf());
    let restored = fresh.add(cfg);
    assert_eq!(restored.height().unwrap(), 3);
    assert_eq!(
        restored.ledger().block_by_height(3).unwrap(),
        cluster.node(1).ledger().block_by_height(3).unwrap()
    );
    assert_eq!(
        restored.ledger().balance(&key_addr(2)).unwrap(),
        cluster.node(1).ledger().balance(&key_addr(2)).unwrap()
    );

    assert_eq!(restored.replay_from(dump.path()).unwrap(), 0);
    assert_eq!(restored.height().unwrap(), 3);
}

#[tokio::test]
async fn storage_failure_leaves_the_height_unadvanced() {
    let mut cluster = Cluster::with_members(1, 1);
    let store = cluster.members[0].store.clone();

    store.set_fail_writes(true);
    cluster.node(1).propose().await.unwrap();
    let entry = cluster.members[0].entries.try_recv().unwrap();
    let err = cluster.node(1).handle_entry(&entry).await.unwrap_err();
    assert!(matches!(err, NodeError::Consensus(_)));
    assert_eq!(cluster.node(1).height().unwrap(), 0);

    store.set_fail_writes(false);
    let outcomes = cluster.round().await;
    assert_eq!(outcomes, vec![(1, Outcome::Committed { height: 1 })]);
}

// ---------------------------------------------------------------------------
// Background loops
// ---------------------------------------------------------------------------

#[tokio::test]
async fn started_node_commits_on_its_own() {
    let log = NullLogCluster::new();
    let hub = NullGossipHub::new();
    let (member_log, entries) = log.join(1);
    let (gossip, _gossip_rx) = hub.join(1);
    let parts = NodeParts {
        store: Arc::new(NullStore::new()),
        log: Arc::new(member_log),
        entries: Some(entries),
        gossip: Arc::new(gossip),
        catch_up: Arc::new(NullCatchUp::new()),
        clock: Arc::new(NullClock::new(1_000)),
    };
    let node = Arc::new(MeridianNode::with_parts(config(1, 1, genesis()), parts).unwrap());
    node.submit(transfer(INITIAL_NONCE)).await.unwrap();

    node.start().await.unwrap();
    assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while node.height().unwrap() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    node.stop().await;

    assert!(node.height().unwrap() >= 2);
    assert!(node.pool().is_empty());
    assert!(node.ledger().transaction_by_hash(&transfer(INITIAL_NONCE).hash).unwrap().is_some());
}
