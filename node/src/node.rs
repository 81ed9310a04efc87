//! The Meridian node: wires the ledger, pool and coordinator to their
//! collaborators and runs the background loops.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use meridian_consensus::{
    replay_blocks, CatchUpClient, CatchUpService, Clock, Collaborators, Coordinator, Gossip,
    Outcome, ReplicatedLog, SystemClock, TickReport,
};
use meridian_ledger::{ChainLedger, Ledger};
use meridian_messages::GossipMessage;
use meridian_pool::{PoolError, TxPool};
use meridian_rpc::{HttpPeers, Inbound, RpcServer, RpcState};
use meridian_store::KvStore;
use meridian_store_lmdb::LmdbStore;
use meridian_types::{Timestamp, Transaction, TxHash};
use meridian_utils::format_duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::dump;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;
use crate::shutdown::ShutdownController;
use crate::single_log::SingleNodeLog;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The collaborators a node runs against. Production wiring comes from
/// [`MeridianNode::open`]; tests supply in-memory ones.
pub struct NodeParts {
    pub store: Arc<dyn KvStore>,
    pub log: Arc<dyn ReplicatedLog>,
    /// The log's apply channel. When absent, entries are fed through
    /// [`MeridianNode::handle_entry`] by the caller.
    pub entries: Option<UnboundedReceiver<Vec<u8>>>,
    pub gossip: Arc<dyn Gossip>,
    pub catch_up: Arc<dyn CatchUpClient>,
    pub clock: Arc<dyn Clock>,
}

pub struct MeridianNode {
    config: NodeConfig,
    ledger: Arc<Ledger>,
    pool: Arc<TxPool>,
    coordinator: Coordinator,
    metrics: Arc<NodeMetrics>,
    log: Arc<dyn ReplicatedLog>,
    gossip: Arc<dyn Gossip>,
    clock: Arc<dyn Clock>,
    http: Option<Arc<HttpPeers>>,
    entries: Mutex<Option<UnboundedReceiver<Vec<u8>>>>,
    shutdown: ShutdownController,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started_at: Timestamp,
}

impl MeridianNode {
    /// Production wiring: LMDB storage, a single-member log, HTTP peers for
    /// gossip and catch-up, and the wall clock.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let store = Arc::new(LmdbStore::open(&config.data_dir, config.map_size)?);
        let node_id = config.consensus.node_id;
        let (log, entries) = SingleNodeLog::new(node_id);

        let timeout = Duration::from_secs(config.consensus.catch_up_timeout_secs.max(1));
        let http = Arc::new(HttpPeers::new(node_id, timeout)?);
        for peer in &config.peers {
            http.insert(peer.id, peer.endpoint.clone());
        }

        let parts = NodeParts {
            store,
            log: Arc::new(log),
            entries: Some(entries),
            gossip: http.clone(),
            catch_up: http.clone(),
            clock: Arc::new(SystemClock),
        };
        let mut node = Self::with_parts(config, parts)?;
        node.http = Some(http);
        Ok(node)
    }

    /// Build a node over the given collaborators: apply genesis to an empty
    /// ledger, then replay any configured block dump.
    pub fn with_parts(config: NodeConfig, parts: NodeParts) -> Result<Self, NodeError> {
        config.validate()?;

        let ledger = Arc::new(Ledger::new(parts.store, config.chain.clone()));
        let allocations = config.genesis_allocations();
        if ledger.apply_genesis(&allocations)? {
            info!(accounts = allocations.len(), "genesis applied");
        }

        let pool = Arc::new(TxPool::new(config.pool.clone()));
        let coordinator = Coordinator::new(
            config.consensus.clone(),
            ledger.clone(),
            pool.clone(),
            Collaborators {
                log: parts.log.clone(),
                gossip: parts.gossip.clone(),
                catch_up: parts.catch_up,
                clock: parts.clock.clone(),
            },
        );

        let node = Self {
            started_at: parts.clock.now(),
            config,
            ledger,
            pool,
            coordinator,
            metrics: Arc::new(NodeMetrics::new()),
            log: parts.log,
            gossip: parts.gossip,
            clock: parts.clock,
            http: None,
            entries: Mutex::new(parts.entries),
            shutdown: ShutdownController::new(),
            tasks: Mutex::new(Vec::new()),
        };

        if let Some(dir) = node.config.replay_dir.clone() {
            node.replay_from(&dir)?;
        }
        node.refresh_gauges()?;
        info!(
            node_id = node.config.consensus.node_id,
            height = node.ledger.height()?,
            committee = node.config.consensus.committee_size,
            "node ready"
        );
        Ok(node)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn pool(&self) -> &Arc<TxPool> {
        &self.pool
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn height(&self) -> Result<u64, NodeError> {
        Ok(self.ledger.height()?)
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Admit a locally submitted transaction and gossip it to the committee.
    pub async fn submit(&self, tx: Transaction) -> Result<TxHash, NodeError> {
        Ok(self.intake(tx).await?)
    }

    async fn intake(&self, tx: Transaction) -> Result<TxHash, PoolError> {
        let hash = self.admit(tx.clone())?;
        if let Err(e) = self.gossip.broadcast(GossipMessage::Transaction(tx)).await {
            warn!(%hash, error = %e, "transaction gossip failed");
        }
        Ok(hash)
    }

    fn admit(&self, tx: Transaction) -> Result<TxHash, PoolError> {
        self.metrics.transactions_received.inc();
        let result = self.pool.admit(tx, &*self.ledger, self.clock.now());
        self.metrics.pool_size.set(self.pool.len() as i64);
        if result.is_err() {
            self.metrics.transactions_rejected.inc();
        }
        result
    }

    /// Handle work arriving over HTTP.
    pub async fn handle_inbound(&self, inbound: Inbound) -> Result<(), NodeError> {
        match inbound {
            Inbound::Gossip(message) => {
                self.handle_gossip(message).await?;
            }
            Inbound::Submit { tx, reply } => {
                let result = self.intake(tx).await;
                if reply.send(result).is_err() {
                    debug!("submitter went away before the answer");
                }
            }
        }
        Ok(())
    }

    /// Handle a message gossiped by another member.
    pub async fn handle_gossip(
        &self,
        message: GossipMessage,
    ) -> Result<Option<Outcome>, NodeError> {
        match message {
            GossipMessage::Transaction(tx) => {
                let hash = self.admit(tx)?;
                debug!(%hash, "gossiped transaction admitted");
                Ok(None)
            }
            GossipMessage::Vote(vote) => {
                self.metrics.votes_received.inc();
                let before = self.ledger.height()?;
                let outcome = self.coordinator.on_vote(vote.into()).await?;
                if let Some(outcome) = outcome {
                    self.observe(outcome, before)?;
                }
                Ok(outcome)
            }
        }
    }

    /// Handle an entry delivered by the replicated log.
    pub async fn handle_entry(&self, entry: &[u8]) -> Result<Outcome, NodeError> {
        let before = self.ledger.height()?;
        let outcome = self.coordinator.on_replicated_entry(entry).await?;
        self.observe(outcome, before)?;
        Ok(outcome)
    }

    /// Propose the next block if this node leads.
    pub async fn propose(&self) -> Result<Option<u64>, NodeError> {
        Ok(self.coordinator.propose().await?)
    }

    pub async fn tick(&self) -> Result<TickReport, NodeError> {
        let report = self.coordinator.tick().await?;
        self.metrics
            .blocks_abandoned
            .inc_by(report.abandoned.len() as u64);
        if let Some(from) = report.repaired {
            self.after_rollback(from)?;
        }
        self.refresh_gauges()?;
        Ok(report)
    }

    /// Account for blocks replaced by the leader's chain from `from` up.
    fn after_rollback(&self, from: u64) -> Result<(), NodeError> {
        self.metrics.forks_repaired.inc();
        let height = self.ledger.height()?;
        self.metrics
            .catch_up_blocks
            .inc_by(height.saturating_sub(from - 1));
        if let Some(dir) = &self.config.block_dump_dir {
            dump::remove_from(dir, from)?;
            for block in self.ledger.get_block_section(from, height)? {
                dump::write_block(dir, &block)?;
            }
        }
        Ok(())
    }

    /// Re-commit blocks dumped in `dir`. Already-applied heights are skipped.
    pub fn replay_from(&self, dir: &Path) -> Result<u64, NodeError> {
        let blocks = dump::read_blocks(dir)?;
        if blocks.is_empty() {
            return Ok(0);
        }
        let applied = replay_blocks(&*self.ledger, blocks)?;
        info!(dir = %dir.display(), applied, "block dump replayed");
        self.refresh_gauges()?;
        Ok(applied)
    }

    /// Update metrics and the block dump for whatever an outcome changed.
    fn observe(&self, outcome: Outcome, before: u64) -> Result<(), NodeError> {
        let after = self.ledger.height()?;
        match outcome {
            Outcome::Committed { height } => {
                self.metrics.blocks_committed.inc();
                if let Some(block) = self.ledger.block_by_height(height)? {
                    self.metrics
                        .block_transactions
                        .observe(block.transactions.len() as f64);
                }
            }
            Outcome::Abandoned { .. } => self.metrics.blocks_abandoned.inc(),
            _ => {}
        }
        let voted = u64::from(matches!(outcome, Outcome::Committed { .. }));
        let recovered = after.saturating_sub(before).saturating_sub(voted);
        if recovered > 0 {
            self.metrics.catch_up_blocks.inc_by(recovered);
        }

        if let Some(dir) = &self.config.block_dump_dir {
            for height in before + 1..=after {
                if let Some(block) = self.ledger.block_by_height(height)? {
                    dump::write_block(dir, &block)?;
                }
            }
        }
        self.refresh_gauges()
    }

    fn refresh_gauges(&self) -> Result<(), NodeError> {
        self.metrics
            .committed_height
            .set(self.ledger.height()? as i64);
        self.metrics.pool_size.set(self.pool.len() as i64);
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Spawn the tick loop, the apply loop and, for HTTP-wired nodes, the
    /// RPC server with its gossip intake.
    pub async fn start(self: &Arc<Self>) -> Result<(), NodeError> {
        if !self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
        {
            return Err(NodeError::AlreadyStarted);
        }
        let server = match &self.http {
            Some(_) => {
                let addr: SocketAddr =
                    format!("{}:{}", self.config.rpc_host, self.config.rpc_port)
                        .parse()
                        .map_err(|e| NodeError::Config(format!("rpc address: {e}")))?;
                Some(RpcServer::bind(addr).await?)
            }
            None => None,
        };
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut handles = Vec::new();

        // ── Tick loop ───────────────────────────────────────────────────
        let node = Arc::clone(self);
        let mut stop = self.shutdown.subscribe();
        let period = Duration::from_millis(self.config.tick_interval_ms);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.recv() => {
                        info!("tick loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = node.tick().await {
                            warn!(error = %e, "tick failed");
                        }
                    }
                }
            }
        }));

        // ── Apply loop ──────────────────────────────────────────────────
        if let Some(mut entries) = entries {
            let node = Arc::clone(self);
            let mut stop = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = stop.recv() => {
                            info!("apply loop shutting down");
                            break;
                        }
                        entry = entries.recv() => {
                            let Some(entry) = entry else {
                                info!("apply channel closed");
                                break;
                            };
                            match node.handle_entry(&entry).await {
                                Ok(outcome) => debug!(?outcome, "entry handled"),
                                Err(e) => warn!(error = %e, "entry failed"),
                            }
                        }
                    }
                }
            }));
        }

        // ── RPC server and inbound intake ───────────────────────────────
        if let (Some(server), Some(http)) = (server, &self.http) {
            let (inbound_tx, mut inbound) = unbounded_channel();
            let state = RpcState {
                ledger: self.ledger.clone(),
                pool: self.pool.clone(),
                catch_up: CatchUpService::new(
                    self.ledger.clone() as Arc<dyn ChainLedger>,
                    self.log.clone(),
                ),
                peers: http.clone(),
                registry: self.metrics.registry.clone(),
                inbound: inbound_tx,
            };
            let mut stop = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                let shutdown = async move {
                    let _ = stop.recv().await;
                };
                if let Err(e) = server.serve(state, shutdown).await {
                    warn!(error = %e, "RPC server exited with an error");
                }
            }));

            let node = Arc::clone(self);
            let mut stop = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = stop.recv() => break,
                        work = inbound.recv() => {
                            let Some(work) = work else { break };
                            if let Err(e) = node.handle_inbound(work).await {
                                debug!(error = %e, "inbound message not applied");
                            }
                        }
                    }
                }
            }));
        }

        info!(tasks = handles.len(), "node started");
        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) = handles;
        Ok(())
    }

    /// Signal every task and wait for them, bounded by [`SHUTDOWN_TIMEOUT`].
    pub async fn stop(&self) {
        self.shutdown.shutdown();
        let handles: Vec<_> = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!("background task did not stop in time");
            }
        }
        let uptime = self.started_at.elapsed_since(self.clock.now());
        info!(uptime = %format_duration(uptime), "node stopped");
    }

    /// Start, run until SIGINT/SIGTERM, then stop.
    pub async fn run(self: Arc<Self>) -> Result<(), NodeError> {
        self.start().await?;
        self.shutdown.wait_for_signal().await;
        self.stop().await;
        Ok(())
    }

    pub fn shutdown_handle(&self) -> &ShutdownController {
        &self.shutdown
    }
}
