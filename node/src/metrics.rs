//! Prometheus metrics for the Meridian node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`] that the RPC `/metrics`
//! endpoint encodes into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub blocks_committed: IntCounter,
    pub blocks_abandoned: IntCounter,
    /// Blocks applied through catch-up rather than a voted round.
    pub catch_up_blocks: IntCounter,
    /// Times this node rolled back blocks to follow the leader's chain.
    pub forks_repaired: IntCounter,
    pub votes_received: IntCounter,
    pub transactions_received: IntCounter,
    pub transactions_rejected: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub committed_height: IntGauge,
    pub pool_size: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Transactions per committed block.
    pub block_transactions: Histogram,
}

impl NodeMetrics {
    /// Register every metric in a fresh [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let blocks_committed = register_int_counter_with_registry!(
            Opts::new(
                "meridian_blocks_committed_total",
                "Blocks committed through a voted round"
            ),
            registry
        )
        .expect("failed to register blocks_committed counter");

        let blocks_abandoned = register_int_counter_with_registry!(
            Opts::new(
                "meridian_blocks_abandoned_total",
                "Rounds abandoned by dissent or timeout"
            ),
            registry
        )
        .expect("failed to register blocks_abandoned counter");

        let catch_up_blocks = register_int_counter_with_registry!(
            Opts::new(
                "meridian_catch_up_blocks_total",
                "Blocks recovered from the leader during catch-up"
            ),
            registry
        )
        .expect("failed to register catch_up_blocks counter");

        let forks_repaired = register_int_counter_with_registry!(
            Opts::new(
                "meridian_forks_repaired_total",
                "Rollbacks onto the leader's chain"
            ),
            registry
        )
        .expect("failed to register forks_repaired counter");

        let votes_received = register_int_counter_with_registry!(
            Opts::new("meridian_votes_received_total", "Votes received by gossip"),
            registry
        )
        .expect("failed to register votes_received counter");

        let transactions_received = register_int_counter_with_registry!(
            Opts::new(
                "meridian_transactions_received_total",
                "Transactions submitted or gossiped to this node"
            ),
            registry
        )
        .expect("failed to register transactions_received counter");

        let transactions_rejected = register_int_counter_with_registry!(
            Opts::new(
                "meridian_transactions_rejected_total",
                "Transactions refused by pool admission"
            ),
            registry
        )
        .expect("failed to register transactions_rejected counter");

        let committed_height = register_int_gauge_with_registry!(
            Opts::new("meridian_committed_height", "Height of the committed tip"),
            registry
        )
        .expect("failed to register committed_height gauge");

        let pool_size = register_int_gauge_with_registry!(
            Opts::new("meridian_pool_size", "Pending transactions in the pool"),
            registry
        )
        .expect("failed to register pool_size gauge");

        let block_transactions = register_histogram_with_registry!(
            HistogramOpts::new(
                "meridian_block_transactions",
                "Transactions per committed block, coinbase included"
            )
            .buckets(vec![1.0, 4.0, 16.0, 64.0, 128.0, 256.0, 512.0]),
            registry
        )
        .expect("failed to register block_transactions histogram");

        Self {
            registry,
            blocks_committed,
            blocks_abandoned,
            catch_up_blocks,
            forks_repaired,
            votes_received,
            transactions_received,
            transactions_rejected,
            committed_height,
            pool_size,
            block_transactions,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn metrics_render_under_their_names() {
        let metrics = NodeMetrics::new();
        metrics.blocks_committed.inc();
        metrics.committed_height.set(42);

        let mut out = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("meridian_blocks_committed_total 1"));
        assert!(text.contains("meridian_committed_height 42"));
        assert!(text.contains("meridian_pool_size 0"));
    }
}
