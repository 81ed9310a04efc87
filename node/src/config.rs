//! Node configuration with TOML file support.

use std::path::{Path, PathBuf};

use meridian_consensus::CoordinatorConfig;
use meridian_pool::PoolConfig;
use meridian_types::{Address, ChainParams, NodeId};
use meridian_utils::LogFormat;
use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Configuration for a Meridian node.
///
/// Loaded from TOML via [`NodeConfig::from_toml_file`] or built
/// programmatically in tests. Every field has a default, so a partial file
/// only names what it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// LMDB environment directory.
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    pub map_size: usize,

    pub rpc_host: String,
    pub rpc_port: u16,

    /// Period of the coordinator tick (timeouts, vote resends, proposals).
    pub tick_interval_ms: u64,

    /// Committed blocks are written here as JSON, one file per height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_dump_dir: Option<PathBuf>,

    /// Blocks found here are re-committed at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_dir: Option<PathBuf>,

    /// Other committee members reachable over HTTP.
    pub peers: Vec<PeerConfig>,

    /// Initial balances, applied once to an empty ledger.
    pub genesis: Vec<GenesisAllocation>,

    pub chain: ChainParams,
    pub pool: PoolConfig,
    pub consensus: CoordinatorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: NodeId,
    pub endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: Address,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. `"info"` or `"info,meridian_consensus=debug"`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Human,
            level: "info".to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./meridian_data"),
            map_size: 1 << 30,
            rpc_host: "127.0.0.1".to_string(),
            rpc_port: 7070,
            tick_interval_ms: 1_000,
            block_dump_dir: None,
            replay_dir: None,
            peers: Vec::new(),
            genesis: Vec::new(),
            chain: ChainParams::default(),
            pool: PoolConfig::default(),
            consensus: CoordinatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.consensus
            .validate()
            .map_err(|e| NodeError::Config(e.to_string()))?;
        if self.tick_interval_ms == 0 {
            return Err(NodeError::Config("tick_interval_ms must be positive".into()));
        }
        if self.pool.capacity == 0 || self.pool.batch_cap == 0 {
            return Err(NodeError::Config(
                "pool capacity and batch_cap must be positive".into(),
            ));
        }
        if let Some(zero) = self.genesis.iter().find(|g| g.address.is_zero()) {
            return Err(NodeError::Config(format!(
                "genesis allocation of {} to the zero address",
                zero.amount
            )));
        }
        if self.peers.iter().any(|p| p.id == self.consensus.node_id) {
            return Err(NodeError::Config(format!(
                "peer list contains this node's own id {}",
                self.consensus.node_id
            )));
        }
        Ok(())
    }

    pub fn genesis_allocations(&self) -> Vec<(Address, u64)> {
        self.genesis.iter().map(|g| (g.address, g.amount)).collect()
    }
}
