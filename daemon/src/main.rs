//! Meridian daemon: entry point for running a committee member.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use meridian_node::{MeridianNode, NodeConfig, PeerConfig};
use meridian_types::{Address, NodeId};
use meridian_utils::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "meridian-daemon", about = "Meridian permissioned chain node")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// flags and env vars given here override them.
    #[arg(long, env = "MERIDIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the LMDB ledger.
    #[arg(long, env = "MERIDIAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// This node's id within the committee.
    #[arg(long, env = "MERIDIAN_NODE_ID")]
    node_id: Option<NodeId>,

    /// Number of voting committee members.
    #[arg(long, env = "MERIDIAN_COMMITTEE_SIZE")]
    committee_size: Option<usize>,

    /// Address recorded as block miner (`mrd_...`).
    #[arg(long, env = "MERIDIAN_MINER")]
    miner: Option<Address>,

    #[arg(long, env = "MERIDIAN_RPC_HOST")]
    rpc_host: Option<String>,

    #[arg(long, env = "MERIDIAN_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Peers as `id=url`, comma-separated: "2=http://10.0.0.2:7070,3=http://10.0.0.3:7070".
    #[arg(long, env = "MERIDIAN_PEERS", value_delimiter = ',', value_parser = parse_peer)]
    peers: Vec<PeerConfig>,

    /// Re-commit dumped blocks from this directory at startup.
    #[arg(long, env = "MERIDIAN_REPLAY_DIR")]
    replay_dir: Option<PathBuf>,

    /// Write each committed block into this directory.
    #[arg(long, env = "MERIDIAN_BLOCK_DUMP_DIR")]
    block_dump_dir: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, env = "MERIDIAN_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log filter, e.g. "info" or "info,meridian_consensus=debug".
    #[arg(long, env = "MERIDIAN_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node lifecycle.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Print the effective configuration as TOML and exit.
    Config,
    /// Generate a fresh key pair and print its address.
    Keygen,
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT or SIGTERM.
    Run,
}

fn parse_peer(s: &str) -> Result<PeerConfig, String> {
    let (id, endpoint) = s
        .split_once('=')
        .ok_or_else(|| format!("expected id=url, got {s:?}"))?;
    let id = id
        .trim()
        .parse()
        .map_err(|e| format!("bad peer id {id:?}: {e}"))?;
    Ok(PeerConfig {
        id,
        endpoint: endpoint.trim().to_string(),
    })
}

impl Cli {
    /// File config (or defaults) with flag and env overrides applied.
    fn resolve(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(id) = self.node_id {
            config.consensus.node_id = id;
        }
        if let Some(n) = self.committee_size {
            config.consensus.committee_size = n;
        }
        if let Some(miner) = self.miner {
            config.consensus.miner = miner;
        }
        if let Some(host) = &self.rpc_host {
            config.rpc_host = host.clone();
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if !self.peers.is_empty() {
            config.peers = self.peers.clone();
        }
        if self.replay_dir.is_some() {
            config.replay_dir = self.replay_dir.clone();
        }
        if self.block_dump_dir.is_some() {
            config.block_dump_dir = self.block_dump_dir.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve()?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Keygen => {
            let keys = meridian_crypto::generate_keypair()?;
            println!("address: {}", Address::from_public_key(&keys.public));
            println!("private: {}", hex::encode(keys.private.0));
        }
        Command::Node {
            action: NodeAction::Run,
        } => {
            init_logging(config.logging.format, &config.logging.level)?;
            tracing::info!(
                node_id = config.consensus.node_id,
                committee = config.consensus.committee_size,
                rpc = %format!("{}:{}", config.rpc_host, config.rpc_port),
                peers = config.peers.len(),
                data_dir = %config.data_dir.display(),
                "starting Meridian node"
            );

            let node = Arc::new(MeridianNode::open(config).context("opening node")?);
            node.run().await?;
            tracing::info!("Meridian daemon exited cleanly");
        }
    }

    Ok(())
}
