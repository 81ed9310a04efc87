//! Axum router and server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use meridian_consensus::CatchUpService;
use meridian_ledger::Ledger;
use meridian_messages::{
    BlockRangeRequest, BlockRangeResponse, GossipMessage, HeightResponse, PeerRequest,
    SubmitResponse, TxLookupResponse, TxStatus,
};
use meridian_pool::{PoolError, TxPool};
use meridian_types::{Block, Transaction, TxHash};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::client::HttpPeers;
use crate::RpcError;

/// Work handed from the handlers to the node.
#[derive(Debug)]
pub enum Inbound {
    /// A message gossiped by a peer.
    Gossip(GossipMessage),
    /// A client submission. The node admits it, gossips it on, and answers.
    Submit {
        tx: Transaction,
        reply: oneshot::Sender<Result<TxHash, PoolError>>,
    },
}

/// Everything the handlers reach into.
#[derive(Clone)]
pub struct RpcState {
    pub ledger: Arc<Ledger>,
    pub pool: Arc<TxPool>,
    pub catch_up: CatchUpService,
    pub peers: Arc<HttpPeers>,
    pub registry: Registry,
    /// Gossip and submissions, drained by the node.
    pub inbound: UnboundedSender<Inbound>,
}

pub fn router(state: RpcState) -> Router {
    Router::new()
        .route("/height", get(height))
        .route("/blocks", get(blocks))
        .route("/block/:height", get(block))
        .route("/peers/add", post(add_peer))
        .route("/peers/remove", post(remove_peer))
        .route("/gossip", post(gossip))
        .route("/tx", post(submit_tx))
        .route("/tx/:hash", get(lookup_tx))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn height(State(state): State<RpcState>) -> Result<Json<HeightResponse>, RpcError> {
    let height = state.catch_up.leader_max_height()?;
    Ok(Json(HeightResponse { height }))
}

async fn blocks(
    State(state): State<RpcState>,
    Query(range): Query<BlockRangeRequest>,
) -> Result<Json<BlockRangeResponse>, RpcError> {
    if range.lo > range.hi {
        return Err(RpcError::InvalidRequest(format!(
            "empty range {}..={}",
            range.lo, range.hi
        )));
    }
    let blocks = state.catch_up.block_range(range.lo, range.hi)?;
    Ok(Json(BlockRangeResponse { blocks }))
}

async fn block(
    State(state): State<RpcState>,
    Path(height): Path<u64>,
) -> Result<Json<Block>, RpcError> {
    state
        .catch_up
        .block_by_height(height)?
        .map(Json)
        .ok_or_else(|| RpcError::NotFound(format!("block {height}")))
}

async fn add_peer(
    State(state): State<RpcState>,
    Json(req): Json<PeerRequest>,
) -> Result<StatusCode, RpcError> {
    if req.endpoint.is_empty() {
        return Err(RpcError::InvalidRequest("peer endpoint is required".into()));
    }
    state
        .catch_up
        .add_peer(req.node_id, req.endpoint.clone())
        .await?;
    state.peers.insert(req.node_id, req.endpoint);
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_peer(
    State(state): State<RpcState>,
    Json(req): Json<PeerRequest>,
) -> Result<StatusCode, RpcError> {
    state.catch_up.remove_peer(req.node_id).await?;
    state.peers.remove(req.node_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn gossip(
    State(state): State<RpcState>,
    Json(message): Json<GossipMessage>,
) -> Result<StatusCode, RpcError> {
    debug!(kind = message.kind(), "gossip received");
    state
        .inbound
        .send(Inbound::Gossip(message))
        .map_err(|_| RpcError::Server("node is shutting down".into()))?;
    Ok(StatusCode::ACCEPTED)
}

async fn submit_tx(
    State(state): State<RpcState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<SubmitResponse>, RpcError> {
    let (reply, answer) = oneshot::channel();
    state
        .inbound
        .send(Inbound::Submit { tx, reply })
        .map_err(|_| RpcError::Server("node is shutting down".into()))?;
    let hash = answer
        .await
        .map_err(|_| RpcError::Server("submission dropped by the node".into()))??;
    Ok(Json(SubmitResponse { hash }))
}

async fn lookup_tx(
    State(state): State<RpcState>,
    Path(hash): Path<String>,
) -> Result<Json<TxLookupResponse>, RpcError> {
    let hash = TxHash::from_hex(&hash).map_err(|e| RpcError::InvalidRequest(e.to_string()))?;
    if let Some(transaction) = state.pool.get(&hash) {
        return Ok(Json(TxLookupResponse {
            transaction,
            status: TxStatus::Pending,
        }));
    }
    match state.ledger.transaction_by_hash(&hash)? {
        Some((transaction, location)) => Ok(Json(TxLookupResponse {
            transaction,
            status: TxStatus::Committed {
                height: location.height,
                index: location.index,
            },
        })),
        None => Err(RpcError::NotFound(format!("transaction {hash}"))),
    }
}

async fn metrics(State(state): State<RpcState>) -> Result<impl IntoResponse, RpcError> {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut body)
        .map_err(|e| RpcError::Server(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        body,
    ))
}

/// A bound listener waiting to serve.
pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {addr}: {e}")))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RpcError> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Server(e.to_string()))
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve(
        self,
        state: RpcState,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), RpcError> {
        info!(addr = ?self.listener.local_addr().ok(), "rpc server listening");
        axum::serve(self.listener, router(state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
