//! RPC error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use meridian_consensus::ConsensusError;
use meridian_ledger::LedgerError;
use meridian_pool::PoolError;
use meridian_types::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rejected: {0}")]
    Rejected(#[from] PoolError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("peer answered {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("server error: {0}")]
    Server(String),
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::Rejected(PoolError::PoolFull) => StatusCode::SERVICE_UNAVAILABLE,
            RpcError::Rejected(PoolError::Ledger(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RpcError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RpcError::Consensus(ConsensusError::NotLeader) => StatusCode::CONFLICT,
            RpcError::Ledger(LedgerError::BlockNotFound(_)) => StatusCode::NOT_FOUND,
            RpcError::UnknownPeer(_) | RpcError::Http(_) | RpcError::Remote { .. } => {
                StatusCode::BAD_GATEWAY
            }
            RpcError::Ledger(_) | RpcError::Consensus(_) | RpcError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<RpcError> for ConsensusError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Consensus(inner) => inner,
            other => ConsensusError::Rpc(other.to_string()),
        }
    }
}
