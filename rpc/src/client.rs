//! Peer client over the node's HTTP routes.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use meridian_consensus::{CatchUpClient, ConsensusError, Gossip};
use meridian_messages::{
    BlockRangeResponse, GossipMessage, HeightResponse, PeerRequest, SubmitResponse,
    TxLookupResponse,
};
use meridian_types::{Block, NodeId, Transaction, TxHash};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ErrorBody;
use crate::RpcError;

/// Known peers by node id, plus one shared HTTP client.
pub struct HttpPeers {
    node_id: NodeId,
    client: Client,
    peers: RwLock<BTreeMap<NodeId, String>>,
}

impl HttpPeers {
    pub fn new(node_id: NodeId, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            node_id,
            client,
            peers: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn insert(&self, id: NodeId, endpoint: impl Into<String>) {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, endpoint);
    }

    pub fn remove(&self, id: NodeId) -> bool {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn endpoint(&self, id: NodeId) -> Result<String, RpcError> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(RpcError::UnknownPeer(id))
    }

    pub fn peers(&self) -> Vec<(NodeId, String)> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, url)| (*id, url.clone()))
            .collect()
    }

    pub async fn height(&self, id: NodeId) -> Result<u64, RpcError> {
        let url = format!("{}/height", self.endpoint(id)?);
        let resp: HeightResponse = fetch(self.client.get(url)).await?;
        Ok(resp.height)
    }

    pub async fn blocks(&self, id: NodeId, lo: u64, hi: u64) -> Result<Vec<Block>, RpcError> {
        let url = format!("{}/blocks", self.endpoint(id)?);
        let resp: BlockRangeResponse =
            fetch(self.client.get(url).query(&[("lo", lo), ("hi", hi)])).await?;
        Ok(resp.blocks)
    }

    /// `None` when the peer has no block at `height`.
    pub async fn block(&self, id: NodeId, height: u64) -> Result<Option<Block>, RpcError> {
        let url = format!("{}/block/{height}", self.endpoint(id)?);
        match fetch(self.client.get(url)).await {
            Ok(block) => Ok(Some(block)),
            Err(RpcError::Remote { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn submit(&self, id: NodeId, tx: &Transaction) -> Result<TxHash, RpcError> {
        let url = format!("{}/tx", self.endpoint(id)?);
        let resp: SubmitResponse = fetch(self.client.post(url).json(tx)).await?;
        Ok(resp.hash)
    }

    pub async fn lookup(
        &self,
        id: NodeId,
        hash: &TxHash,
    ) -> Result<Option<TxLookupResponse>, RpcError> {
        let url = format!("{}/tx/{hash}", self.endpoint(id)?);
        match fetch(self.client.get(url)).await {
            Ok(found) => Ok(Some(found)),
            Err(RpcError::Remote { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ask `leader` to add `peer` to the replicated log.
    pub async fn request_join(&self, leader: NodeId, peer: &PeerRequest) -> Result<(), RpcError> {
        let url = format!("{}/peers/add", self.endpoint(leader)?);
        send(self.client.post(url).json(peer)).await
    }

    pub async fn request_leave(&self, leader: NodeId, peer: &PeerRequest) -> Result<(), RpcError> {
        let url = format!("{}/peers/remove", self.endpoint(leader)?);
        send(self.client.post(url).json(peer)).await
    }
}

async fn checked(request: RequestBuilder) -> Result<reqwest::Response, RpcError> {
    let resp = request.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    Err(RpcError::Remote {
        status: status.as_u16(),
        message,
    })
}

async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RpcError> {
    Ok(checked(request).await?.json::<T>().await?)
}

async fn send(request: RequestBuilder) -> Result<(), RpcError> {
    checked(request).await.map(|_| ())
}

#[async_trait]
impl CatchUpClient for HttpPeers {
    async fn leader_max_height(&self, leader: NodeId) -> Result<u64, ConsensusError> {
        Ok(self.height(leader).await?)
    }

    async fn block_range(
        &self,
        leader: NodeId,
        lo: u64,
        hi: u64,
    ) -> Result<Vec<Block>, ConsensusError> {
        Ok(self.blocks(leader, lo, hi).await?)
    }

    async fn block_by_height(
        &self,
        leader: NodeId,
        height: u64,
    ) -> Result<Option<Block>, ConsensusError> {
        Ok(self.block(leader, height).await?)
    }
}

#[async_trait]
impl Gossip for HttpPeers {
    /// Best effort: unreachable peers are logged and skipped.
    async fn broadcast(&self, message: GossipMessage) -> Result<(), ConsensusError> {
        for (id, endpoint) in self.peers() {
            if id == self.node_id {
                continue;
            }
            let url = format!("{endpoint}/gossip");
            if let Err(e) = send(self.client.post(url).json(&message)).await {
                debug!(peer = id, kind = message.kind(), error = %e, "gossip delivery failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_normalised() {
        let peers = HttpPeers::new(1, Duration::from_secs(1)).unwrap();
        peers.insert(2, "http://10.0.0.2:7070/");
        assert_eq!(peers.endpoint(2).unwrap(), "http://10.0.0.2:7070");
        assert!(matches!(peers.endpoint(3), Err(RpcError::UnknownPeer(3))));
        assert!(peers.remove(2));
        assert!(peers.peers().is_empty());
    }
}
