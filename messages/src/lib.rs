//! Wire payloads exchanged between Meridian nodes.
//!
//! Everything here travels as JSON: proposals through the replicated log,
//! gossip and catch-up over HTTP.

use meridian_pool::VoteRecord;
use meridian_types::{Block, NodeId, ResultHash, Transaction, TxHash};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for MessageError {
    fn from(e: serde_json::Error) -> Self {
        MessageError::Codec(e.to_string())
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MessageError> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MessageError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// The payload a leader appends to the replicated log: a candidate block
/// and the state commitment it produces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalEntry {
    pub block: Block,
    pub result_hash: ResultHash,
}

impl ProposalEntry {
    pub fn height(&self) -> u64 {
        self.block.height
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        decode(bytes)
    }
}

/// A committee member's verdict on a proposal, as gossiped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub voter: NodeId,
    pub height: u64,
    pub result_hash: ResultHash,
    pub agree: bool,
}

impl From<VoteRecord> for VoteMessage {
    fn from(r: VoteRecord) -> Self {
        Self {
            voter: r.voter,
            height: r.height,
            result_hash: r.result_hash,
            agree: r.agree,
        }
    }
}

impl From<VoteMessage> for VoteRecord {
    fn from(m: VoteMessage) -> Self {
        Self {
            voter: m.voter,
            height: m.height,
            result_hash: m.result_hash,
            agree: m.agree,
        }
    }
}

/// Everything a node broadcasts to its peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GossipMessage {
    Transaction(Transaction),
    Vote(VoteMessage),
}

impl GossipMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            GossipMessage::Transaction(_) => "transaction",
            GossipMessage::Vote(_) => "vote",
        }
    }
}

// ── Catch-up RPC ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightResponse {
    pub height: u64,
}

/// Inclusive height range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRangeRequest {
    pub lo: u64,
    pub hi: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRangeResponse {
    pub blocks: Vec<Block>,
}

// ── Membership and submission ─────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequest {
    pub node_id: NodeId,
    /// Base URL of the peer's RPC endpoint. Ignored on removal.
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub hash: TxHash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Committed { height: u64, index: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLookupResponse {
    pub transaction: Transaction,
    #[serde(flatten)]
    pub status: TxStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_crypto::{keypair_from_seed, sign_transaction};
    use meridian_types::{Address, Timestamp, TxKind};

    fn sample_tx() -> Transaction {
        let keys = keypair_from_seed(&[3; 32]);
        let mut tx = Transaction::new(
            TxKind::plain_transfer(),
            1,
            Address::from_public_key(&keys.public),
            Address::new([9; 32]),
            750_000,
            Timestamp::new(42),
        );
        sign_transaction(&mut tx, &keys);
        tx
    }

    #[test]
    fn gossip_is_tagged_json() {
        let vote = GossipMessage::Vote(VoteMessage {
            voter: 2,
            height: 8,
            result_hash: ResultHash::new([1; 32]),
            agree: false,
        });
        let json: serde_json::Value = serde_json::to_value(&vote).unwrap();
        assert_eq!(json["type"], "vote");
        assert_eq!(json["payload"]["height"], 8);
        assert_eq!(decode::<GossipMessage>(&encode(&vote).unwrap()).unwrap(), vote);

        let tx = GossipMessage::Transaction(sample_tx());
        assert_eq!(tx.kind(), "transaction");
        assert_eq!(decode::<GossipMessage>(&encode(&tx).unwrap()).unwrap(), tx);
    }

    #[test]
    fn proposal_survives_the_log() {
        let block = Block {
            height: 3,
            prev_hash: Default::default(),
            hash: Default::default(),
            transactions: vec![sample_tx()],
            merkle_root: Default::default(),
            version: 1,
            timestamp: Timestamp::new(50),
            miner: Address::new([7; 32]),
        };
        let entry = ProposalEntry {
            block,
            result_hash: ResultHash::new([5; 32]),
        };
        let back = ProposalEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.height(), 3);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(
            ProposalEntry::decode(b"{not json"),
            Err(MessageError::Codec(_))
        ));
    }

    #[test]
    fn lookup_flattens_status() {
        let resp = TxLookupResponse {
            transaction: sample_tx(),
            status: TxStatus::Committed {
                height: 4,
                index: 1,
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "committed");
        assert_eq!(json["height"], 4);
    }

    #[test]
    fn votes_convert_to_records() {
        let msg = VoteMessage {
            voter: 1,
            height: 2,
            result_hash: ResultHash::new([3; 32]),
            agree: true,
        };
        let record: VoteRecord = msg.into();
        assert_eq!(VoteMessage::from(record), msg);
    }
}
