//! Transactions and marketplace orders.

use serde::{Deserialize, Serialize};

use crate::{Address, OrderHash, Signature, Timestamp, TxHash};

/// Nonce of an account that has never sent a transaction.
pub const INITIAL_NONCE: u64 = 1;

/// What a transaction does. Matched exhaustively by the ledger and the pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    /// Move `amount` from `from` to `to`. A script makes it a token
    /// transaction; an order routes part of the block reward.
    Transfer {
        script: Option<String>,
        order: Option<Order>,
    },
    /// Reward minted by the block producer. `from` is the nil address.
    Coinbase,
    /// Admin locks `amount` of `to`'s available balance.
    Freeze,
    /// Admin releases `amount` of `to`'s frozen balance.
    Unfreeze,
    /// Lock `amount` kto into dkto and credit `pck`.
    ConvertToPck { pck: u64 },
    /// Debit `pck` and release `amount` dkto back into the balance.
    ConvertToKto { pck: u64 },
}

impl TxKind {
    pub fn name(&self) -> &'static str {
        match self {
            TxKind::Transfer { script: Some(_), .. } => "token",
            TxKind::Transfer { .. } => "transfer",
            TxKind::Coinbase => "coinbase",
            TxKind::Freeze => "freeze",
            TxKind::Unfreeze => "unfreeze",
            TxKind::ConvertToPck { .. } => "convert_pck",
            TxKind::ConvertToKto { .. } => "convert_kto",
        }
    }

    pub fn plain_transfer() -> Self {
        TxKind::Transfer {
            script: None,
            order: None,
        }
    }
}

/// A balance-affecting transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: u64,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub fee: u64,
    pub time: Timestamp,
    pub hash: TxHash,
    /// Absent on coinbase and conversion transactions.
    pub signature: Option<Signature>,
    pub kind: TxKind,
}

impl Transaction {
    /// An unsealed transaction: no hash, no signature, no fee.
    pub fn new(
        kind: TxKind,
        nonce: u64,
        from: Address,
        to: Address,
        amount: u64,
        time: Timestamp,
    ) -> Self {
        Self {
            nonce,
            from,
            to,
            amount,
            fee: 0,
            time,
            hash: TxHash::ZERO,
            signature: None,
            kind,
        }
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Bytes the transaction hash is computed over:
    /// `nonce_be ‖ amount_be ‖ from ‖ to ‖ time_be`.
    pub fn preimage(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 32 + 32 + 8);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.amount.to_be_bytes());
        buf.extend_from_slice(self.from.as_bytes());
        buf.extend_from_slice(self.to.as_bytes());
        buf.extend_from_slice(&self.time.as_secs().to_be_bytes());
        buf
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.kind, TxKind::Coinbase) && self.from.is_zero()
    }

    pub fn is_conversion(&self) -> bool {
        matches!(
            self.kind,
            TxKind::ConvertToPck { .. } | TxKind::ConvertToKto { .. }
        )
    }

    pub fn script(&self) -> Option<&str> {
        match &self.kind {
            TxKind::Transfer { script, .. } => script.as_deref(),
            _ => None,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        match &self.kind {
            TxKind::Transfer { order, .. } => order.as_ref(),
            _ => None,
        }
    }

    pub fn is_token(&self) -> bool {
        self.script().is_some()
    }

    /// Account whose nonce sequence this transaction belongs to.
    ///
    /// Coinbase transactions have no sender; they are keyed by recipient.
    pub fn sender(&self) -> Address {
        if self.is_coinbase() {
            self.to
        } else {
            self.from
        }
    }
}

/// A marketplace order attached to a transfer.
///
/// A valid order routes part of the block reward to `beneficiary`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub beneficiary: Address,
    pub price: u64,
    pub trade_name: String,
    pub region: String,
    pub hash: OrderHash,
    /// Signature over `hash` by the marketplace key.
    pub signature: Option<Signature>,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        beneficiary: Address,
        price: u64,
        trade_name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            beneficiary,
            price,
            trade_name: trade_name.into(),
            region: region.into(),
            hash: OrderHash::ZERO,
            signature: None,
        }
    }

    /// `id ‖ beneficiary ‖ price_be ‖ trade_name ‖ region`, each string
    /// length-prefixed so field boundaries are unambiguous.
    pub fn preimage(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        push_str(&mut buf, &self.id);
        buf.extend_from_slice(self.beneficiary.as_bytes());
        buf.extend_from_slice(&self.price.to_be_bytes());
        push_str(&mut buf, &self.trade_name);
        push_str(&mut buf, &self.region);
        buf
    }
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}
