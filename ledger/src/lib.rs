//! Ledger state engine.
//!
//! Owns account balances, nonces, frozen and conversion balances, and the
//! block-indexed transaction log. Blocks are applied atomically, verified
//! through a state commitment computed in memory, rolled back exactly, and
//! replayed during recovery.

pub mod error;
pub mod keys;
pub mod ledger;
pub mod projection;
pub mod rewards;
pub mod view;

pub use error::LedgerError;
pub use keys::TxLocation;
pub use ledger::Ledger;
pub use projection::{apply_effect, revert_effect, Account, AccountProjection, AccountSource, Totals};
pub use rewards::{coinbase_transactions, reward_split, RewardAddresses};
pub use view::{ChainLedger, LedgerView};
