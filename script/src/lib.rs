//! Token scripts.
//!
//! A transfer may carry a short script operating on contract-scoped token
//! balances. Only five opcodes exist:
//!
//! ```text
//! new      "<token>" <total_supply> <precision>
//! mint     "<token>" <amount>
//! transfer "<token>" <amount> "<recipient>"
//! freeze   "<token>" "<holder>"
//! unfreeze "<token>" "<holder>"
//! ```
//!
//! Statements are separated by `;` or newlines. [`compile`] turns text into
//! [`Instruction`]s; [`execute`] runs them against a [`ScriptDb`] and returns
//! a [`ScriptDiff`] that is flushed into the caller's storage transaction.

pub mod compile;
pub mod error;
pub mod exec;
pub mod state;

pub use compile::{compile, Instruction};
pub use error::ScriptError;
pub use exec::{execute, ScriptDiff};
pub use state::{token_balance, Committed, Journal, Overlay, ScriptDb, TOKEN_NAMESPACE};
