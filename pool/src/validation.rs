//! Admission checks.
//!
//! [`validate_static`] needs nothing but the transaction and the chain
//! parameters; the coordinator runs it over every non-coinbase transaction
//! of a proposed block. [`validate`] adds the nonce floor and the balance
//! rule against committed state, and is what [`crate::TxPool::admit`] runs.

use meridian_crypto::{hash_transaction, is_usable, verify_order, verify_transaction};
use meridian_ledger::{apply_effect, AccountProjection, LedgerView};
use meridian_script::compile;
use meridian_types::{Address, ChainParams, Transaction, TxKind};

use crate::PoolError;

/// Checks that do not depend on account state.
pub fn validate_static(tx: &Transaction, params: &ChainParams) -> Result<(), PoolError> {
    if matches!(tx.kind, TxKind::Coinbase) {
        return Err(PoolError::CoinbaseNotAdmissible);
    }
    if tx.from.is_zero() {
        return Err(PoolError::MalformedAddress("from"));
    }
    if tx.is_conversion() {
        // Conversions have no counterparty.
        if !tx.to.is_zero() {
            return Err(PoolError::MalformedAddress("to"));
        }
    } else if !is_usable(&tx.to) {
        return Err(PoolError::MalformedAddress("to"));
    }

    if hash_transaction(tx) != tx.hash {
        return Err(PoolError::BadHash);
    }

    match &tx.kind {
        TxKind::Coinbase | TxKind::ConvertToPck { .. } | TxKind::ConvertToKto { .. } => {}
        TxKind::Freeze | TxKind::Unfreeze => {
            if !verify_transaction(tx) {
                return Err(PoolError::BadSignature);
            }
            if !params.is_admin(&tx.from) {
                return Err(PoolError::NotAdmin(tx.from));
            }
            check_minimum(tx.amount, params)?;
        }
        TxKind::Transfer { script, order } => {
            if !verify_transaction(tx) {
                return Err(PoolError::BadSignature);
            }
            check_minimum(tx.amount, params)?;
            if let Some(order) = order {
                if !verify_order(order, &params.marketplace) {
                    return Err(PoolError::InvalidOrder);
                }
            }
            if let Some(script) = script {
                if tx.fee < params.min_amount {
                    return Err(PoolError::FeeTooLow {
                        fee: tx.fee,
                        min: params.min_amount,
                    });
                }
                compile(script)?;
            }
        }
    }
    Ok(())
}

fn check_minimum(amount: u64, params: &ChainParams) -> Result<(), PoolError> {
    if amount < params.min_amount {
        return Err(PoolError::BelowMinimum {
            amount,
            min: params.min_amount,
        });
    }
    Ok(())
}

/// Full admission check against the ledger's committed state.
///
/// The balance rule is the ledger's own [`apply_effect`], run on a
/// throwaway projection as if `tx` were the sender's next transaction.
pub fn validate<L: LedgerView + ?Sized>(tx: &Transaction, ledger: &L) -> Result<(), PoolError> {
    let params = ledger.params();
    validate_static(tx, params)?;

    let sender = ledger.account(&tx.from)?;
    if tx.nonce < sender.nonce {
        return Err(PoolError::NonceTooLow {
            expected: sender.nonce,
            got: tx.nonce,
        });
    }

    let mut probe = tx.clone();
    probe.nonce = sender.nonce;
    let mut proj = AccountProjection::new(ledger);
    apply_effect(&mut proj, &probe, &Address::ZERO, params)?;
    Ok(())
}
