//! Contract matching.
//!
//! Maps target strikes to the nearest listed contracts of an already
//! resolved expiry. Works only on the snapshot it is given.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use straddle_core::{Contract, OptionKind};

use crate::error::{EngineError, Result};

/// Call and put contracts chosen for a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedContracts {
    pub call: Contract,
    pub put: Contract,
}

/// Picks the contract of `kind` nearest to `target`.
///
/// Ties on distance go to the strike nearer `spot`, then to the lower strike,
/// so the result does not depend on listing order.
#[must_use]
pub fn nearest<'a>(
    contracts: impl IntoIterator<Item = &'a Contract>,
    kind: OptionKind,
    target: Decimal,
    spot: Decimal,
) -> Option<&'a Contract> {
    contracts
        .into_iter()
        .filter(|c| c.kind == kind)
        .min_by_key(|c| ((c.strike - target).abs(), (c.strike - spot).abs(), c.strike))
}

/// Matches both targets against the contracts listed for `expiry`.
///
/// # Errors
/// `NoMatchingContract` when no call or no put is listed for `expiry`.
pub fn match_contracts(
    call_target: Decimal,
    put_target: Decimal,
    contracts: &[Contract],
    expiry: &str,
    spot: Decimal,
) -> Result<MatchedContracts> {
    if expiry.is_empty() {
        return Err(EngineError::NoMatchingContract(
            "no expiry listed for the requested class".to_string(),
        ));
    }

    let listed: Vec<&Contract> = contracts.iter().filter(|c| c.expiry == expiry).collect();

    let call = nearest(listed.iter().copied(), OptionKind::Call, call_target, spot)
        .ok_or_else(|| EngineError::NoMatchingContract(format!("no call listed for expiry {expiry}")))?;
    let put = nearest(listed.iter().copied(), OptionKind::Put, put_target, spot)
        .ok_or_else(|| EngineError::NoMatchingContract(format!("no put listed for expiry {expiry}")))?;

    tracing::debug!(
        expiry,
        call_target = %call_target,
        call = %call.symbol,
        put_target = %put_target,
        put = %put.symbol,
        "Matched contracts"
    );

    Ok(MatchedContracts {
        call: call.clone(),
        put: put.clone(),
    })
}
