//! ERC-20 approval decision.
//!
//! A pure decision function over live chain state: it answers "can this
//! spend proceed?" and, when it cannot, hands back everything a separate
//! approval-submission flow needs. It never submits anything itself, which
//! keeps the write path linear and the decision testable.

use serde::Serialize;
use tracing::debug;

use crate::abi;
use crate::chain::ChainReader;
use crate::errors::Result;
use crate::wallet::CallRequest;

/// Everything an external approval flow needs to build and sign the
/// `approve` call. `amount` is always the exact required spend, recomputed
/// from current chain state — never unbounded, never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalDescriptor {
    pub token: String,
    pub spender: String,
    pub amount: u128,
}

impl ApprovalDescriptor {
    /// The ready-to-sign `approve(spender, amount)` call.
    pub fn approve_request(&self, owner: &str) -> Result<CallRequest> {
        Ok(CallRequest {
            from: owner.to_string(),
            to: self.token.clone(),
            data: abi::calldata(
                abi::APPROVE,
                &[abi::encode_address(&self.spender)?, abi::encode_uint(self.amount)],
            ),
            value: 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceCheck {
    /// The current allowance covers the spend; proceed.
    Sufficient,
    /// An approval must be signed first.
    NeedsApproval(ApprovalDescriptor),
}

/// Compare the owner's live allowance against the required spend.
///
/// Idempotent: with unchanged chain state, repeated calls return
/// descriptor-equal results. Native-currency campaigns (zero-address
/// payment token) never need approval.
pub async fn check_allowance(
    reader: &ChainReader,
    token: &str,
    owner: &str,
    spender: &str,
    required: u128,
) -> Result<AllowanceCheck> {
    if token == abi::NATIVE_TOKEN {
        return Ok(AllowanceCheck::Sufficient);
    }

    let current = reader.allowance(token, owner, spender).await?;
    debug!("Allowance of {owner} for {spender} on {token}: {current} (required {required})");

    if current >= required {
        Ok(AllowanceCheck::Sufficient)
    } else {
        Ok(AllowanceCheck::NeedsApproval(ApprovalDescriptor {
            token: token.to_string(),
            spender: spender.to_string(),
            amount: required,
        }))
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
