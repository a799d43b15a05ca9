//! # Outcomes
//!
//! The result codes the register shows the cashier.
//!
//! ## Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Code               Category          Applied?        Cashier action    │
//! │  ─────────────────  ────────────────  ──────────────  ───────────────── │
//! │  Success            -                 yes             next customer     │
//! │  MalformedPayload   input             no              rescan            │
//! │  Expired            input             no              fresh code        │
//! │  Rejected(reason)   input / refusal   no              fix and retry     │
//! │  NotFound           business          no              rescan            │
//! │  NotAMember         business          no              offer enrollment  │
//! │  InsufficientPoints business          no              pick cheaper      │
//! │  OutOfStock         business          no              pick another      │
//! │  NoActiveRule       business          no              call manager      │
//! │  Conflict           race lost         no              re-confirm        │
//! │  Unavailable        read failure      no              try again         │
//! │  Unknown            write timeout     MAYBE           VERIFY first      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Unknown` is the only code where a blind retry is unsafe: the write may
//! have landed. The register must verify (look the commit up by its
//! idempotency token, re-read the balance) before anything is resent.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Transaction;

/// Whether a failed step may have changed the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Nothing was written; retrying or rescanning is safe.
    DefinitelyNotApplied,
    /// The write may or may not have been applied.
    Unknown,
}

/// Result code surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success { transaction: Transaction },
    NotAMember,
    NotFound,
    MalformedPayload,
    Expired,
    InsufficientPoints,
    OutOfStock,
    NoActiveRule,
    Conflict,
    /// A read failed after automatic retries. Nothing was applied.
    Unavailable,
    /// A write timed out or failed in transit; outcome undetermined.
    Unknown,
    Rejected { reason: String },
}

impl Outcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Outcome::Rejected {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code, as serialized.
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "SUCCESS",
            Outcome::NotAMember => "NOT_A_MEMBER",
            Outcome::NotFound => "NOT_FOUND",
            Outcome::MalformedPayload => "MALFORMED_PAYLOAD",
            Outcome::Expired => "EXPIRED",
            Outcome::InsufficientPoints => "INSUFFICIENT_POINTS",
            Outcome::OutOfStock => "OUT_OF_STOCK",
            Outcome::NoActiveRule => "NO_ACTIVE_RULE",
            Outcome::Conflict => "CONFLICT",
            Outcome::Unavailable => "UNAVAILABLE",
            Outcome::Unknown => "UNKNOWN",
            Outcome::Rejected { .. } => "REJECTED",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// How a failure with this code must be treated.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Outcome::Unknown => FailureKind::Unknown,
            _ => FailureKind::DefinitelyNotApplied,
        }
    }

    /// Message for the cashier.
    pub fn message(&self) -> String {
        match self {
            Outcome::Success { transaction } => {
                format!("Done: {} {}", transaction.kind(), transaction.id())
            }
            Outcome::NotAMember => "Customer is not a member of this store".to_string(),
            Outcome::NotFound => "Customer not found, please rescan".to_string(),
            Outcome::MalformedPayload => "This code is not a customer code".to_string(),
            Outcome::Expired => "Code expired, ask the customer to refresh it".to_string(),
            Outcome::InsufficientPoints => "Not enough points for this reward".to_string(),
            Outcome::OutOfStock => "Reward is out of stock".to_string(),
            Outcome::NoActiveRule => "No points rule is active for this store".to_string(),
            Outcome::Conflict => "Balance or stock changed, please confirm again".to_string(),
            Outcome::Unavailable => "Service unavailable, please try again".to_string(),
            Outcome::Unknown => {
                "No answer from the server: verify before trying again".to_string()
            }
            Outcome::Rejected { reason } => format!("Rejected: {}", reason),
        }
    }
}
