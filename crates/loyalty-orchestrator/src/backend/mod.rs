//! # Loyalty Backend
//!
//! The seam between the orchestrator and the system of record.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IdentityResolver ─┐                                                    │
//! │  MembershipGate  ──┼──► Arc<dyn LoyaltyBackend> ──► SqliteBackend       │
//! │  PointsRuleClient ─┤                           └──► ScriptedBackend     │
//! │  TransactionCommitter                               (tests)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads return plain data. The two commit operations are single
//! conditional operations on the backend side: either everything in them is
//! applied or nothing is, and business refusals come back as
//! [`LedgerOutcome`] values, not errors.

mod sqlite;

pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use loyalty_core::{
    ActiveOffer, CustomerIdentity, IdempotencyToken, LedgerOutcome, Membership, Money,
    PurchaseCommand, RedemptionCommand, RewardProduct, RuleEvaluation, Transaction,
};

use crate::error::BackendError;

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait LoyaltyBackend: Send + Sync {
    // =========================================================================
    // Identity & membership
    // =========================================================================

    async fn find_customer(&self, customer_id: &str) -> BackendResult<Option<CustomerIdentity>>;

    /// The membership row, active or not.
    async fn find_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Option<Membership>>;

    /// Creates a zero-balance active membership.
    ///
    /// Fails with [`BackendError::UniqueViolation`] when a row already exists.
    async fn insert_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Membership>;

    /// Reactivates an existing membership, balances unchanged.
    async fn reactivate_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Membership>;

    // =========================================================================
    // Rules & catalog
    // =========================================================================

    async fn active_offers(
        &self,
        organization_id: &str,
        branch_id: &str,
        at: DateTime<Utc>,
    ) -> BackendResult<Vec<ActiveOffer>>;

    async fn evaluate_points(
        &self,
        amount: Money,
        organization_id: &str,
        branch_id: &str,
        at: DateTime<Utc>,
    ) -> BackendResult<RuleEvaluation>;

    async fn list_rewards(&self, organization_id: &str) -> BackendResult<Vec<RewardProduct>>;

    // =========================================================================
    // Ledger
    // =========================================================================

    async fn commit_purchase(&self, command: &PurchaseCommand) -> BackendResult<LedgerOutcome>;

    async fn commit_redemption(&self, command: &RedemptionCommand)
        -> BackendResult<LedgerOutcome>;

    /// The transaction recorded under `token`, with the membership after it.
    async fn find_transaction(
        &self,
        token: &IdempotencyToken,
    ) -> BackendResult<Option<(Transaction, Membership)>>;
}
