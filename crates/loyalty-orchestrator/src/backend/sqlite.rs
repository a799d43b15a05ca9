//! [`LoyaltyBackend`] over the local SQLite ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use loyalty_core::{
    ActiveOffer, CustomerIdentity, IdempotencyToken, LedgerOutcome, Membership, Money,
    PurchaseCommand, RedemptionCommand, RewardProduct, RuleEvaluation, Transaction,
};
use loyalty_db::Database;

use super::{BackendResult, LoyaltyBackend};

/// Backend adapter for a [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    pub fn new(db: Database) -> Self {
        SqliteBackend { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl LoyaltyBackend for SqliteBackend {
    async fn find_customer(&self, customer_id: &str) -> BackendResult<Option<CustomerIdentity>> {
        Ok(self.db.customers().get_by_id(customer_id).await?)
    }

    async fn find_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Option<Membership>> {
        Ok(self.db.memberships().find(customer_id, organization_id).await?)
    }

    async fn insert_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Membership> {
        Ok(self
            .db
            .memberships()
            .insert_enrolled(customer_id, organization_id)
            .await?)
    }

    async fn reactivate_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Membership> {
        Ok(self
            .db
            .memberships()
            .reactivate(customer_id, organization_id)
            .await?)
    }

    async fn active_offers(
        &self,
        organization_id: &str,
        branch_id: &str,
        at: DateTime<Utc>,
    ) -> BackendResult<Vec<ActiveOffer>> {
        Ok(self
            .db
            .rules()
            .active_offers(organization_id, branch_id, at)
            .await?)
    }

    async fn evaluate_points(
        &self,
        amount: Money,
        organization_id: &str,
        branch_id: &str,
        at: DateTime<Utc>,
    ) -> BackendResult<RuleEvaluation> {
        Ok(self
            .db
            .rules()
            .evaluate(amount, organization_id, branch_id, at)
            .await?)
    }

    async fn list_rewards(&self, organization_id: &str) -> BackendResult<Vec<RewardProduct>> {
        Ok(self.db.catalog().list_rewards(organization_id).await?)
    }

    async fn commit_purchase(&self, command: &PurchaseCommand) -> BackendResult<LedgerOutcome> {
        Ok(self.db.ledger().commit_purchase(command).await?)
    }

    async fn commit_redemption(
        &self,
        command: &RedemptionCommand,
    ) -> BackendResult<LedgerOutcome> {
        Ok(self.db.ledger().commit_redemption(command).await?)
    }

    async fn find_transaction(
        &self,
        token: &IdempotencyToken,
    ) -> BackendResult<Option<(Transaction, Membership)>> {
        Ok(self.db.ledger().find_by_token(token).await?)
    }
}
