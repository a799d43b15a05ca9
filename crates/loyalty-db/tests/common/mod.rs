//! Shared fixture for the ledger integration tests.

#![allow(dead_code)]

use chrono::Utc;
use loyalty_core::{
    IdempotencyToken, LedgerOutcome, Money, PurchaseCommand, RedemptionCommand, SessionContext,
};
use loyalty_db::{Database, DbConfig, NewCustomer, NewPointsRule, NewRewardProduct};
use tempfile::TempDir;

pub const ORG: &str = "org-1";
pub const BRANCH: &str = "branch-1";
pub const OTHER_BRANCH: &str = "branch-2";

/// A file-backed database that several connections can share.
///
/// Lives in its own temporary directory, so the WAL side files go with it.
pub struct TempLedger {
    pub db: Database,
    _dir: TempDir,
}

impl TempLedger {
    pub async fn new(max_connections: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("ledger.db")).max_connections(max_connections);
        let db = Database::new(config).await.unwrap();
        seed_directory(&db).await;
        TempLedger { db, _dir: dir }
    }
}

/// In-memory database with the organization and branches in place.
pub async fn memory_ledger() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed_directory(&db).await;
    db
}

async fn seed_directory(db: &Database) {
    db.organizations().insert_organization(ORG, "Corner Coffee").await.unwrap();
    db.organizations().insert_branch(BRANCH, ORG, "Main St").await.unwrap();
    db.organizations().insert_branch(OTHER_BRANCH, ORG, "Harbor").await.unwrap();
}

pub async fn add_member(db: &Database, customer_id: &str) {
    db.customers()
        .insert(&NewCustomer {
            id: customer_id.to_string(),
            email: None,
            first_name: Some(customer_id.to_string()),
            last_name: None,
        })
        .await
        .unwrap();
    db.memberships().insert_enrolled(customer_id, ORG).await.unwrap();
}

pub async fn add_rule(db: &Database, id: &str, points_per_unit: i64) {
    db.rules()
        .insert(&NewPointsRule {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            branch_id: None,
            name: format!("{} pts per unit", points_per_unit),
            description: None,
            points_per_unit,
            priority: 0,
            valid_from_ms: None,
            valid_until_ms: None,
        })
        .await
        .unwrap();
}

pub async fn add_reward(db: &Database, id: &str, required_points: i64, stock: i64) {
    db.catalog()
        .insert_product(&NewRewardProduct {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            name: id.to_string(),
            description: None,
            required_points,
        })
        .await
        .unwrap();
    db.catalog().set_stock(id, BRANCH, stock).await.unwrap();
}

pub fn purchase(customer_id: &str, cents: i64) -> PurchaseCommand {
    PurchaseCommand {
        token: IdempotencyToken::generate(),
        context: SessionContext::new(ORG, BRANCH, "cashier-1"),
        customer_id: customer_id.to_string(),
        amount: Money::from_cents(cents),
        notes: None,
        requested_at: Utc::now(),
    }
}

pub fn redemption(customer_id: &str, product_id: &str) -> RedemptionCommand {
    RedemptionCommand {
        token: IdempotencyToken::generate(),
        context: SessionContext::new(ORG, BRANCH, "cashier-1"),
        customer_id: customer_id.to_string(),
        product_id: product_id.to_string(),
        requested_at: Utc::now(),
    }
}

/// Gives a member `points` by committing a purchase under a temporary
/// 1 pt/cent rule, switched off again afterwards.
pub async fn grant_points(db: &Database, customer_id: &str, points: i64) {
    let rule_id = format!("grant-{}", uuid::Uuid::new_v4());
    add_rule(db, &rule_id, 100).await;
    let outcome = db.ledger().commit_purchase(&purchase(customer_id, points)).await.unwrap();
    assert!(matches!(outcome, LedgerOutcome::Applied { .. }), "{:?}", outcome);
    db.rules().deactivate(&rule_id).await.unwrap();
}

pub async fn transaction_count(db: &Database) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(db.pool())
        .await
        .unwrap()
}
