//! End-to-end register flows: a `CashierSession` over the SQLite ledger.

use std::sync::Arc;

use chrono::Utc;
use loyalty_core::session::SessionState;
use loyalty_core::{
    IdempotencyToken, LedgerOutcome, Money, Outcome, PurchaseCommand, SessionContext, SystemClock,
    Transaction,
};
use loyalty_db::{Database, DbConfig, NewCustomer, NewPointsRule, NewRewardProduct};
use loyalty_orchestrator::{CashierSession, SessionSettings, SqliteBackend};

const ORG: &str = "org-1";
const BRANCH: &str = "branch-1";

// =============================================================================
// Fixture
// =============================================================================

async fn ledger() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.organizations().insert_organization(ORG, "Corner Coffee").await.unwrap();
    db.organizations().insert_branch(BRANCH, ORG, "Main St").await.unwrap();
    db
}

fn session(db: &Database) -> CashierSession {
    CashierSession::new(
        SessionContext::new(ORG, BRANCH, "cashier-1"),
        Arc::new(SqliteBackend::new(db.clone())),
        Arc::new(SystemClock),
        SessionSettings::default(),
    )
}

fn code(customer_id: &str) -> String {
    format!(
        r#"{{"type":"customer","id":"{}","issuedAt":{}}}"#,
        customer_id,
        Utc::now().timestamp_millis()
    )
}

async fn add_customer(db: &Database, id: &str, first_name: &str) {
    db.customers()
        .insert(&NewCustomer {
            id: id.to_string(),
            email: None,
            first_name: Some(first_name.to_string()),
            last_name: None,
        })
        .await
        .unwrap();
}

async fn add_rule(db: &Database, id: &str, points_per_unit: i64) {
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

async fn add_reward(db: &Database, id: &str, required_points: i64, stock: i64) {
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

/// Enrolls a member holding `points`, earned under a rule switched off again.
async fn add_member_with_points(db: &Database, id: &str, points: i64) {
    add_customer(db, id, id).await;
    db.memberships().insert_enrolled(id, ORG).await.unwrap();
    if points == 0 {
        return;
    }

    let rule_id = format!("grant-{}", id);
    add_rule(db, &rule_id, 100).await;
    let outcome = db
        .ledger()
        .commit_purchase(&PurchaseCommand {
            token: IdempotencyToken::generate(),
            context: SessionContext::new(ORG, BRANCH, "backoffice"),
            customer_id: id.to_string(),
            amount: Money::from_cents(points),
            notes: None,
            requested_at: Utc::now(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, LedgerOutcome::Applied { .. }), "{:?}", outcome);
    db.rules().deactivate(&rule_id).await.unwrap();
}

fn balance(state: &SessionState) -> i64 {
    state
        .customer()
        .map(|customer| customer.membership.available_points)
        .unwrap_or(-1)
}

// =============================================================================
// Flows
// =============================================================================

#[tokio::test]
async fn test_first_visit_enrolls_without_points() {
    let db = ledger().await;
    add_customer(&db, "cust-new", "Bruno").await;
    add_rule(&db, "rule-1", 10).await;
    let session = session(&db);

    let state = session.scan(&code("cust-new")).await.unwrap();
    assert!(matches!(state, SessionState::Enrolling { ref identity, .. } if identity.display_name == "Bruno"));

    let state = session.enroll().await.unwrap();
    assert!(matches!(state, SessionState::Known { ref customer } if customer.has_active_rule));
    assert_eq!(balance(&state), 0);

    session.finish().await.unwrap();
    let state = session.scan(&code("cust-new")).await.unwrap();
    assert!(matches!(state, SessionState::Known { .. }));
    assert_eq!(balance(&state), 0);
    assert!(db.ledger().list_for_membership("cust-new", ORG, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purchase_earns_points_from_ledger_rules() {
    let db = ledger().await;
    add_member_with_points(&db, "cust-1", 0).await;
    add_rule(&db, "rule-1", 10).await;
    let session = session(&db);

    session.scan(&code("cust-1")).await.unwrap();
    session.start_purchase().await.unwrap();
    session.quote(Money::from_cents(2550)).await.unwrap();

    let state = session
        .confirm_purchase(Money::from_cents(2550), Some("  latte and croissant "))
        .await
        .unwrap();
    let SessionState::Succeeded { customer, transaction: Transaction::Purchase(purchase) } = state
    else {
        panic!("expected a purchase");
    };
    assert_eq!(purchase.points_earned, 255);
    assert_eq!(purchase.notes.as_deref(), Some("latte and croissant"));
    assert_eq!(customer.membership.available_points, 255);
    assert!(db.ledger().audit().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rule_change_after_quote_uses_ledger_rate() {
    let db = ledger().await;
    add_member_with_points(&db, "cust-1", 0).await;
    add_rule(&db, "rule-1", 10).await;
    let session = session(&db);

    session.scan(&code("cust-1")).await.unwrap();
    session.start_purchase().await.unwrap();
    let quoted = session.quote(Money::from_cents(1000)).await.unwrap();
    assert!(matches!(
        quoted,
        SessionState::QuotingPurchase { quote: Some(loyalty_core::QuoteResult::Quoted { ref quote }), .. }
            if quote.points == 100
    ));

    db.rules().set_points_per_unit("rule-1", 20).await.unwrap();
    let state = session.confirm_purchase(Money::from_cents(1000), None).await.unwrap();
    assert_eq!(balance(&state), 200);
}

#[tokio::test]
async fn test_rule_retired_after_quote_blocks_commit() {
    let db = ledger().await;
    add_member_with_points(&db, "cust-1", 0).await;
    add_rule(&db, "rule-1", 10).await;
    let session = session(&db);

    session.scan(&code("cust-1")).await.unwrap();
    session.start_purchase().await.unwrap();
    db.rules().deactivate("rule-1").await.unwrap();

    let state = session.confirm_purchase(Money::from_cents(1000), None).await.unwrap();
    let SessionState::Failed { failure } = state else {
        panic!("expected Failed");
    };
    assert_eq!(failure.outcome, Outcome::NoActiveRule);
    assert!(db.ledger().list_for_membership("cust-1", ORG, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redeem_last_unit_with_exact_balance() {
    let db = ledger().await;
    add_member_with_points(&db, "cust-1", 500).await;
    add_reward(&db, "mug", 500, 1).await;
    let session = session(&db);

    let state = session.scan(&code("cust-1")).await.unwrap();
    assert_eq!(balance(&state), 500);
    assert!(matches!(state, SessionState::Known { ref customer } if !customer.has_active_rule));

    session.start_redemption().await.unwrap();
    let state = session.confirm_redemption("mug").await.unwrap();
    assert!(matches!(state, SessionState::Succeeded { transaction: Transaction::Redemption(_), .. }));
    assert_eq!(balance(&state), 0);

    let lines = db.catalog().stock_lines("mug").await.unwrap();
    assert_eq!(lines.iter().map(|line| line.quantity).sum::<i64>(), 0);

    // Second attempt by the same member: out of points, no stock left.
    session.finish().await.unwrap();
    session.scan(&code("cust-1")).await.unwrap();
    session.start_redemption().await.unwrap();
    let state = session.confirm_redemption("mug").await.unwrap();
    assert!(matches!(state, SessionState::Failed { ref failure } if failure.outcome == Outcome::InsufficientPoints));
    assert!(db.ledger().audit().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_two_registers_race_for_last_unit() {
    let db = ledger().await;
    add_member_with_points(&db, "cust-a", 500).await;
    add_member_with_points(&db, "cust-b", 500).await;
    add_reward(&db, "mug", 500, 1).await;
    let register_a = session(&db);
    let register_b = session(&db);

    for (register, customer) in [(&register_a, "cust-a"), (&register_b, "cust-b")] {
        register.scan(&code(customer)).await.unwrap();
        register.start_redemption().await.unwrap();
    }

    let (a, b) = tokio::join!(
        register_a.confirm_redemption("mug"),
        register_b.confirm_redemption("mug")
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let won = outcomes
        .iter()
        .filter(|state| matches!(state, SessionState::Succeeded { .. }))
        .count();
    let out_of_stock = outcomes
        .iter()
        .filter(|state| {
            matches!(state, SessionState::Failed { failure } if failure.outcome == Outcome::OutOfStock)
        })
        .count();
    assert_eq!((won, out_of_stock), (1, 1));

    let loser = outcomes
        .iter()
        .find(|state| matches!(state, SessionState::Failed { .. }))
        .unwrap();
    assert_eq!(balance(loser), 500);
}

#[tokio::test]
async fn test_inactive_membership_reactivates_with_balance() {
    let db = ledger().await;
    add_member_with_points(&db, "cust-old", 120).await;
    db.memberships().deactivate("cust-old", ORG).await.unwrap();
    let session = session(&db);

    let state = session.scan(&code("cust-old")).await.unwrap();
    assert!(matches!(state, SessionState::Enrolling { .. }));

    let state = session.enroll().await.unwrap();
    assert!(matches!(state, SessionState::Known { .. }));
    assert_eq!(balance(&state), 120);
}

#[tokio::test]
async fn test_unknown_customer_and_bad_codes() {
    let db = ledger().await;
    let session = session(&db);

    let state = session.scan(&code("nobody")).await.unwrap();
    assert!(matches!(state, SessionState::Failed { ref failure } if failure.outcome == Outcome::NotFound));

    let stale = r#"{"type":"customer","id":"nobody","issuedAt":1000}"#;
    let state = session.scan(stale).await.unwrap();
    assert!(matches!(state, SessionState::Failed { ref failure } if failure.outcome == Outcome::Expired));

    let state = session.scan("not json at all").await.unwrap();
    assert!(matches!(state, SessionState::Failed { ref failure } if failure.outcome == Outcome::MalformedPayload));
}
