//! # Ledger Repository
//!
//! The only writer of point balances and stock quantities.
//!
//! ## Commit Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  One SQLite transaction per commit                                      │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   1. DELETE expired idempotency_keys      ← first statement writes,    │
//! │                                             so the tx holds the write  │
//! │                                             lock from the start        │
//! │   2. claim token                                                        │
//! │        known, same request   → return the recorded transaction         │
//! │        known, other request  → Rejected                                │
//! │        new                   → INSERT idempotency_keys                 │
//! │   3. purchase:   evaluate rules now → NoActiveRule?                    │
//! │                  UPDATE memberships SET +points WHERE is_active        │
//! │      redemption: UPDATE memberships SET -points                        │
//! │                    WHERE is_active AND available_points >= required    │
//! │                  UPDATE stock_lines SET quantity - 1                   │
//! │                    WHERE id = chosen AND quantity > 0                  │
//! │   4. INSERT transactions (append-only)                                 │
//! │   5. UPDATE idempotency_keys SET transaction_id                        │
//! │  COMMIT                     (any business refusal → ROLLBACK)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two registers racing for the last unit serialize on the write lock; the
//! second one runs its conditional updates against the first one's result
//! and gets `OutOfStock` or `InsufficientPoints`.
//!
//! ## Stock Line Choice
//! The cashier's own branch first, then other branches by branch id, then
//! by line id. Deterministic, so tests and audits can predict it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::generate_id;
use crate::repository::membership::find_on as find_membership_on;
use crate::repository::rules::evaluate_on as evaluate_rules_on;
use loyalty_core::{
    IdempotencyToken, LedgerOutcome, Membership, Money, Purchase, PurchaseCommand, Redemption,
    RedemptionCommand, RuleEvaluation, Transaction, TransactionKind,
};

// =============================================================================
// Rows
// =============================================================================

const TRANSACTION_COLUMNS: &str = "id, kind, idempotency_token, customer_id, organization_id, \
     branch_id, cashier_id, amount_cents, points_earned, points_spent, \
     product_id, stock_line_id, notes, created_at";

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    kind: TransactionKind,
    idempotency_token: String,
    customer_id: String,
    organization_id: String,
    branch_id: String,
    cashier_id: String,
    amount_cents: Option<i64>,
    points_earned: i64,
    points_spent: i64,
    product_id: Option<String>,
    stock_line_id: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DbError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let token = IdempotencyToken::parse(&row.idempotency_token)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        match row.kind {
            TransactionKind::Purchase => Ok(Transaction::Purchase(Purchase {
                id: row.id,
                idempotency_token: token,
                customer_id: row.customer_id,
                organization_id: row.organization_id,
                branch_id: row.branch_id,
                cashier_id: row.cashier_id,
                amount: Money::from_cents(row.amount_cents.unwrap_or(0)),
                points_earned: row.points_earned,
                notes: row.notes,
                created_at: row.created_at,
            })),
            TransactionKind::Redemption => {
                let (Some(product_id), Some(stock_line_id)) = (row.product_id, row.stock_line_id)
                else {
                    return Err(DbError::Internal(format!(
                        "redemption {} has no product or stock line",
                        row.id
                    )));
                };
                Ok(Transaction::Redemption(Redemption {
                    id: row.id,
                    idempotency_token: token,
                    customer_id: row.customer_id,
                    organization_id: row.organization_id,
                    product_id,
                    points_spent: row.points_spent,
                    stock_line_id,
                    branch_id: row.branch_id,
                    cashier_id: row.cashier_id,
                    created_at: row.created_at,
                }))
            }
        }
    }
}

/// A membership whose counters disagree with its transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDiscrepancy {
    pub membership: Membership,
    /// Σ points_earned over the membership's purchases.
    pub ledger_earned: i64,
    /// Σ points_spent over the membership's redemptions.
    pub ledger_redeemed: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    customer_id: String,
    organization_id: String,
    available_points: i64,
    total_earned: i64,
    total_redeemed: i64,
    is_active: bool,
    ledger_earned: i64,
    ledger_redeemed: i64,
}

// =============================================================================
// Connection-level helpers
// =============================================================================

async fn load_transaction(conn: &mut SqliteConnection, id: &str) -> DbResult<Transaction> {
    let sql = format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS);
    let row: Option<TransactionRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;

    row.ok_or_else(|| DbError::not_found("Transaction", id))?
        .try_into()
}

async fn load_by_token(conn: &mut SqliteConnection, token: &str) -> DbResult<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE idempotency_token = ?1",
        TRANSACTION_COLUMNS
    );
    let row: Option<TransactionRow> = sqlx::query_as(&sql).bind(token).fetch_optional(conn).await?;

    row.map(Transaction::try_from).transpose()
}

async fn purge_on(conn: &mut SqliteConnection, now_ms: i64) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at_ms <= ?1")
        .bind(now_ms)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// What the idempotency record says about an incoming commit.
enum Claim {
    /// First time this token is seen; the record now exists.
    Fresh,
    /// Already applied; this is the recorded transaction.
    Replay(Transaction),
    /// The token belongs to a different request.
    Mismatch,
}

struct TokenRequest<'a> {
    token: &'a str,
    fingerprint: String,
    kind: TransactionKind,
    customer_id: &'a str,
}

async fn claim_token(
    conn: &mut SqliteConnection,
    request: &TokenRequest<'_>,
    now_ms: i64,
    ttl_ms: i64,
) -> DbResult<Claim> {
    let existing: Option<(String, Option<String>)> = sqlx::query_as(
        "SELECT fingerprint, transaction_id FROM idempotency_keys WHERE token = ?1",
    )
    .bind(request.token)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some((fingerprint, _)) if fingerprint != request.fingerprint => Ok(Claim::Mismatch),
        Some((_, Some(transaction_id))) => {
            let transaction = load_transaction(conn, &transaction_id).await?;
            Ok(Claim::Replay(transaction))
        }
        Some((_, None)) => Ok(Claim::Fresh),
        None => {
            // The record may have expired while the transaction stays bound
            // to its token forever.
            if let Some(transaction) = load_by_token(&mut *conn, request.token).await? {
                let same_request = transaction.kind() == request.kind
                    && transaction.customer_id() == request.customer_id;
                return Ok(if same_request {
                    Claim::Replay(transaction)
                } else {
                    Claim::Mismatch
                });
            }

            sqlx::query(
                r#"
                INSERT INTO idempotency_keys (token, fingerprint, transaction_id, created_at_ms, expires_at_ms)
                VALUES (?1, ?2, NULL, ?3, ?4)
                "#,
            )
            .bind(request.token)
            .bind(&request.fingerprint)
            .bind(now_ms)
            .bind(now_ms.saturating_add(ttl_ms))
            .execute(conn)
            .await?;

            Ok(Claim::Fresh)
        }
    }
}

async fn bind_token(conn: &mut SqliteConnection, token: &str, transaction_id: &str) -> DbResult<()> {
    sqlx::query("UPDATE idempotency_keys SET transaction_id = ?2 WHERE token = ?1")
        .bind(token)
        .bind(transaction_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn membership_after(
    conn: &mut SqliteConnection,
    customer_id: &str,
    organization_id: &str,
) -> DbResult<Membership> {
    find_membership_on(conn, customer_id, organization_id)
        .await?
        .ok_or_else(|| DbError::not_found("Membership", customer_id))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for ledger commits and queries.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
    token_ttl: Duration,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    ///
    /// ## Arguments
    /// * `token_ttl` - How long idempotency records are kept
    pub fn new(pool: SqlitePool, token_ttl: Duration) -> Self {
        LedgerRepository { pool, token_ttl }
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.token_ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Applies a purchase: re-evaluates the points, credits the membership
    /// and records the transaction, atomically.
    ///
    /// ## Returns
    /// * `Applied` - Recorded (or replayed for a known token)
    /// * `NoActiveRule` - No rule applies at `requested_at`; nothing written
    /// * `MembershipMissing` - No active membership; nothing written
    /// * `Rejected` - Invalid amount, or token reused for another request
    pub async fn commit_purchase(&self, command: &PurchaseCommand) -> DbResult<LedgerOutcome> {
        if !command.amount.is_positive() {
            return Ok(LedgerOutcome::Rejected {
                reason: "amount must be positive".to_string(),
            });
        }

        let ctx = &command.context;
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        debug!(
            token = %command.token,
            customer_id = %command.customer_id,
            amount = %command.amount,
            "Committing purchase"
        );

        let mut tx = self.pool.begin().await?;
        purge_on(&mut tx, now_ms).await?;

        let request = TokenRequest {
            token: command.token.as_str(),
            fingerprint: command.fingerprint(),
            kind: TransactionKind::Purchase,
            customer_id: &command.customer_id,
        };

        match claim_token(&mut tx, &request, now_ms, self.ttl_ms()).await? {
            Claim::Fresh => {}
            Claim::Replay(transaction) => {
                let membership =
                    membership_after(&mut tx, &command.customer_id, &ctx.organization_id).await?;
                tx.commit().await?;
                info!(token = %command.token, transaction_id = %transaction.id(), "Purchase replayed");
                return Ok(LedgerOutcome::Applied {
                    transaction,
                    membership,
                    replayed: true,
                });
            }
            Claim::Mismatch => {
                tx.rollback().await?;
                warn!(token = %command.token, "Idempotency token reused for a different request");
                return Ok(LedgerOutcome::Rejected {
                    reason: "idempotency token already used for a different request".to_string(),
                });
            }
        }

        let evaluation = evaluate_rules_on(
            &mut tx,
            command.amount,
            &ctx.organization_id,
            &ctx.branch_id,
            command.requested_at,
        )
        .await?;

        let (points, rule_id) = match evaluation {
            RuleEvaluation::Evaluated { points, rule_id, .. } => (points, rule_id),
            RuleEvaluation::NoActiveRule => {
                tx.rollback().await?;
                return Ok(LedgerOutcome::NoActiveRule);
            }
        };

        let credited = sqlx::query(
            r#"
            UPDATE memberships
            SET available_points = available_points + ?3,
                total_earned = total_earned + ?3,
                updated_at = ?4
            WHERE customer_id = ?1 AND organization_id = ?2 AND is_active = 1
            "#,
        )
        .bind(&command.customer_id)
        .bind(&ctx.organization_id)
        .bind(points)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if credited.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(LedgerOutcome::MembershipMissing);
        }

        let transaction_id = generate_id();

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, kind, idempotency_token, customer_id, organization_id,
                branch_id, cashier_id, amount_cents, points_earned, points_spent,
                product_id, stock_line_id, rule_id, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL, NULL, ?10, ?11, ?12)
            "#,
        )
        .bind(&transaction_id)
        .bind(TransactionKind::Purchase)
        .bind(command.token.as_str())
        .bind(&command.customer_id)
        .bind(&ctx.organization_id)
        .bind(&ctx.branch_id)
        .bind(&ctx.cashier_id)
        .bind(command.amount.cents())
        .bind(points)
        .bind(&rule_id)
        .bind(&command.notes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        bind_token(&mut tx, command.token.as_str(), &transaction_id).await?;

        let transaction = load_transaction(&mut tx, &transaction_id).await?;
        let membership = membership_after(&mut tx, &command.customer_id, &ctx.organization_id).await?;

        tx.commit().await?;

        info!(
            transaction_id = %transaction_id,
            customer_id = %command.customer_id,
            organization_id = %ctx.organization_id,
            points,
            rule_id = %rule_id,
            "Purchase committed"
        );

        Ok(LedgerOutcome::Applied {
            transaction,
            membership,
            replayed: false,
        })
    }

    /// Applies a redemption: debits the points, takes one unit of stock and
    /// records the transaction, atomically.
    ///
    /// ## Returns
    /// * `Applied` - Recorded (or replayed for a known token)
    /// * `InsufficientPoints` - Balance below the product's price
    /// * `OutOfStock` - No stock line of the product has a unit left
    /// * `MembershipMissing` - No active membership
    /// * `Rejected` - Unknown product, or token reused for another request
    pub async fn commit_redemption(&self, command: &RedemptionCommand) -> DbResult<LedgerOutcome> {
        let ctx = &command.context;
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        debug!(
            token = %command.token,
            customer_id = %command.customer_id,
            product_id = %command.product_id,
            "Committing redemption"
        );

        let mut tx = self.pool.begin().await?;
        purge_on(&mut tx, now_ms).await?;

        let request = TokenRequest {
            token: command.token.as_str(),
            fingerprint: command.fingerprint(),
            kind: TransactionKind::Redemption,
            customer_id: &command.customer_id,
        };

        match claim_token(&mut tx, &request, now_ms, self.ttl_ms()).await? {
            Claim::Fresh => {}
            Claim::Replay(transaction) => {
                let membership =
                    membership_after(&mut tx, &command.customer_id, &ctx.organization_id).await?;
                tx.commit().await?;
                info!(token = %command.token, transaction_id = %transaction.id(), "Redemption replayed");
                return Ok(LedgerOutcome::Applied {
                    transaction,
                    membership,
                    replayed: true,
                });
            }
            Claim::Mismatch => {
                tx.rollback().await?;
                warn!(token = %command.token, "Idempotency token reused for a different request");
                return Ok(LedgerOutcome::Rejected {
                    reason: "idempotency token already used for a different request".to_string(),
                });
            }
        }

        let required_points: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT required_points FROM reward_products
            WHERE id = ?1 AND organization_id = ?2 AND is_active = 1
            "#,
        )
        .bind(&command.product_id)
        .bind(&ctx.organization_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(required_points) = required_points else {
            tx.rollback().await?;
            return Ok(LedgerOutcome::Rejected {
                reason: format!("reward {} is not available", command.product_id),
            });
        };

        let debited = sqlx::query(
            r#"
            UPDATE memberships
            SET available_points = available_points - ?3,
                total_redeemed = total_redeemed + ?3,
                updated_at = ?4
            WHERE customer_id = ?1 AND organization_id = ?2
              AND is_active = 1
              AND available_points >= ?3
            "#,
        )
        .bind(&command.customer_id)
        .bind(&ctx.organization_id)
        .bind(required_points)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            let current =
                find_membership_on(&mut tx, &command.customer_id, &ctx.organization_id).await?;
            tx.rollback().await?;

            return Ok(match current {
                Some(membership) if membership.active => LedgerOutcome::InsufficientPoints {
                    available: membership.available_points,
                    required: required_points,
                },
                _ => LedgerOutcome::MembershipMissing,
            });
        }

        let line: Option<(String, String)> = sqlx::query_as(
            r#"
            SELECT id, branch_id FROM stock_lines
            WHERE product_id = ?1 AND quantity > 0
            ORDER BY (branch_id = ?2) DESC, branch_id ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(&command.product_id)
        .bind(&ctx.branch_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((stock_line_id, stock_branch_id)) = line else {
            tx.rollback().await?;
            return Ok(LedgerOutcome::OutOfStock {
                product_id: command.product_id.clone(),
            });
        };

        let taken = sqlx::query(
            r#"
            UPDATE stock_lines
            SET quantity = quantity - 1, updated_at = ?2
            WHERE id = ?1 AND quantity > 0
            "#,
        )
        .bind(&stock_line_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if taken.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(LedgerOutcome::OutOfStock {
                product_id: command.product_id.clone(),
            });
        }

        let transaction_id = generate_id();

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, kind, idempotency_token, customer_id, organization_id,
                branch_id, cashier_id, amount_cents, points_earned, points_spent,
                product_id, stock_line_id, rule_id, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 0, ?8, ?9, ?10, NULL, NULL, ?11)
            "#,
        )
        .bind(&transaction_id)
        .bind(TransactionKind::Redemption)
        .bind(command.token.as_str())
        .bind(&command.customer_id)
        .bind(&ctx.organization_id)
        .bind(&stock_branch_id)
        .bind(&ctx.cashier_id)
        .bind(required_points)
        .bind(&command.product_id)
        .bind(&stock_line_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        bind_token(&mut tx, command.token.as_str(), &transaction_id).await?;

        let transaction = load_transaction(&mut tx, &transaction_id).await?;
        let membership = membership_after(&mut tx, &command.customer_id, &ctx.organization_id).await?;

        tx.commit().await?;

        info!(
            transaction_id = %transaction_id,
            customer_id = %command.customer_id,
            product_id = %command.product_id,
            stock_line_id = %stock_line_id,
            points = required_points,
            "Redemption committed"
        );

        Ok(LedgerOutcome::Applied {
            transaction,
            membership,
            replayed: false,
        })
    }

    /// Looks up the transaction recorded under an idempotency token, with
    /// the membership as it is now.
    pub async fn find_by_token(
        &self,
        token: &IdempotencyToken,
    ) -> DbResult<Option<(Transaction, Membership)>> {
        debug!(token = %token, "Looking up transaction by token");

        let mut conn = self.pool.acquire().await?;

        let Some(transaction) = load_by_token(&mut conn, token.as_str()).await? else {
            return Ok(None);
        };

        let organization_id = match &transaction {
            Transaction::Purchase(p) => p.organization_id.clone(),
            Transaction::Redemption(r) => r.organization_id.clone(),
        };
        let membership = membership_after(&mut conn, transaction.customer_id(), &organization_id).await?;

        Ok(Some((transaction, membership)))
    }

    /// Transactions of one membership, newest first.
    pub async fn list_for_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
        limit: u32,
    ) -> DbResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions \
             WHERE customer_id = ?1 AND organization_id = ?2 \
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            TRANSACTION_COLUMNS
        );

        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .bind(organization_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// Deletes idempotency records that expired at or before `now`.
    ///
    /// Commits also do this on their own; this is for maintenance.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let purged = purge_on(&mut conn, now.timestamp_millis()).await?;

        debug!(purged, "Purged expired idempotency records");
        Ok(purged)
    }

    /// Memberships whose counters disagree with their transaction log.
    ///
    /// Empty on a healthy ledger.
    pub async fn audit(&self) -> DbResult<Vec<AuditDiscrepancy>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT * FROM (
                SELECT m.customer_id, m.organization_id, m.available_points,
                       m.total_earned, m.total_redeemed, m.is_active,
                       COALESCE((SELECT SUM(t.points_earned) FROM transactions t
                                 WHERE t.customer_id = m.customer_id
                                   AND t.organization_id = m.organization_id), 0)
                           AS ledger_earned,
                       COALESCE((SELECT SUM(t.points_spent) FROM transactions t
                                 WHERE t.customer_id = m.customer_id
                                   AND t.organization_id = m.organization_id), 0)
                           AS ledger_redeemed
                FROM memberships m
            )
            WHERE total_earned != ledger_earned
               OR total_redeemed != ledger_redeemed
               OR available_points != total_earned - total_redeemed
               OR available_points < 0
            ORDER BY customer_id, organization_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let discrepancies: Vec<AuditDiscrepancy> = rows
            .into_iter()
            .map(|row| AuditDiscrepancy {
                membership: Membership {
                    customer_id: row.customer_id,
                    organization_id: row.organization_id,
                    available_points: row.available_points,
                    total_earned: row.total_earned,
                    total_redeemed: row.total_redeemed,
                    active: row.is_active,
                },
                ledger_earned: row.ledger_earned,
                ledger_redeemed: row.ledger_redeemed,
            })
            .collect();

        if !discrepancies.is_empty() {
            warn!(count = discrepancies.len(), "Ledger audit found discrepancies");
        }

        Ok(discrepancies)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
