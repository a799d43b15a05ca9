//! # Points Rule Repository
//!
//! The reference rule engine behind the register.
//!
//! ## Rule Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A rule applies to (organization, branch, at) when:                    │
//! │    is_active = 1                                                       │
//! │    branch_id IS NULL (all branches) OR branch_id = branch              │
//! │    valid_from_ms  IS NULL OR valid_from_ms  <= at                      │
//! │    valid_until_ms IS NULL OR valid_until_ms >  at                      │
//! │                                                                         │
//! │  Several applicable rules: highest priority wins, then the higher      │
//! │  rate, then the lowest id.                                             │
//! │                                                                         │
//! │  points = floor(amount_cents × points_per_unit / 100)                  │
//! │  e.g. $10.00 at 10 pts/unit → 100 pts; at 5 pts/unit → 50 pts          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No applicable rule is `RuleEvaluation::NoActiveRule`; an applicable rule
//! paying 0 per unit evaluates to zero points.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use loyalty_core::{ActiveOffer, Money, RuleEvaluation};

/// Input for creating a points rule.
#[derive(Debug, Clone)]
pub struct NewPointsRule {
    pub id: String,
    pub organization_id: String,
    /// `None` applies the rule at every branch.
    pub branch_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub points_per_unit: i64,
    pub priority: i64,
    pub valid_from_ms: Option<i64>,
    pub valid_until_ms: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: String,
    branch_id: Option<String>,
    name: String,
    description: Option<String>,
    points_per_unit: i64,
}

impl From<RuleRow> for ActiveOffer {
    fn from(row: RuleRow) -> Self {
        ActiveOffer {
            id: row.id,
            name: row.name,
            description: row.description,
            points_per_unit: row.points_per_unit,
            branch_id: row.branch_id,
        }
    }
}

const APPLICABLE_RULES: &str = r#"
    SELECT id, branch_id, name, description, points_per_unit
    FROM points_rules
    WHERE organization_id = ?1
      AND is_active = 1
      AND (branch_id IS NULL OR branch_id = ?2)
      AND (valid_from_ms IS NULL OR valid_from_ms <= ?3)
      AND (valid_until_ms IS NULL OR valid_until_ms > ?3)
    ORDER BY priority DESC, points_per_unit DESC, id ASC
"#;

async fn applicable_rules(
    conn: &mut SqliteConnection,
    organization_id: &str,
    branch_id: &str,
    at: DateTime<Utc>,
) -> DbResult<Vec<RuleRow>> {
    let rows = sqlx::query_as(APPLICABLE_RULES)
        .bind(organization_id)
        .bind(branch_id)
        .bind(at.timestamp_millis())
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

/// Points a rule paying `points_per_unit` gives for `amount`.
pub fn points_for(amount: Money, points_per_unit: i64) -> i64 {
    amount.cents().max(0).saturating_mul(points_per_unit) / 100
}

/// Evaluates the rules on a specific connection.
///
/// The ledger calls this inside its commit transaction so the committed
/// points come from the rules as they are when the write is applied.
pub(crate) async fn evaluate_on(
    conn: &mut SqliteConnection,
    amount: Money,
    organization_id: &str,
    branch_id: &str,
    at: DateTime<Utc>,
) -> DbResult<RuleEvaluation> {
    let rules = applicable_rules(conn, organization_id, branch_id, at).await?;

    let Some(rule) = rules.into_iter().next() else {
        return Ok(RuleEvaluation::NoActiveRule);
    };

    Ok(RuleEvaluation::Evaluated {
        points: points_for(amount, rule.points_per_unit),
        rule_id: rule.id,
        rule_name: rule.name,
    })
}

/// Repository for points rules.
#[derive(Debug, Clone)]
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RuleRepository { pool }
    }

    /// Lists the offers running at a branch at a point in time.
    pub async fn active_offers(
        &self,
        organization_id: &str,
        branch_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<Vec<ActiveOffer>> {
        debug!(organization_id = %organization_id, branch_id = %branch_id, "Listing active offers");

        let mut conn = self.pool.acquire().await?;
        let rules = applicable_rules(&mut conn, organization_id, branch_id, at).await?;

        Ok(rules.into_iter().map(ActiveOffer::from).collect())
    }

    /// Evaluates the points an amount earns.
    pub async fn evaluate(
        &self,
        amount: Money,
        organization_id: &str,
        branch_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<RuleEvaluation> {
        debug!(
            organization_id = %organization_id,
            branch_id = %branch_id,
            amount = %amount,
            "Evaluating points"
        );

        let mut conn = self.pool.acquire().await?;
        evaluate_on(&mut conn, amount, organization_id, branch_id, at).await
    }

    /// Inserts a rule.
    pub async fn insert(&self, rule: &NewPointsRule) -> DbResult<()> {
        debug!(rule_id = %rule.id, "Inserting points rule");

        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO points_rules (
                id, organization_id, branch_id, name, description,
                points_per_unit, priority, is_active,
                valid_from_ms, valid_until_ms, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.organization_id)
        .bind(&rule.branch_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.points_per_unit)
        .bind(rule.priority)
        .bind(rule.valid_from_ms)
        .bind(rule.valid_until_ms)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Changes the rate of a rule.
    pub async fn set_points_per_unit(&self, rule_id: &str, points_per_unit: i64) -> DbResult<()> {
        debug!(rule_id = %rule_id, points_per_unit, "Changing rule rate");

        let result = sqlx::query(
            "UPDATE points_rules SET points_per_unit = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(rule_id)
        .bind(points_per_unit)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PointsRule", rule_id));
        }

        Ok(())
    }

    /// Switches a rule off.
    pub async fn deactivate(&self, rule_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE points_rules SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(rule_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PointsRule", rule_id));
        }

        Ok(())
    }
}
