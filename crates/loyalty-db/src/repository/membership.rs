//! # Membership Repository
//!
//! Membership lookup and enrollment.
//!
//! ## Enrollment Race
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Register A                         Register B                         │
//! │  ──────────                         ──────────                         │
//! │  find() → None                      find() → None                      │
//! │  insert_enrolled() → Ok  ◄── wins   insert_enrolled()                  │
//! │                                       → DbError::UniqueViolation       │
//! │                                     find() → Some(zero balance)        │
//! │                                                                         │
//! │  UNIQUE (customer_id, organization_id) decides; the loser re-reads.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Point counters are never written here: the ledger owns them.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::generate_id;
use loyalty_core::Membership;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MembershipRow {
    customer_id: String,
    organization_id: String,
    available_points: i64,
    total_earned: i64,
    total_redeemed: i64,
    is_active: bool,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Membership {
            customer_id: row.customer_id,
            organization_id: row.organization_id,
            available_points: row.available_points,
            total_earned: row.total_earned,
            total_redeemed: row.total_redeemed,
            active: row.is_active,
        }
    }
}

/// Reads a membership on a specific connection (inside a ledger transaction).
pub(crate) async fn find_on(
    conn: &mut SqliteConnection,
    customer_id: &str,
    organization_id: &str,
) -> DbResult<Option<Membership>> {
    let row: Option<MembershipRow> = sqlx::query_as(
        r#"
        SELECT customer_id, organization_id, available_points,
               total_earned, total_redeemed, is_active
        FROM memberships
        WHERE customer_id = ?1 AND organization_id = ?2
        "#,
    )
    .bind(customer_id)
    .bind(organization_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Membership::from))
}

/// Repository for membership database operations.
#[derive(Debug, Clone)]
pub struct MembershipRepository {
    pool: SqlitePool,
}

impl MembershipRepository {
    /// Creates a new MembershipRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MembershipRepository { pool }
    }

    /// Finds the membership of a customer with an organization.
    ///
    /// Inactive memberships are returned too; callers decide what inactive
    /// means for them.
    pub async fn find(&self, customer_id: &str, organization_id: &str) -> DbResult<Option<Membership>> {
        debug!(customer_id = %customer_id, organization_id = %organization_id, "Looking up membership");

        let mut conn = self.pool.acquire().await?;
        find_on(&mut conn, customer_id, organization_id).await
    }

    /// Creates an active, zero-balance membership.
    ///
    /// ## Returns
    /// * `Ok(membership)` - Newly enrolled
    /// * `Err(DbError::UniqueViolation)` - A membership already exists
    ///   (possibly created by a concurrent enrollment)
    pub async fn insert_enrolled(&self, customer_id: &str, organization_id: &str) -> DbResult<Membership> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO memberships (
                id, customer_id, organization_id,
                available_points, total_earned, total_redeemed,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, 0, 0, 0, 1, ?4, ?4)
            "#,
        )
        .bind(generate_id())
        .bind(customer_id)
        .bind(organization_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(customer_id = %customer_id, organization_id = %organization_id, "Membership enrolled");

        Ok(Membership::enrolled(customer_id, organization_id))
    }

    /// Reactivates an existing membership, keeping its balances.
    pub async fn reactivate(&self, customer_id: &str, organization_id: &str) -> DbResult<Membership> {
        self.set_active(customer_id, organization_id, true).await?;

        info!(customer_id = %customer_id, organization_id = %organization_id, "Membership reactivated");

        self.find(customer_id, organization_id)
            .await?
            .ok_or_else(|| DbError::not_found("Membership", customer_id))
    }

    /// Deactivates a membership. Balances are kept.
    pub async fn deactivate(&self, customer_id: &str, organization_id: &str) -> DbResult<()> {
        self.set_active(customer_id, organization_id, false).await?;

        info!(customer_id = %customer_id, organization_id = %organization_id, "Membership deactivated");
        Ok(())
    }

    async fn set_active(&self, customer_id: &str, organization_id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE memberships
            SET is_active = ?3, updated_at = ?4
            WHERE customer_id = ?1 AND organization_id = ?2
            "#,
        )
        .bind(customer_id)
        .bind(organization_id)
        .bind(active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Membership", customer_id));
        }

        Ok(())
    }
}
