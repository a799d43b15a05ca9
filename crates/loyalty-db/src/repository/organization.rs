//! # Organization Repository
//!
//! Organizations and their branches. Written by the seed tool; the register
//! only checks that its configured branch exists.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for organizations and branches.
#[derive(Debug, Clone)]
pub struct OrganizationRepository {
    pool: SqlitePool,
}

impl OrganizationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrganizationRepository { pool }
    }

    pub async fn insert_organization(&self, id: &str, name: &str) -> DbResult<()> {
        debug!(organization_id = %id, "Inserting organization");

        sqlx::query("INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert_branch(&self, id: &str, organization_id: &str, name: &str) -> DbResult<()> {
        debug!(branch_id = %id, organization_id = %organization_id, "Inserting branch");

        sqlx::query(
            "INSERT INTO branches (id, organization_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id)
        .bind(organization_id)
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// True when `branch_id` exists and belongs to `organization_id`.
    pub async fn branch_belongs_to(&self, branch_id: &str, organization_id: &str) -> DbResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM branches WHERE id = ?1 AND organization_id = ?2")
                .bind(branch_id)
                .bind(organization_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
