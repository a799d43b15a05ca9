//! # Customer Repository
//!
//! Read access to customer identities.
//!
//! Customers are created by the customer app and are read-only for the
//! register; `insert` exists for the seed tool and tests.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use loyalty_core::CustomerIdentity;

/// Input for creating a customer row.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl From<CustomerRow> for CustomerIdentity {
    fn from(row: CustomerRow) -> Self {
        let display_name = CustomerIdentity::display_name_from(
            row.first_name.as_deref(),
            row.last_name.as_deref(),
            row.email.as_deref(),
        );
        CustomerIdentity {
            id: row.id,
            display_name,
            email: row.email,
        }
    }
}

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer identity by ID.
    ///
    /// ## Returns
    /// * `Ok(Some(identity))` - Customer exists
    /// * `Ok(None)` - No such customer
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CustomerIdentity>> {
        debug!(customer_id = %id, "Looking up customer");

        let row: Option<CustomerRow> = sqlx::query_as(
            r#"
            SELECT id, email, first_name, last_name
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CustomerIdentity::from))
    }

    /// Inserts a customer.
    pub async fn insert(&self, customer: &NewCustomer) -> DbResult<()> {
        debug!(customer_id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, email, first_name, last_name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.email)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts customers.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::test_support::{fixture, CUSTOMER};

    #[tokio::test]
    async fn test_get_by_id_builds_display_name() {
        let db = fixture().await;

        let identity = db.customers().get_by_id(CUSTOMER).await.unwrap().unwrap();
        assert_eq!(identity.display_name, "Ana Pérez");
        assert_eq!(identity.email.as_deref(), Some("ana@example.com"));

        assert!(db.customers().get_by_id("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_customer_is_unique_violation() {
        let db = fixture().await;

        let err = db
            .customers()
            .insert(&NewCustomer {
                id: CUSTOMER.to_string(),
                email: None,
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(db.customers().count().await.unwrap(), 1);
    }
}
