//! # Catalog Repository
//!
//! Reward products and their per-branch stock lines.
//!
//! Stock quantities are decremented only by the ledger's redemption commit;
//! `set_stock` is the restocking entry point used by the seed tool.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::generate_id;
use loyalty_core::{RewardProduct, StockLine};

/// Input for creating a reward product.
#[derive(Debug, Clone)]
pub struct NewRewardProduct {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub description: Option<String>,
    pub required_points: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    organization_id: String,
    name: String,
    description: Option<String>,
    required_points: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct StockLineRow {
    id: String,
    product_id: String,
    branch_id: String,
    quantity: i64,
}

impl From<StockLineRow> for StockLine {
    fn from(row: StockLineRow) -> Self {
        StockLine {
            id: row.id,
            product_id: row.product_id,
            branch_id: row.branch_id,
            quantity: row.quantity,
        }
    }
}

fn into_product(row: ProductRow, stock_lines: Vec<StockLine>) -> RewardProduct {
    RewardProduct {
        id: row.id,
        organization_id: row.organization_id,
        name: row.name,
        description: row.description,
        required_points: row.required_points,
        stock_lines,
    }
}

/// Repository for the reward catalog.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Lists an organization's active rewards, cheapest first.
    ///
    /// Products without stock are included; the register shows them as out
    /// of stock.
    pub async fn list_rewards(&self, organization_id: &str) -> DbResult<Vec<RewardProduct>> {
        debug!(organization_id = %organization_id, "Listing rewards");

        let products: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, organization_id, name, description, required_points
            FROM reward_products
            WHERE organization_id = ?1 AND is_active = 1
            ORDER BY required_points ASC, name ASC, id ASC
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        let lines: Vec<StockLineRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.product_id, s.branch_id, s.quantity
            FROM stock_lines s
            JOIN reward_products p ON p.id = s.product_id
            WHERE p.organization_id = ?1 AND p.is_active = 1
            ORDER BY s.branch_id ASC, s.id ASC
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_product: HashMap<String, Vec<StockLine>> = HashMap::new();
        for line in lines {
            by_product
                .entry(line.product_id.clone())
                .or_default()
                .push(StockLine::from(line));
        }

        Ok(products
            .into_iter()
            .map(|row| {
                let stock = by_product.remove(&row.id).unwrap_or_default();
                into_product(row, stock)
            })
            .collect())
    }

    /// Gets one product with its stock lines (active or not).
    pub async fn find_product(&self, product_id: &str) -> DbResult<Option<RewardProduct>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, organization_id, name, description, required_points
            FROM reward_products
            WHERE id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stock = self.stock_lines(product_id).await?;
        Ok(Some(into_product(row, stock)))
    }

    /// Stock lines of a product, by branch.
    pub async fn stock_lines(&self, product_id: &str) -> DbResult<Vec<StockLine>> {
        let lines: Vec<StockLineRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, branch_id, quantity
            FROM stock_lines
            WHERE product_id = ?1
            ORDER BY branch_id ASC, id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines.into_iter().map(StockLine::from).collect())
    }

    /// Inserts an active reward product.
    pub async fn insert_product(&self, product: &NewRewardProduct) -> DbResult<()> {
        debug!(product_id = %product.id, "Inserting reward product");

        sqlx::query(
            r#"
            INSERT INTO reward_products (
                id, organization_id, name, description, required_points, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.organization_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.required_points)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sets the stock a branch holds of a product, creating the line if
    /// needed. Returns the stock line id.
    pub async fn set_stock(&self, product_id: &str, branch_id: &str, quantity: i64) -> DbResult<String> {
        debug!(product_id = %product_id, branch_id = %branch_id, quantity, "Setting stock");

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO stock_lines (id, product_id, branch_id, quantity, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (product_id, branch_id)
            DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(generate_id())
        .bind(product_id)
        .bind(branch_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Retires a product from the catalog. Its transactions remain.
    pub async fn deactivate_product(&self, product_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE reward_products SET is_active = 0 WHERE id = ?1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_products(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reward_products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
