//! # Product Repository
//!
//! Catalog reads and writes. Stock mutations do NOT live here — every change
//! to `products.stock` goes through the [`crate::repository::stock`] ledger
//! so the movement audit trail stays complete.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use caja_core::config::LedgerConfig;
use caja_core::money::Usd;
use caja_core::types::Product;
use caja_core::{validation, CoreError};

use crate::error::{DbError, DbResult};

/// Repository for product catalog operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product with zero stock. Initial inventory arrives through
    /// an IN movement on the stock ledger, never by writing `stock` directly.
    pub async fn create(&self, name: &str, price: Usd) -> DbResult<Product> {
        if name.trim().is_empty() {
            return Err(CoreError::from(caja_core::ValidationError::Required {
                field: "name",
            })
            .into());
        }
        validation::validate_price_cents(price.cents()).map_err(CoreError::from)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            price_usd_cents: price.cents(),
            stock: 0,
            version: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO products
                (id, name, price_usd_cents, stock, version, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_usd_cents)
        .bind(product.stock)
        .bind(product.version)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Fetches a product by ID, including inactive ones (history screens
    /// still need them).
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price_usd_cents, stock, version, is_active,
                   created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists active products, newest first.
    pub async fn list_active(&self, limit: i64) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price_usd_cents, stock, version, is_active,
                   created_at, updated_at
            FROM products
            WHERE is_active = 1
            ORDER BY created_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Active products at or below the configured low-stock threshold,
    /// most depleted first.
    pub async fn low_stock(&self, config: &LedgerConfig) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price_usd_cents, stock, version, is_active,
                   created_at, updated_at
            FROM products
            WHERE is_active = 1 AND stock <= ?1
            ORDER BY stock ASC, name ASC
            "#,
        )
        .bind(config.low_stock_threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Updates the catalog price. Does not touch existing sale items; they
    /// carry their own price snapshot.
    pub async fn update_price(&self, id: &str, price: Usd) -> DbResult<()> {
        validation::validate_price_cents(price.cents()).map_err(CoreError::from)?;

        let result = sqlx::query(
            "UPDATE products SET price_usd_cents = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(price.cents())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Soft-deletes a product. Movements and sale items keep referencing it.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE products SET is_active = 0, updated_at = ?1 WHERE id = ?2")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        debug!(product_id = %id, "Product deactivated");
        Ok(())
    }

    /// Counts active products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let db = test_db().await;
        let repo = db.products();

        let created = repo.create("Harina PAN", Usd::from_cents(150)).await.unwrap();
        assert_eq!(created.stock, 0);
        assert_eq!(created.version, 0);

        let fetched = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Harina PAN");
        assert_eq!(fetched.price_usd_cents, 150);
        assert!(fetched.is_active);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name_and_negative_price() {
        let db = test_db().await;
        let repo = db.products();

        assert!(repo.create("   ", Usd::from_cents(100)).await.is_err());
        assert!(repo.create("Café", Usd::from_cents(-1)).await.is_err());
    }

    #[tokio::test]
    async fn test_list_active_excludes_deactivated() {
        let db = test_db().await;
        let repo = db.products();

        let a = repo.create("Arroz", Usd::from_cents(100)).await.unwrap();
        repo.create("Azúcar", Usd::from_cents(120)).await.unwrap();
        repo.deactivate(&a.id).await.unwrap();

        let active = repo.list_active(10).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Azúcar");
        assert_eq!(repo.count().await.unwrap(), 1);

        // Deactivated products are still fetchable by ID
        assert!(repo.get_by_id(&a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_price_missing_product() {
        let db = test_db().await;
        let err = db
            .products()
            .update_price("nope", Usd::from_cents(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
