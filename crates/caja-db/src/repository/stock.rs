//! # Stock Ledger
//!
//! The append-only inventory audit trail plus the cached `products.stock`
//! projection, kept consistent under concurrency.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_movement(request)                                                │
//! │       │                                                                 │
//! │       ▼  (up to MAX_CAS_ATTEMPTS times)                                 │
//! │  BEGIN                                                                  │
//! │    SELECT stock, version FROM products WHERE id = ?        ── read      │
//! │    caja_core::stock::apply_movement(...)                   ── compute   │
//! │    INSERT INTO stock_movements (previous, new, ...)        ── audit     │
//! │    UPDATE products SET stock, version = version + 1                     │
//! │      WHERE id = ? AND version = ?                          ── CAS       │
//! │       │                                                                 │
//! │       ├── rows_affected = 1 → COMMIT, done                              │
//! │       └── rows_affected = 0 → ROLLBACK, retry from fresh read           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two registers selling the last unit: one transaction's CAS update loses,
//! retries from the fresh read, and fails with `InsufficientStock`. Stock
//! never goes negative unless configuration explicitly allows it, and then
//! the movement's notes flag it.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use caja_core::config::LedgerConfig;
use caja_core::money::Usd;
use caja_core::stock;
use caja_core::types::{MovementKind, StockMovement};
use caja_core::{validation, CoreError};

use crate::error::{DbError, DbResult};
use crate::repository::{CasOutcome, MAX_CAS_ATTEMPTS};

/// A request to record one inventory movement.
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub product_id: String,
    pub kind: MovementKind,
    /// Positive for IN/OUT/SALE; signed for ADJUSTMENT.
    pub quantity: i64,
    /// What caused the movement (sale id, delivery note, count reference).
    pub reference: String,
    /// Unit cost snapshot, usually only for IN movements.
    pub unit_cost: Option<Usd>,
    pub notes: Option<String>,
}

/// Repository for the stock movement ledger.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Records a movement and updates the product's stock, atomically.
    ///
    /// Retries version conflicts up to [`MAX_CAS_ATTEMPTS`] times; each retry
    /// re-reads the stock and re-checks availability, so a conflicting write
    /// can flip the outcome from success to `InsufficientStock` (correctly).
    pub async fn apply_movement(
        &self,
        request: &MovementRequest,
        config: &LedgerConfig,
    ) -> DbResult<StockMovement> {
        validation::validate_reference(&request.reference).map_err(CoreError::from)?;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut tx = self.pool.begin().await?;

            match apply_movement_on(&mut tx, request, config, Utc::now()).await? {
                CasOutcome::Applied(movement) => {
                    tx.commit().await?;
                    debug!(
                        product_id = %request.product_id,
                        kind = ?request.kind,
                        previous = movement.previous_stock,
                        new = movement.new_stock,
                        "Stock movement applied"
                    );
                    return Ok(movement);
                }
                CasOutcome::Conflict => {
                    tx.rollback().await?;
                    debug!(
                        product_id = %request.product_id,
                        attempt,
                        "Stock version conflict, retrying"
                    );
                }
            }
        }

        Err(CoreError::ConcurrencyConflict {
            entity: "Product",
            id: request.product_id.clone(),
        }
        .into())
    }

    /// Movement history for a product, newest first.
    pub async fn movements_for_product(
        &self,
        product_id: &str,
        limit: i64,
    ) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, kind, quantity, previous_stock, new_stock,
                   reference, unit_cost_usd_cents, notes, created_at
            FROM stock_movements
            WHERE product_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// The most recent movement for a product, if any.
    pub async fn latest_movement(&self, product_id: &str) -> DbResult<Option<StockMovement>> {
        let movement = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, kind, quantity, previous_stock, new_stock,
                   reference, unit_cost_usd_cents, notes, created_at
            FROM stock_movements
            WHERE product_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(movement)
    }

    /// Consistency audit: does `products.stock` equal the latest movement's
    /// `new_stock`? A product with no movements passes iff its stock is 0.
    pub async fn stock_matches_ledger(&self, product_id: &str) -> DbResult<bool> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        let stock = stock.ok_or_else(|| DbError::not_found("Product", product_id))?;

        match self.latest_movement(product_id).await? {
            Some(movement) => Ok(movement.new_stock == stock),
            None => Ok(stock == 0),
        }
    }
}

// =============================================================================
// Transaction-Scoped Application
// =============================================================================

/// Applies one movement inside an existing transaction: read, compute via
/// the core transition math, append the audit row, CAS-update the product.
///
/// On `Conflict` the caller must roll the transaction back — the audit row
/// written here must not survive a lost race.
pub(crate) async fn apply_movement_on(
    conn: &mut SqliteConnection,
    request: &MovementRequest,
    config: &LedgerConfig,
    now: DateTime<Utc>,
) -> DbResult<CasOutcome<StockMovement>> {
    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT stock, version FROM products WHERE id = ?1 AND is_active = 1")
            .bind(&request.product_id)
            .fetch_optional(&mut *conn)
            .await?;

    let (previous, version) = row.ok_or_else(|| DbError::not_found("Product", &request.product_id))?;

    let transition = stock::apply_movement(
        &request.product_id,
        previous,
        request.kind,
        request.quantity,
        config.allow_negative_stock,
    )?;

    let notes = if transition.went_negative {
        Some(match &request.notes {
            Some(n) => format!("{n}; stock went negative"),
            None => "stock went negative".to_string(),
        })
    } else {
        request.notes.clone()
    };

    let movement = StockMovement {
        id: Uuid::new_v4().to_string(),
        product_id: request.product_id.clone(),
        kind: request.kind,
        quantity: transition.stored_quantity,
        previous_stock: transition.previous,
        new_stock: transition.new,
        reference: request.reference.clone(),
        unit_cost_usd_cents: request.unit_cost.map(|c| c.cents()),
        notes,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO stock_movements
            (id, product_id, kind, quantity, previous_stock, new_stock,
             reference, unit_cost_usd_cents, notes, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(movement.kind)
    .bind(movement.quantity)
    .bind(movement.previous_stock)
    .bind(movement.new_stock)
    .bind(&movement.reference)
    .bind(movement.unit_cost_usd_cents)
    .bind(&movement.notes)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    match cas_update_stock(conn, &request.product_id, transition.new, version, now).await? {
        CasOutcome::Applied(()) => Ok(CasOutcome::Applied(movement)),
        CasOutcome::Conflict => Ok(CasOutcome::Conflict),
    }
}

/// The guarded projection write: applies only if the row still carries
/// `expected_version`, bumping it. `Conflict` means another writer got
/// there first and the caller's read is stale.
pub(crate) async fn cas_update_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    new_stock: i64,
    expected_version: i64,
    now: DateTime<Utc>,
) -> DbResult<CasOutcome<()>> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET stock = ?1, version = version + 1, updated_at = ?2
        WHERE id = ?3 AND version = ?4
        "#,
    )
    .bind(new_stock)
    .bind(now)
    .bind(product_id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(CasOutcome::Conflict);
    }

    Ok(CasOutcome::Applied(()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use caja_core::types::Product;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seeded_product(db: &Database, initial_stock: i64) -> Product {
        let product = db
            .products()
            .create("Harina PAN", Usd::from_cents(150))
            .await
            .unwrap();
        if initial_stock > 0 {
            db.stock()
                .apply_movement(
                    &MovementRequest {
                        product_id: product.id.clone(),
                        kind: MovementKind::In,
                        quantity: initial_stock,
                        reference: "delivery:test".into(),
                        unit_cost: Some(Usd::from_cents(100)),
                        notes: None,
                    },
                    &LedgerConfig::default(),
                )
                .await
                .unwrap();
        }
        db.products().get_by_id(&product.id).await.unwrap().unwrap()
    }

    fn sale_of(product_id: &str, quantity: i64) -> MovementRequest {
        MovementRequest {
            product_id: product_id.to_string(),
            kind: MovementKind::Sale,
            quantity,
            reference: "sale:test".into(),
            unit_cost: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_sale_movement_updates_stock_and_audit() {
        let db = test_db().await;
        let product = seeded_product(&db, 5).await;

        // stock 5, SALE quantity 2 → previous 5, new 3
        let movement = db
            .stock()
            .apply_movement(&sale_of(&product.id, 2), &LedgerConfig::default())
            .await
            .unwrap();
        assert_eq!(movement.previous_stock, 5);
        assert_eq!(movement.new_stock, 3);
        assert_eq!(movement.quantity, 2);

        let refreshed = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(refreshed.stock, 3);
        // version bumped by the IN seed and the sale
        assert_eq!(refreshed.version, 2);

        assert!(db.stock().stock_matches_ledger(&product.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_state_untouched() {
        let db = test_db().await;
        let product = seeded_product(&db, 3).await;

        let err = db
            .stock()
            .apply_movement(&sale_of(&product.id, 4), &LedgerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            })
        ));

        // Stock remains 3 and no movement row was committed
        let refreshed = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(refreshed.stock, 3);
        let movements = db
            .stock()
            .movements_for_product(&product.id, 10)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1); // only the IN seed
    }

    #[tokio::test]
    async fn test_negative_stock_allowed_and_flagged() {
        let db = test_db().await;
        let product = seeded_product(&db, 3).await;
        let config = LedgerConfig::default().allow_negative_stock(true);

        let movement = db
            .stock()
            .apply_movement(&sale_of(&product.id, 4), &config)
            .await
            .unwrap();
        assert_eq!(movement.new_stock, -1);
        assert!(movement.notes.as_deref().unwrap().contains("negative"));
    }

    #[tokio::test]
    async fn test_adjustment_carries_sign() {
        let db = test_db().await;
        let product = seeded_product(&db, 10).await;

        let movement = db
            .stock()
            .apply_movement(
                &MovementRequest {
                    product_id: product.id.clone(),
                    kind: MovementKind::Adjustment,
                    quantity: -4,
                    reference: "count:2026-08-25".into(),
                    unit_cost: None,
                    notes: Some("shrinkage".into()),
                },
                &LedgerConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(movement.new_stock, 6);
        assert_eq!(movement.quantity, 4); // stored as unsigned magnitude
    }

    #[tokio::test]
    async fn test_running_balance_chains_across_movements() {
        let db = test_db().await;
        let product = seeded_product(&db, 10).await;
        let ledger = db.stock();
        let config = LedgerConfig::default();

        ledger
            .apply_movement(&sale_of(&product.id, 3), &config)
            .await
            .unwrap();
        ledger
            .apply_movement(&sale_of(&product.id, 2), &config)
            .await
            .unwrap();

        // newest first: each previous_stock equals the next row's new_stock
        let movements = ledger.movements_for_product(&product.id, 10).await.unwrap();
        assert_eq!(movements.len(), 3);
        assert_eq!(movements[0].previous_stock, movements[1].new_stock);
        assert_eq!(movements[1].previous_stock, movements[2].new_stock);
        assert_eq!(movements[0].new_stock, 5);

        assert!(ledger.stock_matches_ledger(&product.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_version_write_conflicts_fresh_version_applies() {
        let db = test_db().await;
        let product = seeded_product(&db, 5).await;

        // a write carrying a version another register already consumed
        let mut tx = db.pool().begin().await.unwrap();
        let outcome = cas_update_stock(&mut tx, &product.id, 4, product.version - 1, Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, CasOutcome::Conflict));
        tx.rollback().await.unwrap();

        // the lost race leaves the projection untouched
        let after = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 5);
        assert_eq!(after.version, product.version);

        // a write from a fresh read applies and bumps the version
        let mut tx = db.pool().begin().await.unwrap();
        let outcome = cas_update_stock(&mut tx, &product.id, 4, product.version, Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, CasOutcome::Applied(())));
        tx.commit().await.unwrap();

        let after = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 4);
        assert_eq!(after.version, product.version + 1);

        // and the consumed version can never apply again
        let mut tx = db.pool().begin().await.unwrap();
        let outcome = cas_update_stock(&mut tx, &product.id, 99, product.version, Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, CasOutcome::Conflict));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_rolled_back_attempt_leaves_no_audit_row() {
        let db = test_db().await;
        let product = seeded_product(&db, 5).await;

        // the conflict discipline: an attempt whose transaction rolls back
        // must not leave its movement row behind
        let mut tx = db.pool().begin().await.unwrap();
        let outcome = apply_movement_on(
            &mut tx,
            &sale_of(&product.id, 2),
            &LedgerConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, CasOutcome::Applied(_)));
        tx.rollback().await.unwrap();

        let movements = db
            .stock()
            .movements_for_product(&product.id, 10)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1); // only the IN seed
        let after = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 5);
        assert!(db.stock().stock_matches_ledger(&product.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_movement_on_unknown_product() {
        let db = test_db().await;
        let err = db
            .stock()
            .apply_movement(&sale_of("missing", 1), &LedgerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_blank_reference_rejected() {
        let db = test_db().await;
        let product = seeded_product(&db, 5).await;

        let mut request = sale_of(&product.id, 1);
        request.reference = "   ".into();
        let err = db
            .stock()
            .apply_movement(&request, &LedgerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
    }
}
