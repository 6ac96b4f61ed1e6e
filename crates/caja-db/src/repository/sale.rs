//! # Sale Repository (Checkout)
//!
//! Orchestrates the whole checkout write path on top of the pure core:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout(request)                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  settle()              ← pure; rejects before any write                 │
//! │  classify_breakdown()  ← pure; rejects ambiguous legs pre-write         │
//! │       │                                                                 │
//! │       ▼  one transaction (up to MAX_CAS_ATTEMPTS times)                 │
//! │  INSERT sale                                                            │
//! │  INSERT sale_items          (name + price snapshots)                    │
//! │  INSERT payment_entries     (tagged legs)                               │
//! │  one SALE movement per line (stock ledger, all-or-nothing)              │
//! │  debt increase if owed      (debt ledger, CAS)                          │
//! │       │                                                                 │
//! │       ├── any CAS conflict → ROLLBACK everything, retry                 │
//! │       └── COMMIT                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A retry recomputes the settlement from scratch: a conflicting write may
//! have consumed the last unit, and the fresh read must see it. If any line
//! lacks stock the whole checkout fails; no partial movements survive.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use caja_core::classifier::{self, SaleAnchors};
use caja_core::config::LedgerConfig;
use caja_core::debt::{self, DebtState};
use caja_core::money::{ExchangeRate, Usd};
use caja_core::settlement::{settle, Settlement};
use caja_core::types::{
    Cart, DiscountRate, MovementKind, PaymentBreakdownEntry, PaymentEntry, PaymentInstrument,
    PaymentType, Sale, SaleItem, StockMovement,
};
use caja_core::{CoreError, ValidationError};

use crate::error::{DbError, DbResult};
use crate::repository::debt::{apply_debt_on, insert_breakdown_on, load_customer_on};
use crate::repository::stock::{apply_movement_on, MovementRequest};
use crate::repository::{CasOutcome, MAX_CAS_ATTEMPTS};

// =============================================================================
// Request / Outcome
// =============================================================================

/// Everything checkout needs, captured before any write.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub cart: Cart,
    pub payment_type: PaymentType,
    pub discount: DiscountRate,
    /// Amount tendered in USD terms.
    pub amount_paid: Usd,
    /// Rate active at checkout; frozen onto the sale.
    pub rate: ExchangeRate,
    /// Required when the settlement leaves debt.
    pub customer_id: Option<String>,
    /// Single-instrument shorthand for non-mixed sales.
    pub payment_method: Option<PaymentInstrument>,
    /// Instrument legs for mixed sales; empty otherwise.
    pub breakdown: Vec<PaymentEntry>,
}

/// The committed result of a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub movements: Vec<StockMovement>,
    pub settlement: Settlement,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sales and the checkout transaction.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Runs a full checkout. See the module docs for the write path.
    pub async fn checkout(
        &self,
        request: &CheckoutRequest,
        config: &LedgerConfig,
    ) -> DbResult<CheckoutOutcome> {
        // Which guarded row lost the race last, for the exhaustion error.
        let mut last_conflict: (&'static str, String) = ("Sale", "checkout".to_string());

        'attempts: for attempt in 1..=MAX_CAS_ATTEMPTS {
            let settlement = settle(
                &request.cart,
                request.payment_type,
                request.discount,
                request.amount_paid,
                request.rate,
                config,
            )?;

            if settlement.debt_usd.is_positive() && request.customer_id.is_none() {
                return Err(CoreError::from(ValidationError::Required {
                    field: "customer_id",
                })
                .into());
            }

            let anchors = SaleAnchors::new(
                settlement.total_usd,
                settlement.amount_paid_usd,
                request.rate,
            );
            let classified = classifier::classify_breakdown(
                &request.breakdown,
                &anchors,
                config.classifier_tolerance_cents,
            )?;

            let now = Utc::now();
            let mut tx = self.pool.begin().await?;

            let sale = Sale {
                id: Uuid::new_v4().to_string(),
                customer_id: request.customer_id.clone(),
                status: settlement.status,
                payment_type: request.payment_type,
                payment_method: request.payment_method,
                subtotal_usd_cents: settlement.subtotal_usd.cents(),
                discount_bps: request.discount.bps() as i64,
                total_usd_cents: settlement.total_usd.cents(),
                total_ves_cents: settlement.total_ves.cents(),
                exchange_rate_scaled: request.rate.scaled(),
                amount_paid_usd_cents: settlement.amount_paid_usd.cents(),
                amount_paid_ves_cents: settlement.amount_paid_ves.cents(),
                debt_usd_cents: settlement.debt_usd.cents(),
                created_at: now,
                updated_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO sales
                    (id, customer_id, status, payment_type, payment_method,
                     subtotal_usd_cents, discount_bps, total_usd_cents, total_ves_cents,
                     exchange_rate_scaled, amount_paid_usd_cents, amount_paid_ves_cents,
                     debt_usd_cents, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
            )
            .bind(&sale.id)
            .bind(&sale.customer_id)
            .bind(sale.status)
            .bind(sale.payment_type)
            .bind(sale.payment_method)
            .bind(sale.subtotal_usd_cents)
            .bind(sale.discount_bps)
            .bind(sale.total_usd_cents)
            .bind(sale.total_ves_cents)
            .bind(sale.exchange_rate_scaled)
            .bind(sale.amount_paid_usd_cents)
            .bind(sale.amount_paid_ves_cents)
            .bind(sale.debt_usd_cents)
            .bind(sale.created_at)
            .bind(sale.updated_at)
            .execute(&mut *tx)
            .await?;

            let mut items = Vec::with_capacity(request.cart.lines.len());
            for line in &request.cart.lines {
                let item = SaleItem {
                    id: Uuid::new_v4().to_string(),
                    sale_id: sale.id.clone(),
                    product_id: line.product_id.clone(),
                    name_snapshot: line.name.clone(),
                    unit_price_usd_cents: line.unit_price_cents,
                    quantity: line.quantity,
                    line_total_usd_cents: line.line_total().cents(),
                    created_at: now,
                };

                sqlx::query(
                    r#"
                    INSERT INTO sale_items
                        (id, sale_id, product_id, name_snapshot, unit_price_usd_cents,
                         quantity, line_total_usd_cents, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(&item.id)
                .bind(&item.sale_id)
                .bind(&item.product_id)
                .bind(&item.name_snapshot)
                .bind(item.unit_price_usd_cents)
                .bind(item.quantity)
                .bind(item.line_total_usd_cents)
                .bind(item.created_at)
                .execute(&mut *tx)
                .await?;

                items.push(item);
            }

            for leg in &classified {
                insert_breakdown_on(&mut tx, Some(&sale.id), None, leg, now).await?;
            }

            // One SALE movement per line, all inside this transaction. A CAS
            // conflict on any line rolls the whole checkout back.
            let mut movements = Vec::with_capacity(request.cart.lines.len());
            for line in &request.cart.lines {
                let movement_request = MovementRequest {
                    product_id: line.product_id.clone(),
                    kind: MovementKind::Sale,
                    quantity: line.quantity,
                    reference: format!("sale:{}", sale.id),
                    unit_cost: None,
                    notes: None,
                };

                match apply_movement_on(&mut tx, &movement_request, config, now).await? {
                    CasOutcome::Applied(movement) => movements.push(movement),
                    CasOutcome::Conflict => {
                        tx.rollback().await?;
                        last_conflict = ("Product", line.product_id.clone());
                        debug!(
                            product_id = %line.product_id,
                            attempt,
                            "Checkout lost stock race, retrying"
                        );
                        continue 'attempts;
                    }
                }
            }

            if settlement.debt_usd.is_positive() {
                if let Some(customer_id) = &request.customer_id {
                    let customer = load_customer_on(&mut tx, customer_id).await?;
                    let state = DebtState::new(customer.total_debt(), customer.debt_since);
                    let new_state = debt::record_sale(state, settlement.debt_usd, now);

                    match apply_debt_on(&mut tx, &customer, new_state, now).await? {
                        CasOutcome::Applied(()) => {}
                        CasOutcome::Conflict => {
                            tx.rollback().await?;
                            last_conflict = ("Customer", customer_id.clone());
                            debug!(
                                customer_id = %customer_id,
                                attempt,
                                "Checkout lost debt race, retrying"
                            );
                            continue 'attempts;
                        }
                    }
                }
            }

            tx.commit().await?;
            info!(
                sale_id = %sale.id,
                total_usd_cents = sale.total_usd_cents,
                debt_usd_cents = sale.debt_usd_cents,
                status = ?sale.status,
                "Checkout committed"
            );
            return Ok(CheckoutOutcome {
                sale,
                items,
                movements,
                settlement,
            });
        }

        let (entity, id) = last_conflict;
        Err(CoreError::ConcurrencyConflict { entity, id }.into())
    }

    /// Fetches a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, customer_id, status, payment_type, payment_method,
                   subtotal_usd_cents, discount_bps, total_usd_cents, total_ves_cents,
                   exchange_rate_scaled, amount_paid_usd_cents, amount_paid_ves_cents,
                   debt_usd_cents, created_at, updated_at
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Line items of a sale, in insertion order.
    pub async fn items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            r#"
            SELECT id, sale_id, product_id, name_snapshot, unit_price_usd_cents,
                   quantity, line_total_usd_cents, created_at
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Breakdown legs of a sale.
    pub async fn payment_entries(&self, sale_id: &str) -> DbResult<Vec<PaymentBreakdownEntry>> {
        let entries = sqlx::query_as::<_, PaymentBreakdownEntry>(
            r#"
            SELECT id, sale_id, payment_id, instrument, amount_minor, currency,
                   amount_usd_cents, amount_ves_cents, created_at
            FROM payment_entries
            WHERE sale_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Sales within `[from, to)`, oldest first.
    pub async fn sales_in_range(
        &self,
        from: chrono::DateTime<Utc>,
        to: chrono::DateTime<Utc>,
    ) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, customer_id, status, payment_type, payment_method,
                   subtotal_usd_cents, discount_bps, total_usd_cents, total_ves_cents,
                   exchange_rate_scaled, amount_paid_usd_cents, amount_paid_ves_cents,
                   debt_usd_cents, created_at, updated_at
            FROM sales
            WHERE created_at >= ?1 AND created_at < ?2
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use caja_core::types::{CartLine, Currency, PaymentStatus};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn rate() -> ExchangeRate {
        ExchangeRate::from_scaled(40_0000).unwrap()
    }

    /// Creates a product with initial stock via the ledger and returns its ID.
    async fn seeded_product(db: &Database, name: &str, price_cents: i64, stock: i64) -> String {
        let product = db
            .products()
            .create(name, Usd::from_cents(price_cents))
            .await
            .unwrap();
        db.stock()
            .apply_movement(
                &MovementRequest {
                    product_id: product.id.clone(),
                    kind: MovementKind::In,
                    quantity: stock,
                    reference: "delivery:test".into(),
                    unit_cost: None,
                    notes: None,
                },
                &LedgerConfig::default(),
            )
            .await
            .unwrap();
        product.id
    }

    fn line(product_id: &str, name: &str, price_cents: i64, quantity: i64) -> CartLine {
        CartLine {
            product_id: product_id.to_string(),
            name: name.to_string(),
            unit_price_cents: price_cents,
            quantity,
        }
    }

    fn full_cash(cart: Cart, paid_cents: i64) -> CheckoutRequest {
        CheckoutRequest {
            cart,
            payment_type: PaymentType::Full,
            discount: DiscountRate::zero(),
            amount_paid: Usd::from_cents(paid_cents),
            rate: rate(),
            customer_id: None,
            payment_method: Some(PaymentInstrument::CashUsd),
            breakdown: vec![],
        }
    }

    #[tokio::test]
    async fn test_full_checkout_moves_stock_and_records_sale() {
        let db = test_db().await;
        let p1 = seeded_product(&db, "Harina PAN", 1000, 5).await;
        let p2 = seeded_product(&db, "Café", 350, 10).await;

        let cart = Cart::new(vec![
            line(&p1, "Harina PAN", 1000, 2),
            line(&p2, "Café", 350, 1),
        ]);
        let outcome = db
            .sales()
            .checkout(&full_cash(cart, 0), &LedgerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome.sale.total_usd_cents, 2350);
        assert_eq!(outcome.sale.status, PaymentStatus::Paid);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.movements.len(), 2);

        // Stock moved per line and chains from its previous balance
        let after = db.products().get_by_id(&p1).await.unwrap().unwrap();
        assert_eq!(after.stock, 3);
        assert!(db.stock().stock_matches_ledger(&p1).await.unwrap());
        assert_eq!(
            outcome.movements[0].reference,
            format!("sale:{}", outcome.sale.id)
        );

        // Snapshots survive later catalog edits
        db.products()
            .update_price(&p1, Usd::from_cents(9999))
            .await
            .unwrap();
        let items = db.sales().items(&outcome.sale.id).await.unwrap();
        assert_eq!(items[0].unit_price_usd_cents, 1000);
    }

    #[tokio::test]
    async fn test_partial_checkout_creates_debt() {
        let db = test_db().await;
        let p = seeded_product(&db, "Arroz", 1000, 10).await;
        let customer = db.debts().create_customer("María").await.unwrap();

        // total 18.00 (10% off 20.00), paid 10.00 → debt 8.00
        let request = CheckoutRequest {
            cart: Cart::new(vec![line(&p, "Arroz", 1000, 2)]),
            payment_type: PaymentType::Partial,
            discount: DiscountRate::from_percentage(10.0).unwrap(),
            amount_paid: Usd::from_cents(1000),
            rate: rate(),
            customer_id: Some(customer.id.clone()),
            payment_method: Some(PaymentInstrument::CashUsd),
            breakdown: vec![],
        };
        let outcome = db
            .sales()
            .checkout(&request, &LedgerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome.sale.total_usd_cents, 1800);
        assert_eq!(outcome.sale.total_ves_cents, 72_000);
        assert_eq!(outcome.sale.debt_usd_cents, 800);
        assert_eq!(outcome.sale.status, PaymentStatus::Partial);

        let after = db.debts().get_customer(&customer.id).await.unwrap().unwrap();
        assert_eq!(after.total_debt_cents, 800);
        assert!(after.debt_since.is_some());

        // the projection matches the audit trail
        let rebuilt = db.debts().rebuild_debt(&customer.id).await.unwrap();
        assert_eq!(rebuilt.cents(), 800);
    }

    #[tokio::test]
    async fn test_debt_without_customer_rejected_before_writes() {
        let db = test_db().await;
        let p = seeded_product(&db, "Azúcar", 1000, 10).await;

        let request = CheckoutRequest {
            cart: Cart::new(vec![line(&p, "Azúcar", 1000, 1)]),
            payment_type: PaymentType::Credit,
            discount: DiscountRate::zero(),
            amount_paid: Usd::zero(),
            rate: rate(),
            customer_id: None,
            payment_method: None,
            breakdown: vec![],
        };
        let err = db
            .sales()
            .checkout(&request, &LedgerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));

        // nothing written, stock untouched
        let after = db.products().get_by_id(&p).await.unwrap().unwrap();
        assert_eq!(after.stock, 10);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_aborts_whole_cart() {
        let db = test_db().await;
        let p1 = seeded_product(&db, "Harina PAN", 1000, 10).await;
        let p2 = seeded_product(&db, "Café", 350, 1).await;

        let cart = Cart::new(vec![
            line(&p1, "Harina PAN", 1000, 2),
            line(&p2, "Café", 350, 3), // only 1 in stock
        ]);
        let err = db
            .sales()
            .checkout(&full_cash(cart, 0), &LedgerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { .. })
        ));

        // the first line's movement must not survive the abort
        let after = db.products().get_by_id(&p1).await.unwrap().unwrap();
        assert_eq!(after.stock, 10);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_mixed_checkout_persists_tagged_breakdown() {
        let db = test_db().await;
        let p = seeded_product(&db, "Queso", 1800, 5).await;

        let request = CheckoutRequest {
            cart: Cart::new(vec![line(&p, "Queso", 1800, 1)]),
            payment_type: PaymentType::Mixed,
            discount: DiscountRate::zero(),
            amount_paid: Usd::from_cents(1800),
            rate: rate(),
            customer_id: None,
            payment_method: None,
            breakdown: vec![
                PaymentEntry {
                    instrument: PaymentInstrument::CashUsd,
                    amount_minor: 1000,
                    currency: Some(Currency::Usd),
                },
                PaymentEntry {
                    instrument: PaymentInstrument::MobileTransfer,
                    amount_minor: 32_000,
                    currency: Some(Currency::Ves),
                },
            ],
        };
        let outcome = db
            .sales()
            .checkout(&request, &LedgerConfig::default())
            .await
            .unwrap();

        let entries = db.sales().payment_entries(&outcome.sale.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].currency, Some(Currency::Usd));
        assert_eq!(entries[1].currency, Some(Currency::Ves));
        assert_eq!(entries[1].amount_usd_cents, Some(800)); // Bs 320.00 / 40
    }

    #[tokio::test]
    async fn test_mixed_overpayment_change_due() {
        let db = test_db().await;
        let p = seeded_product(&db, "Pan", 1800, 5).await;

        let request = CheckoutRequest {
            cart: Cart::new(vec![line(&p, "Pan", 1800, 1)]),
            payment_type: PaymentType::Mixed,
            discount: DiscountRate::zero(),
            amount_paid: Usd::from_cents(2000),
            rate: rate(),
            customer_id: None,
            payment_method: None,
            breakdown: vec![PaymentEntry {
                instrument: PaymentInstrument::CashUsd,
                amount_minor: 2000,
                currency: Some(Currency::Usd),
            }],
        };
        let outcome = db
            .sales()
            .checkout(&request, &LedgerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome.settlement.change_usd.cents(), 200);
        assert_eq!(outcome.sale.amount_paid_usd_cents, 1800);
        assert_eq!(outcome.sale.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_never_oversell() {
        let db = test_db().await;
        let p = seeded_product(&db, "Último", 1000, 3).await;

        // Two registers racing for 2 units each of a 3-unit product. Exactly
        // one wins; the loser sees InsufficientStock, never negative stock.
        let mut handles = Vec::new();
        for _ in 0..2 {
            let db = db.clone();
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                db.sales()
                    .checkout(
                        &full_cash(Cart::new(vec![line(&p, "Último", 1000, 2)]), 0),
                        &LedgerConfig::default(),
                    )
                    .await
            }));
        }

        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DbError::Core(CoreError::InsufficientStock { .. })) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(insufficient, 1);

        let after = db.products().get_by_id(&p).await.unwrap().unwrap();
        assert_eq!(after.stock, 1);
        assert!(db.stock().stock_matches_ledger(&p).await.unwrap());
    }

    #[tokio::test]
    async fn test_sales_in_range() {
        let db = test_db().await;
        let p = seeded_product(&db, "Leche", 200, 20).await;

        db.sales()
            .checkout(
                &full_cash(Cart::new(vec![line(&p, "Leche", 200, 1)]), 0),
                &LedgerConfig::default(),
            )
            .await
            .unwrap();

        let now = Utc::now();
        let sales = db
            .sales()
            .sales_in_range(now - chrono::Duration::hours(1), now + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(sales.len(), 1);

        let none = db
            .sales()
            .sales_in_range(now + chrono::Duration::hours(1), now + chrono::Duration::hours(2))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
