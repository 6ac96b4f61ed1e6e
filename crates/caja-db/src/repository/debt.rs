//! # Debt Ledger
//!
//! Customer debt projection plus its audit trail.
//!
//! ## Data Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  customers.total_debt_cents  ← cached projection, CAS-guarded           │
//! │  customers.debt_since        ← set on 0 → positive, cleared on → 0      │
//! │                                                                         │
//! │  Audit trail (the truth):                                               │
//! │    sales.debt_usd_cents          + per sale, frozen at creation         │
//! │    payment_transactions.amount   - per payment, immutable               │
//! │                                                                         │
//! │  rebuild_debt() = max(0, Σ sale debt − Σ payments)                      │
//! │    must equal the cached projection at all times                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A payment may optionally reconcile a specific sale: the sale's
//! `amount_paid_*` and `status` move, but its totals, rate, and frozen
//! `debt_usd_cents` never do — rewriting those would corrupt the audit.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use caja_core::classifier::{self, SaleAnchors};
use caja_core::config::LedgerConfig;
use caja_core::debt::{self, DebtState};
use caja_core::money::{ExchangeRate, Usd};
use caja_core::types::{Customer, PaymentBreakdownEntry, PaymentEntry, PaymentTransaction};
use caja_core::{CoreError, ValidationError};

use crate::error::{DbError, DbResult};
use crate::repository::{CasOutcome, MAX_CAS_ATTEMPTS};

/// A request to record a customer's debt payment.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub customer_id: String,
    /// Payment amount in USD.
    pub amount: Usd,
    /// Rate active at payment time; frozen onto the transaction.
    pub rate: ExchangeRate,
    /// Sale to reconcile, if the payment targets one specifically.
    pub sale_id: Option<String>,
    pub note: Option<String>,
    /// Instrument legs; may be empty for a plain cash payment.
    pub breakdown: Vec<PaymentEntry>,
}

/// Repository for customer debt operations.
#[derive(Debug, Clone)]
pub struct DebtLedger {
    pool: SqlitePool,
}

impl DebtLedger {
    pub fn new(pool: SqlitePool) -> Self {
        DebtLedger { pool }
    }

    /// Creates a customer with zero debt.
    pub async fn create_customer(&self, name: &str) -> DbResult<Customer> {
        if name.trim().is_empty() {
            return Err(CoreError::from(ValidationError::Required { field: "name" }).into());
        }

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            total_debt_cents: 0,
            debt_since: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO customers
                (id, name, total_debt_cents, debt_since, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(customer.total_debt_cents)
        .bind(customer.debt_since)
        .bind(customer.version)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(customer_id = %customer.id, "Customer created");
        Ok(customer)
    }

    /// Fetches a customer by ID.
    pub async fn get_customer(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, total_debt_cents, debt_since, version, created_at, updated_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Customers with outstanding debt, largest first.
    pub async fn debtors(&self) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, total_debt_cents, debt_since, version, created_at, updated_at
            FROM customers
            WHERE total_debt_cents > 0
            ORDER BY total_debt_cents DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Records a debt payment: one immutable [`PaymentTransaction`], its
    /// breakdown legs, the optional sale reconciliation, and the CAS-guarded
    /// projection update — all in one transaction.
    ///
    /// The recorded amount is clamped to the outstanding balance so that
    /// `Σ payments` never exceeds `Σ sale debt contributions` and the
    /// reconstruction audit stays exact. The excess of an over-payment is
    /// change handed back, noted on the transaction. A payment against a
    /// customer with no debt is rejected.
    pub async fn record_payment(
        &self,
        request: &PaymentRequest,
        config: &LedgerConfig,
    ) -> DbResult<PaymentTransaction> {
        if !request.amount.is_positive() {
            return Err(CoreError::from(ValidationError::MustBePositive { field: "amount" }).into());
        }

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;

            let customer = load_customer_on(&mut tx, &request.customer_id).await?;
            let outstanding = customer.total_debt();

            let applied = request.amount.min(outstanding);
            if !applied.is_positive() {
                return Err(CoreError::OverpaymentNotAllowed {
                    total_cents: outstanding.cents(),
                    paid_cents: request.amount.cents(),
                }
                .into());
            }

            let excess = request.amount.sub_or_zero(outstanding);
            let note = if excess.is_positive() {
                Some(match &request.note {
                    Some(n) => format!("{n}; change {excess}"),
                    None => format!("change {excess}"),
                })
            } else {
                request.note.clone()
            };

            let state = DebtState::new(outstanding, customer.debt_since);
            let new_state = debt::record_payment(state, applied);

            // Classify legs against the applied amount's anchors, before any
            // write. The tagged amounts are frozen onto the breakdown rows.
            let anchors = SaleAnchors::new(applied, applied, request.rate);
            let classified = classifier::classify_breakdown(
                &request.breakdown,
                &anchors,
                config.classifier_tolerance_cents,
            )?;

            let payment = PaymentTransaction {
                id: Uuid::new_v4().to_string(),
                customer_id: request.customer_id.clone(),
                sale_id: request.sale_id.clone(),
                amount_usd_cents: applied.cents(),
                amount_ves_cents: request.rate.to_ves(applied).cents(),
                exchange_rate_scaled: request.rate.scaled(),
                note,
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO payment_transactions
                    (id, customer_id, sale_id, amount_usd_cents, amount_ves_cents,
                     exchange_rate_scaled, note, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&payment.id)
            .bind(&payment.customer_id)
            .bind(&payment.sale_id)
            .bind(payment.amount_usd_cents)
            .bind(payment.amount_ves_cents)
            .bind(payment.exchange_rate_scaled)
            .bind(&payment.note)
            .bind(payment.created_at)
            .execute(&mut *tx)
            .await?;

            for leg in &classified {
                insert_breakdown_on(&mut tx, None, Some(&payment.id), leg, now).await?;
            }

            if let Some(sale_id) = &request.sale_id {
                reconcile_sale_on(&mut tx, sale_id, applied, now).await?;
            }

            match apply_debt_on(&mut tx, &customer, new_state, now).await? {
                CasOutcome::Applied(()) => {
                    tx.commit().await?;
                    info!(
                        customer_id = %request.customer_id,
                        tendered_usd_cents = request.amount.cents(),
                        applied_usd_cents = applied.cents(),
                        remaining_cents = new_state.total.cents(),
                        "Debt payment recorded"
                    );
                    return Ok(payment);
                }
                CasOutcome::Conflict => {
                    tx.rollback().await?;
                    debug!(
                        customer_id = %request.customer_id,
                        attempt,
                        "Debt version conflict, retrying"
                    );
                }
            }
        }

        Err(CoreError::ConcurrencyConflict {
            entity: "Customer",
            id: request.customer_id.clone(),
        }
        .into())
    }

    /// Reconstructs a customer's debt from the audit trail:
    /// `max(0, Σ sales.debt_usd_cents − Σ payment amounts)`.
    ///
    /// The returned value must equal the cached projection; a mismatch means
    /// a write bypassed the ledger.
    pub async fn rebuild_debt(&self, customer_id: &str) -> DbResult<Usd> {
        let sold: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(debt_usd_cents), 0) FROM sales WHERE customer_id = ?1",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        let paid: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_usd_cents), 0) FROM payment_transactions WHERE customer_id = ?1",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Usd::from_cents(sold).sub_or_zero(Usd::from_cents(paid)))
    }

    /// Payment history for a customer, newest first.
    pub async fn payments_for_customer(
        &self,
        customer_id: &str,
        limit: i64,
    ) -> DbResult<Vec<PaymentTransaction>> {
        let payments = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT id, customer_id, sale_id, amount_usd_cents, amount_ves_cents,
                   exchange_rate_scaled, note, created_at
            FROM payment_transactions
            WHERE customer_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }
}

// =============================================================================
// Transaction-Scoped Helpers
// =============================================================================

/// Loads a customer inside a transaction, surfacing `NoSuchCustomer`.
pub(crate) async fn load_customer_on(
    conn: &mut SqliteConnection,
    customer_id: &str,
) -> DbResult<Customer> {
    let customer = sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, name, total_debt_cents, debt_since, version, created_at, updated_at
        FROM customers
        WHERE id = ?1
        "#,
    )
    .bind(customer_id)
    .fetch_optional(&mut *conn)
    .await?;

    customer.ok_or_else(|| {
        CoreError::NoSuchCustomer {
            customer_id: customer_id.to_string(),
        }
        .into()
    })
}

/// CAS-updates a customer's debt projection to `new_state`.
pub(crate) async fn apply_debt_on(
    conn: &mut SqliteConnection,
    customer: &Customer,
    new_state: DebtState,
    now: DateTime<Utc>,
) -> DbResult<CasOutcome<()>> {
    let result = sqlx::query(
        r#"
        UPDATE customers
        SET total_debt_cents = ?1, debt_since = ?2, version = version + 1, updated_at = ?3
        WHERE id = ?4 AND version = ?5
        "#,
    )
    .bind(new_state.total.cents())
    .bind(new_state.since)
    .bind(now)
    .bind(&customer.id)
    .bind(customer.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(CasOutcome::Conflict);
    }
    Ok(CasOutcome::Applied(()))
}

/// Inserts one classified breakdown leg, attached to a sale or a payment.
pub(crate) async fn insert_breakdown_on(
    conn: &mut SqliteConnection,
    sale_id: Option<&str>,
    payment_id: Option<&str>,
    leg: &classifier::ClassifiedPayment,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let entry = PaymentBreakdownEntry {
        id: Uuid::new_v4().to_string(),
        sale_id: sale_id.map(str::to_string),
        payment_id: payment_id.map(str::to_string),
        instrument: leg.instrument,
        amount_minor: match leg.currency {
            caja_core::types::Currency::Usd => leg.usd.cents(),
            caja_core::types::Currency::Ves => leg.ves.cents(),
        },
        currency: Some(leg.currency),
        amount_usd_cents: Some(leg.usd.cents()),
        amount_ves_cents: Some(leg.ves.cents()),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO payment_entries
            (id, sale_id, payment_id, instrument, amount_minor, currency,
             amount_usd_cents, amount_ves_cents, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.sale_id)
    .bind(&entry.payment_id)
    .bind(entry.instrument)
    .bind(entry.amount_minor)
    .bind(entry.currency)
    .bind(entry.amount_usd_cents)
    .bind(entry.amount_ves_cents)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Advances a reconciled sale's paid amounts and status. Totals, rate, and
/// the frozen `debt_usd_cents` are never touched.
async fn reconcile_sale_on(
    conn: &mut SqliteConnection,
    sale_id: &str,
    amount: Usd,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let row: Option<(i64, i64, i64)> = sqlx::query_as(
        "SELECT total_usd_cents, amount_paid_usd_cents, exchange_rate_scaled FROM sales WHERE id = ?1",
    )
    .bind(sale_id)
    .fetch_optional(&mut *conn)
    .await?;

    let (total_cents, paid_cents, rate_scaled) =
        row.ok_or_else(|| DbError::not_found("Sale", sale_id))?;

    let total = Usd::from_cents(total_cents);
    let new_paid = (Usd::from_cents(paid_cents) + amount).min(total);
    let rate = ExchangeRate::from_scaled(rate_scaled)?;
    let status = if new_paid >= total { "paid" } else { "partial" };

    sqlx::query(
        r#"
        UPDATE sales
        SET amount_paid_usd_cents = ?1, amount_paid_ves_cents = ?2, status = ?3, updated_at = ?4
        WHERE id = ?5
        "#,
    )
    .bind(new_paid.cents())
    .bind(rate.to_ves(new_paid).cents())
    .bind(status)
    .bind(now)
    .bind(sale_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
