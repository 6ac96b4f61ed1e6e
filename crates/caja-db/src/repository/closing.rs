//! # Closing Repository
//!
//! Read-only aggregation for the daily closing: how much was sold, how much
//! was collected, and per-instrument totals in both currencies.
//!
//! ## Classification at Read Time
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  For each sale / payment in the period:                                 │
//! │    breakdown leg with stored currency + amounts  → trusted as-is        │
//! │    legacy leg (NULL currency)                    → heuristic, using     │
//! │                                                    the RECORD's frozen  │
//! │                                                    anchors and rate     │
//! │    no legs, single-instrument sale               → synthesized from     │
//! │                                                    amount_paid          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Using each record's own frozen rate matters: re-running a closing months
//! later must reproduce the original numbers, not ones skewed by today's
//! rate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use caja_core::classifier::{
    self, aggregate_by_instrument, ClassifiedFlow, ClassifiedPayment, FlowKind, InstrumentTotals,
    SaleAnchors,
};
use caja_core::config::LedgerConfig;
use caja_core::money::{Usd, Ves};
use caja_core::types::{
    Currency, PaymentBreakdownEntry, PaymentEntry, PaymentInstrument, PaymentTransaction, Sale,
};

use crate::error::DbResult;

// =============================================================================
// Summary
// =============================================================================

/// The closing numbers for a period.
#[derive(Debug, Clone)]
pub struct ClosingSummary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub sales_count: i64,
    pub payments_count: i64,
    /// Σ sale totals (USD).
    pub sold_usd: Usd,
    /// Σ amounts actually collected: sale payments plus debt payments.
    pub collected_usd: Usd,
    /// Per-instrument totals across every classified leg in the period.
    pub by_instrument: BTreeMap<PaymentInstrument, InstrumentTotals>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for period closings. Read-only.
#[derive(Debug, Clone)]
pub struct ClosingRepository {
    pool: SqlitePool,
}

impl ClosingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ClosingRepository { pool }
    }

    /// Builds the closing summary for `[from, to)`.
    pub async fn summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        config: &LedgerConfig,
    ) -> DbResult<ClosingSummary> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, customer_id, status, payment_type, payment_method,
                   subtotal_usd_cents, discount_bps, total_usd_cents, total_ves_cents,
                   exchange_rate_scaled, amount_paid_usd_cents, amount_paid_ves_cents,
                   debt_usd_cents, created_at, updated_at
            FROM sales
            WHERE created_at >= ?1 AND created_at < ?2
            ORDER BY created_at ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let payments = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT id, customer_id, sale_id, amount_usd_cents, amount_ves_cents,
                   exchange_rate_scaled, note, created_at
            FROM payment_transactions
            WHERE created_at >= ?1 AND created_at < ?2
            ORDER BY created_at ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut sold_usd = Usd::zero();
        let mut collected_usd = Usd::zero();
        let mut flows = Vec::with_capacity(sales.len() + payments.len());

        for sale in &sales {
            sold_usd += sale.total_usd();
            collected_usd += sale.amount_paid_usd();

            let entries = self.entries_for("sale_id", &sale.id).await?;
            let rate = sale.exchange_rate()?;
            let anchors = SaleAnchors::new(sale.total_usd(), sale.amount_paid_usd(), rate);
            let mut legs = resolve_legs(&entries, &anchors, config)?;

            // Single-instrument sales have no breakdown rows; synthesize the
            // one leg from the recorded paid amounts.
            if legs.is_empty() && sale.amount_paid_usd_cents > 0 {
                if let Some(instrument) = sale.payment_method {
                    legs.push(ClassifiedPayment {
                        instrument,
                        currency: instrument.fixed_currency().unwrap_or(Currency::Usd),
                        usd: sale.amount_paid_usd(),
                        ves: Ves::from_cents(sale.amount_paid_ves_cents),
                    });
                }
            }

            flows.push(ClassifiedFlow {
                kind: FlowKind::Sale,
                payments: legs,
            });
        }

        for payment in &payments {
            collected_usd += payment.amount_usd();

            let entries = self.entries_for("payment_id", &payment.id).await?;
            let rate = payment.exchange_rate()?;
            let anchors = SaleAnchors::new(payment.amount_usd(), payment.amount_usd(), rate);
            let legs = resolve_legs(&entries, &anchors, config)?;

            flows.push(ClassifiedFlow {
                kind: FlowKind::CustomerPayment,
                payments: legs,
            });
        }

        let summary = ClosingSummary {
            from,
            to,
            sales_count: sales.len() as i64,
            payments_count: payments.len() as i64,
            sold_usd,
            collected_usd,
            by_instrument: aggregate_by_instrument(&flows),
        };

        debug!(
            sales = summary.sales_count,
            payments = summary.payments_count,
            sold_usd_cents = summary.sold_usd.cents(),
            collected_usd_cents = summary.collected_usd.cents(),
            "Closing summary built"
        );
        Ok(summary)
    }

    async fn entries_for(
        &self,
        column: &'static str,
        id: &str,
    ) -> DbResult<Vec<PaymentBreakdownEntry>> {
        // `column` is one of two static names, never user input
        let sql = format!(
            "SELECT id, sale_id, payment_id, instrument, amount_minor, currency, \
             amount_usd_cents, amount_ves_cents, created_at \
             FROM payment_entries WHERE {column} = ?1 ORDER BY rowid"
        );
        let entries = sqlx::query_as::<_, PaymentBreakdownEntry>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }
}

/// Resolves persisted breakdown legs: stored tags are trusted, legacy NULLs
/// go back through the classifier with the record's frozen anchors.
fn resolve_legs(
    entries: &[PaymentBreakdownEntry],
    anchors: &SaleAnchors,
    config: &LedgerConfig,
) -> DbResult<Vec<ClassifiedPayment>> {
    let mut legs = Vec::with_capacity(entries.len());
    for entry in entries {
        if let (Some(currency), Some(usd), Some(ves)) =
            (entry.currency, entry.amount_usd_cents, entry.amount_ves_cents)
        {
            legs.push(ClassifiedPayment {
                instrument: entry.instrument,
                currency,
                usd: Usd::from_cents(usd),
                ves: Ves::from_cents(ves),
            });
            continue;
        }

        let raw = PaymentEntry {
            instrument: entry.instrument,
            amount_minor: entry.amount_minor,
            currency: entry.currency,
        };
        if let Some(leg) =
            classifier::classify_entry(&raw, anchors, config.classifier_tolerance_cents)?
        {
            legs.push(leg);
        }
    }
    Ok(legs)
}

// =============================================================================
// Unit Tests
// =============================================================================
