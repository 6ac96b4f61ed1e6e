//! # Payment Classifier
//!
//! Resolves the true currency of each leg in a mixed-payment breakdown.
//!
//! ## Why This Exists
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE LEGACY CURRENCY BUG                                                │
//! │                                                                         │
//! │  An earlier version of the register stored USD-equivalent values in    │
//! │  fields meant for bolívares. A "pago_movil: 17.95" on an $18.00 sale   │
//! │  is almost certainly $17.95 recorded in the wrong field — a genuine    │
//! │  Bs 17.95 leg on that sale would be economically absurd.               │
//! │                                                                         │
//! │  RESOLUTION ORDER                                                       │
//! │    1. explicit currency tag        → trusted (all new writes)          │
//! │    2. fixed-USD instrument         → USD                               │
//! │    3. proximity to sale anchors    → USD if within tolerance           │
//! │    4. otherwise                    → genuine local-currency figure     │
//! │                                                                         │
//! │  The heuristic (3-4) is the legacy fallback only. Rows written by this │
//! │  core always carry the tag, so re-classification is a no-op.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The proximity tolerance is configurable ([`crate::config::LedgerConfig`]);
//! the historical value is 0.5 currency units (50 cents).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::money::{ExchangeRate, Usd, Ves};
use crate::types::{Currency, PaymentEntry, PaymentInstrument};
use crate::validation;

// =============================================================================
// Sale Anchors
// =============================================================================

/// The known totals of the sale (or payment) an entry belongs to. These are
/// the values the proximity heuristic compares against.
#[derive(Debug, Clone, Copy)]
pub struct SaleAnchors {
    pub total_usd: Usd,
    pub amount_paid_usd: Usd,
    pub rate: ExchangeRate,
}

impl SaleAnchors {
    pub fn new(total_usd: Usd, amount_paid_usd: Usd, rate: ExchangeRate) -> Self {
        SaleAnchors {
            total_usd,
            amount_paid_usd,
            rate,
        }
    }
}

// =============================================================================
// Classified Payment
// =============================================================================

/// One resolved breakdown leg: the inferred currency plus both-currency
/// amounts at the record's frozen rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedPayment {
    pub instrument: PaymentInstrument,
    pub currency: Currency,
    pub usd: Usd,
    pub ves: Ves,
}

// =============================================================================
// Classification
// =============================================================================

/// Classifies a single breakdown entry.
///
/// Returns `Ok(None)` for non-positive amounts (not a real payment leg).
/// Fails with [`CoreError::AmbiguousPaymentEntry`] when a legacy untagged
/// entry has no usable anchors to compare against — surfacing beats a
/// silent guess.
///
/// Idempotence: output carries an explicit currency, so feeding a
/// classified leg back through (as a tagged entry) reproduces it exactly.
pub fn classify_entry(
    entry: &PaymentEntry,
    anchors: &SaleAnchors,
    tolerance_cents: i64,
) -> CoreResult<Option<ClassifiedPayment>> {
    if entry.amount_minor <= 0 {
        return Ok(None);
    }

    let currency = match entry.currency.or(entry.instrument.fixed_currency()) {
        Some(currency) => currency,
        None => infer_legacy_currency(entry, anchors, tolerance_cents)?,
    };

    let (usd, ves) = match currency {
        Currency::Usd => {
            let usd = Usd::from_cents(entry.amount_minor);
            (usd, anchors.rate.to_ves(usd))
        }
        Currency::Ves => {
            let ves = Ves::from_cents(entry.amount_minor);
            (anchors.rate.to_usd(ves), ves)
        }
    };

    Ok(Some(ClassifiedPayment {
        instrument: entry.instrument,
        currency,
        usd,
        ves,
    }))
}

/// The proximity heuristic for legacy untagged local-currency entries.
///
/// A raw value within `tolerance_cents` of the sale total or the amount
/// paid (both USD) is a USD figure mistakenly stored in a local field;
/// anything else is a genuine local-currency figure.
fn infer_legacy_currency(
    entry: &PaymentEntry,
    anchors: &SaleAnchors,
    tolerance_cents: i64,
) -> CoreResult<Currency> {
    // No anchors, no basis for a decision.
    if anchors.total_usd.is_zero() && anchors.amount_paid_usd.is_zero() {
        return Err(CoreError::AmbiguousPaymentEntry {
            instrument: entry.instrument,
            amount_minor: entry.amount_minor,
        });
    }

    let diff_to_total = (entry.amount_minor - anchors.total_usd.cents()).abs();
    let diff_to_paid = (entry.amount_minor - anchors.amount_paid_usd.cents()).abs();

    if diff_to_total < tolerance_cents || diff_to_paid < tolerance_cents {
        Ok(Currency::Usd)
    } else {
        Ok(Currency::Ves)
    }
}

/// Classifies a full breakdown, discarding non-positive legs.
///
/// Fails on more than [`crate::MAX_PAYMENT_INSTRUMENTS`] legs and on any
/// individually ambiguous entry; the failure happens before any of the
/// breakdown is used, so callers can reject pre-write.
pub fn classify_breakdown(
    entries: &[PaymentEntry],
    anchors: &SaleAnchors,
    tolerance_cents: i64,
) -> CoreResult<Vec<ClassifiedPayment>> {
    validation::validate_breakdown(entries)?;

    let mut classified = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(payment) = classify_entry(entry, anchors, tolerance_cents)? {
            classified.push(payment);
        }
    }
    Ok(classified)
}

// =============================================================================
// Reporting Aggregation
// =============================================================================

/// The direction a record contributes to the register's cash flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// A completed sale: inflow.
    Sale,
    /// A customer paying down debt: inflow.
    CustomerPayment,
    /// An expense paid from the register: outflow.
    Expense,
    /// A payment to a supplier: outflow.
    SupplierPayment,
}

impl FlowKind {
    /// +1 for inflows, -1 for outflows.
    pub const fn sign(&self) -> i64 {
        match self {
            FlowKind::Sale | FlowKind::CustomerPayment => 1,
            FlowKind::Expense | FlowKind::SupplierPayment => -1,
        }
    }
}

/// A record in scope for a reporting period, with its classified legs.
#[derive(Debug, Clone)]
pub struct ClassifiedFlow {
    pub kind: FlowKind,
    pub payments: Vec<ClassifiedPayment>,
}

/// Signed per-instrument totals for a reporting period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentTotals {
    pub usd: Usd,
    pub ves: Ves,
}

/// Sums classified legs per instrument across all records in scope.
/// Outflows (expenses, supplier payments) contribute with a negative sign.
pub fn aggregate_by_instrument(
    flows: &[ClassifiedFlow],
) -> BTreeMap<PaymentInstrument, InstrumentTotals> {
    let mut totals: BTreeMap<PaymentInstrument, InstrumentTotals> = BTreeMap::new();
    for flow in flows {
        let sign = flow.kind.sign();
        for payment in &flow.payments {
            let entry = totals.entry(payment.instrument).or_default();
            entry.usd += payment.usd * sign;
            entry.ves += payment.ves * sign;
        }
    }
    totals
}

// =============================================================================
// Unit Tests
// =============================================================================
