//! # Domain Types
//!
//! Core domain types for the settlement & ledger subsystem.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │ StockMovement   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  kind           │       │
//! │  │  price_usd      │   │  totals USD/VES │   │  previous_stock │       │
//! │  │  stock+version  │   │  frozen rate    │   │  new_stock      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────┐   │
//! │  │    Customer     │   │ PaymentTransaction  │   │ PaymentEntry    │   │
//! │  │  ─────────────  │   │  ─────────────────  │   │  ─────────────  │   │
//! │  │  total_debt     │   │  amount USD/VES     │   │  instrument     │   │
//! │  │  debt_since     │   │  frozen rate        │   │  currency tag   │   │
//! │  └─────────────────┘   └─────────────────────┘   └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Persisted records keep raw minor-unit `i64` fields (what the row stores)
//! and expose typed accessors ([`Usd`], [`Ves`], [`ExchangeRate`]); enums
//! carry `sqlx::Type` derives behind the `sqlx` feature so the storage crate
//! can read them straight out of TEXT columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{ExchangeRate, Usd, Ves};

// =============================================================================
// Currency
// =============================================================================

/// The two currencies the register handles: the stable unit of account and
/// the floating local unit tied to a daily exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Ves,
}

// =============================================================================
// Payment Instrument
// =============================================================================

/// The instruments a single sale can be split across (at most
/// [`crate::MAX_PAYMENT_INSTRUMENTS`] in one transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentInstrument {
    /// Physical US dollars.
    CashUsd,
    /// Physical bolívares.
    CashVes,
    /// Card on the point-of-sale terminal (local currency).
    PointOfSale,
    /// Pago móvil (local currency).
    MobileTransfer,
    /// Domestic bank transfer (local currency).
    BankTransfer,
    /// International transfer, always USD.
    InternationalTransfer,
}

impl PaymentInstrument {
    /// Returns the currency an instrument is always denominated in, or
    /// `None` for the local instruments whose legacy records are
    /// currency-ambiguous (see [`crate::classifier`]).
    pub const fn fixed_currency(&self) -> Option<Currency> {
        match self {
            PaymentInstrument::CashUsd | PaymentInstrument::InternationalTransfer => {
                Some(Currency::Usd)
            }
            _ => None,
        }
    }
}

// =============================================================================
// Payment Type & Status
// =============================================================================

/// How the customer chose to settle at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Paid in full at checkout.
    Full,
    /// Everything on credit (fiado).
    Credit,
    /// Part now, the rest becomes debt.
    Partial,
    /// Split across several instruments; may include change.
    Mixed,
}

/// Derived payment status of a sale. Never set directly; always computed
/// from the debt outcome (see [`crate::settlement`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// No debt remains.
    Paid,
    /// Some amount paid, some debt remains.
    Partial,
    /// Nothing paid; the whole total is on credit.
    Pending,
}

// =============================================================================
// Stock Movement Kind
// =============================================================================

/// The kind of an inventory movement. Direction is recoverable purely from
/// the kind plus the sign of `new_stock - previous_stock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Goods received; stock goes up.
    In,
    /// Goods removed outside a sale (breakage, transfer); stock goes down.
    Out,
    /// Checkout line item; stock goes down.
    Sale,
    /// Manual correction; the quantity's sign carries the direction.
    Adjustment,
}

// =============================================================================
// Discount Rate
// =============================================================================

/// Discount rate in basis points (1000 = 10%). Valid range is 0..=10000.
///
/// ## Why Basis Points?
/// Same reason money is integer cents: `subtotal × (1 - pct/100)` in floats
/// drifts; `(subtotal × bps + 5000) / 10000` in integers does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRate(u32);

impl DiscountRate {
    /// Creates a discount from basis points, rejecting anything over 100%.
    pub fn from_bps(bps: u32) -> CoreResult<Self> {
        if bps > 10_000 {
            return Err(CoreError::InvalidDiscount { bps: bps as i64 });
        }
        Ok(DiscountRate(bps))
    }

    /// Creates a discount from a percentage in [0, 100].
    pub fn from_percentage(pct: f64) -> CoreResult<Self> {
        if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
            return Err(CoreError::InvalidDiscount {
                bps: (pct * 100.0) as i64,
            });
        }
        Ok(DiscountRate((pct * 100.0).round() as u32))
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        DiscountRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for DiscountRate {
    fn default() -> Self {
        DiscountRate::zero()
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A line in the in-progress cart. The unit price is the USD price at the
/// time the line was added (snapshot; later price edits don't touch it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    /// Product name at time of addition, snapshotted onto the sale item.
    pub name: String,
    /// Unit price in USD cents.
    pub unit_price_cents: i64,
    /// Quantity, must be >= 1.
    pub quantity: i64,
}

impl CartLine {
    #[inline]
    pub fn unit_price(&self) -> Usd {
        Usd::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Usd {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

/// The ephemeral cart owned by the in-progress transaction. No persistence
/// lifecycle of its own; it is materialized into a [`Sale`] at checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(lines: Vec<CartLine>) -> Self {
        Cart { lines }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of line totals, accumulated in integer cents.
    pub fn subtotal(&self) -> Usd {
        self.lines
            .iter()
            .fold(Usd::zero(), |acc, line| acc + line.line_total())
    }
}

// =============================================================================
// Payment Entry (breakdown leg)
// =============================================================================

/// One leg of a mixed-payment breakdown, as handed to the classifier.
///
/// `currency` is the explicit tag persisted going forward; `None` marks a
/// legacy row where an earlier defect stored USD figures in local-currency
/// fields, and the proximity heuristic must reconstruct the truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub instrument: PaymentInstrument,
    /// Raw recorded amount in minor units; currency per `currency`, or
    /// ambiguous when `None`.
    pub amount_minor: i64,
    pub currency: Option<Currency>,
}

// =============================================================================
// Product
// =============================================================================

/// A product with its single current-quantity field.
///
/// `stock` must always equal the `new_stock` of the most recent
/// [`StockMovement`] for this product; `version` is the compare-and-swap
/// guard the storage layer uses to keep that true under concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Unit price in USD cents.
    pub price_usd_cents: i64,
    /// Current stock level; mirror of the latest movement's `new_stock`.
    pub stock: i64,
    /// Optimistic-concurrency version, bumped on every stock write.
    pub version: i64,
    /// Soft-delete flag; historical movements still reference the row.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Usd {
        Usd::from_cents(self.price_usd_cents)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer with their outstanding debt projection.
///
/// `total_debt_cents` is a cached projection, not a source of truth: it must
/// be reconstructible from sale debt contributions minus payment amounts
/// (see the debt ledger's rebuild operation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    /// Outstanding debt in USD cents; never negative.
    pub total_debt_cents: i64,
    /// Set when debt transitions 0 → positive, cleared when it returns to 0.
    pub debt_since: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    #[inline]
    pub fn total_debt(&self) -> Usd {
        Usd::from_cents(self.total_debt_cents)
    }

    #[inline]
    pub fn has_debt(&self) -> bool {
        self.total_debt_cents > 0
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A settled sale. Immutable once created except for `status` and the
/// `amount_paid_*` fields, which a later reconciling payment may update.
///
/// `debt_usd_cents` is the debt contribution at creation and stays frozen
/// even after payments — the debt-reconstruction audit depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub customer_id: Option<String>,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    /// Single-instrument shorthand; mixed sales use the breakdown entries.
    pub payment_method: Option<PaymentInstrument>,
    pub subtotal_usd_cents: i64,
    pub discount_bps: i64,
    pub total_usd_cents: i64,
    /// `total_usd × rate` frozen at settlement time, never recomputed.
    pub total_ves_cents: i64,
    /// VES-per-USD rate at creation, 1e4 fixed point.
    pub exchange_rate_scaled: i64,
    pub amount_paid_usd_cents: i64,
    pub amount_paid_ves_cents: i64,
    /// Debt contribution at creation (frozen for audit).
    pub debt_usd_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total_usd(&self) -> Usd {
        Usd::from_cents(self.total_usd_cents)
    }

    #[inline]
    pub fn total_ves(&self) -> Ves {
        Ves::from_cents(self.total_ves_cents)
    }

    #[inline]
    pub fn amount_paid_usd(&self) -> Usd {
        Usd::from_cents(self.amount_paid_usd_cents)
    }

    /// The frozen exchange rate of this sale.
    pub fn exchange_rate(&self) -> CoreResult<ExchangeRate> {
        ExchangeRate::from_scaled(self.exchange_rate_scaled)
    }

    /// Outstanding amount on this sale right now (total minus paid).
    pub fn outstanding_usd(&self) -> Usd {
        self.total_usd().sub_or_zero(self.amount_paid_usd())
    }
}

/// A line item of a sale. Snapshot pattern: product name and price are
/// frozen at checkout so history survives later product edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub name_snapshot: String,
    pub unit_price_usd_cents: i64,
    pub quantity: i64,
    pub line_total_usd_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Usd {
        Usd::from_cents(self.unit_price_usd_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Usd {
        Usd::from_cents(self.line_total_usd_cents)
    }
}

// =============================================================================
// Payment Breakdown Entry (persisted)
// =============================================================================

/// A persisted breakdown leg, attached to either a sale or a payment
/// transaction. New writes always carry the explicit currency tag and the
/// resolved amounts; legacy imports may have all three as NULL, in which
/// case the classifier heuristic re-resolves them at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentBreakdownEntry {
    pub id: String,
    pub sale_id: Option<String>,
    pub payment_id: Option<String>,
    pub instrument: PaymentInstrument,
    /// Raw recorded amount in minor units.
    pub amount_minor: i64,
    /// Explicit currency tag; NULL on legacy rows.
    pub currency: Option<Currency>,
    pub amount_usd_cents: Option<i64>,
    pub amount_ves_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment Transaction
// =============================================================================

/// A customer's debt payment. Immutable once created; every debt mutation
/// is paired with one of these (or a sale) for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentTransaction {
    pub id: String,
    pub customer_id: String,
    /// Sale being reconciled, if the payment targets a specific sale.
    pub sale_id: Option<String>,
    pub amount_usd_cents: i64,
    /// Computed from the rate active at payment time, then frozen.
    pub amount_ves_cents: i64,
    pub exchange_rate_scaled: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    #[inline]
    pub fn amount_usd(&self) -> Usd {
        Usd::from_cents(self.amount_usd_cents)
    }

    pub fn exchange_rate(&self) -> CoreResult<ExchangeRate> {
        ExchangeRate::from_scaled(self.exchange_rate_scaled)
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// One entry in the append-only inventory audit trail. Never updated or
/// deleted. Invariant: `new_stock = previous_stock ± quantity`, sign
/// determined by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub kind: MovementKind,
    /// Always the unsigned magnitude; direction lives in `kind` and the
    /// `new_stock - previous_stock` sign.
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    /// What caused the movement (sale id, delivery note, count reference).
    pub reference: String,
    /// Unit cost snapshot for IN movements, if known.
    pub unit_cost_usd_cents: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
