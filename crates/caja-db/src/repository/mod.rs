//! # Repositories
//!
//! One repository per aggregate. Each holds a clone of the pool (cheap,
//! internally Arc'd) and owns the SQL for its tables.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ProductRepository   products                  (catalog reads/writes)   │
//! │  StockLedger         products + stock_movements (CAS transitions)       │
//! │  DebtLedger          customers + payment_transactions (CAS transitions) │
//! │  SaleRepository      sales + sale_items + both ledgers (checkout)       │
//! │  ClosingRepository   read-only aggregation over a period                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes that touch a `version`-guarded row (product stock, customer debt)
//! go through a single transaction with a compare-and-swap UPDATE, retried
//! up to [`MAX_CAS_ATTEMPTS`] times before surfacing
//! [`caja_core::CoreError::ConcurrencyConflict`].

pub mod closing;
pub mod debt;
pub mod product;
pub mod sale;
pub mod stock;

/// Retry budget for version-conflict (compare-and-swap) loops.
pub const MAX_CAS_ATTEMPTS: u32 = 5;

/// Outcome of one compare-and-swap attempt inside a transaction. `Conflict`
/// means the guarded row's version moved under us; the caller must roll the
/// transaction back and retry from a fresh read.
#[derive(Debug)]
pub(crate) enum CasOutcome<T> {
    Applied(T),
    Conflict,
}
