//! # caja-core: Settlement & Ledger Logic for Caja POS
//!
//! The numerically sensitive heart of the register: pricing a cart across
//! two currencies, resolving how it was paid across multiple instruments,
//! tracking customer debt, and the stock-movement invariants — all as pure
//! functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Caja POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │       Dashboard / receipts / forecasting (external)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ caja-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌────────────┐ ┌────────────┐ ┌───────────────┐   │   │
//! │  │  │  money  │ │ classifier │ │ settlement │ │ stock / debt  │   │   │
//! │  │  │ Usd Ves │ │  currency  │ │   totals   │ │  transitions  │   │   │
//! │  │  │  rates  │ │ heuristic  │ │ debt status│ │  invariants   │   │   │
//! │  │  └─────────┘ └────────────┘ └────────────┘ └───────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO LOGGING • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    caja-db (Storage Layer)                      │   │
//! │  │     SQLite transactions, CAS retries, repositories              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Usd`/`Ves` fixed-point amounts and `ExchangeRate`
//! - [`types`] - Domain types (Cart, Sale, StockMovement, ...)
//! - [`classifier`] - Mixed-instrument currency disambiguation
//! - [`settlement`] - Cart → totals, paid, debt, status
//! - [`stock`] - Stock-movement transition math
//! - [`debt`] - Customer debt transition math
//! - [`config`] - Call-time configuration (no ambient globals)
//! - [`validation`] - Input checks
//! - [`error`] - Typed error taxonomy
//!
//! ## Design Principles
//!
//! 1. **Pure functions**: same input, same output — settlements are
//!    replayable for reconciliation
//! 2. **Integer money**: all amounts are minor units (i64), all rates are
//!    1e4 fixed point; no floats past the input boundary
//! 3. **Currencies are types**: `Usd + Ves` does not compile; conversion
//!    goes through an explicit `ExchangeRate`
//! 4. **Explicit errors**: typed enums, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod classifier;
pub mod config;
pub mod debt;
pub mod error;
pub mod money;
pub mod settlement;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use config::{LedgerConfig, OverpaymentPolicy};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{ExchangeRate, Usd, Ves};
pub use settlement::{settle, Settlement};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default proximity tolerance for the legacy currency heuristic, in USD
/// cents (0.5 currency units). The historical constant has no documented
/// derivation; it is the default, not gospel — override it through
/// [`config::LedgerConfig`].
pub const DEFAULT_TOLERANCE_CENTS: i64 = 50;

/// Maximum payment instruments in a single transaction.
pub const MAX_PAYMENT_INSTRUMENTS: usize = 5;

/// Maximum lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single cart line. Catches fat-finger entries
/// (1000 instead of 10) before they hit the ledger.
pub const MAX_LINE_QUANTITY: i64 = 9_999;
