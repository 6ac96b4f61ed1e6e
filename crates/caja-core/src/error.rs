//! # Error Types
//!
//! Typed errors for the settlement & ledger core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  caja-core errors (this file)                                          │
//! │  ├── CoreError        - Business-rule and settlement failures          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  caja-db errors (separate crate)                                       │
//! │  └── DbError          - Storage failures, wraps CoreError              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → service layer           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//! - Validation errors (`EmptyCart`, `InvalidDiscount`, `InvalidRate`) are
//!   rejected before any write happens.
//! - `ConcurrencyConflict` is retried by the storage layer up to a bounded
//!   number of attempts, then surfaced.
//! - `InsufficientStock` and `NoSuchCustomer` are surfaced to the caller,
//!   never coerced.
//! - The core raises typed errors only; translating them into user-facing
//!   messages is the calling layer's job.

use thiserror::Error;

use crate::types::PaymentInstrument;

// =============================================================================
// Core Error
// =============================================================================

/// Settlement & ledger business errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Exchange rate must be positive (VES per USD, 1e4 fixed point).
    #[error("Invalid exchange rate: {scaled} (scaled 1e4); rate must be positive")]
    InvalidRate { scaled: i64 },

    /// Settlement was attempted on a cart with no line items.
    #[error("Cart has no line items")]
    EmptyCart,

    /// Discount outside the [0, 100]% range.
    #[error("Invalid discount: {bps} bps; must be between 0 and 10000")]
    InvalidDiscount { bps: i64 },

    /// Amount paid exceeds the final total where the payment type does not
    /// allow change.
    #[error("Overpayment not allowed: paid {paid_cents} against total {total_cents} (USD cents)")]
    OverpaymentNotAllowed { total_cents: i64, paid_cents: i64 },

    /// A movement would take stock negative and negative stock is not
    /// permitted by configuration.
    ///
    /// ## User Workflow
    /// ```text
    /// SALE quantity 4 on stock 3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 3, requested: 4 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 left in stock" — stock remains 3
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Debt operation against a customer reference that does not exist.
    #[error("No such customer: {customer_id}")]
    NoSuchCustomer { customer_id: String },

    /// A read-modify-write lost its version race more times than the retry
    /// budget allows. Retryable by the caller.
    #[error("Concurrency conflict on {entity} {id}: retries exhausted")]
    ConcurrencyConflict { entity: &'static str, id: String },

    /// The classifier could not confidently resolve the currency of a
    /// legacy payment entry. Surfaced, never silently guessed past.
    #[error("Ambiguous payment entry: {instrument:?} amount {amount_minor} has no usable anchors")]
    AmbiguousPaymentEntry {
        instrument: PaymentInstrument,
        amount_minor: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, checked before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: &'static str },

    /// Value must be non-zero (adjustments carry their direction as a sign).
    #[error("{field} must be non-zero")]
    MustBeNonZero { field: &'static str },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-77".to_string(),
            available: 3,
            requested: 4,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for p-77: available 3, requested 4"
        );

        let err = CoreError::NoSuchCustomer {
            customer_id: "c-1".to_string(),
        };
        assert_eq!(err.to_string(), "No such customer: c-1");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive { field: "quantity" };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
