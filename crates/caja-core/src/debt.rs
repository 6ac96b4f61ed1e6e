//! # Debt Transitions
//!
//! Pure math for the customer debt ledger. The projection rules:
//!
//! - debt never goes negative (payments clamp at zero — a deliberate,
//!   documented policy, not error hiding);
//! - `debt_since` is set the moment debt transitions 0 → positive and
//!   cleared the moment it returns to exactly 0.
//!
//! The storage crate pairs every transition with a Sale or
//! PaymentTransaction audit record and applies it under compare-and-swap.

use chrono::{DateTime, Utc};

use crate::money::Usd;

/// A customer's debt position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtState {
    pub total: Usd,
    pub since: Option<DateTime<Utc>>,
}

impl DebtState {
    pub fn new(total: Usd, since: Option<DateTime<Utc>>) -> Self {
        DebtState { total, since }
    }

    pub fn zero() -> Self {
        DebtState {
            total: Usd::zero(),
            since: None,
        }
    }
}

/// Applies a sale's debt contribution. `delta` is normally positive; a
/// negative delta (voided credit line) still clamps at zero.
pub fn record_sale(state: DebtState, delta: Usd, now: DateTime<Utc>) -> DebtState {
    let new_total = if delta.is_negative() {
        state.total.sub_or_zero(delta.abs())
    } else {
        state.total + delta
    };

    let since = if new_total.is_zero() {
        None
    } else if state.total.is_zero() {
        Some(now)
    } else {
        state.since
    };

    DebtState {
        total: new_total,
        since,
    }
}

/// Applies a debt payment. Over-payment clamps the balance at zero and
/// clears `debt_since`.
pub fn record_payment(state: DebtState, amount: Usd) -> DebtState {
    let new_total = state.total.sub_or_zero(amount);
    DebtState {
        total: new_total,
        since: if new_total.is_zero() { None } else { state.since },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
