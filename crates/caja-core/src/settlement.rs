//! # Settlement Calculator
//!
//! Turns a cart, a payment type, and an amount paid into the authoritative
//! totals, paid amounts, and remaining debt for a sale.
//!
//! ## Control Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cart + PaymentType + amount_paid + rate                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  settle() ── validation first, no partial state on failure              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Settlement { totals, paid, change, debt, status }                      │
//! │       │                                                                 │
//! │       ├──► one SALE stock movement per line   (stock ledger)            │
//! │       └──► debt increase when not fully paid  (debt ledger)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All math is integer cents; `total_ves` is frozen from the passed-in rate
//! and never recomputed from a later one.

use serde::{Deserialize, Serialize};

use crate::config::{LedgerConfig, OverpaymentPolicy};
use crate::error::{CoreError, CoreResult};
use crate::money::{ExchangeRate, Usd, Ves};
use crate::types::{Cart, DiscountRate, PaymentStatus, PaymentType};
use crate::validation;

// =============================================================================
// Settlement Result
// =============================================================================

/// The normalized result of settling a sale. Everything downstream — the
/// sale record, stock movements, debt ledger, receipts — reads from this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub subtotal_usd: Usd,
    pub discount_usd: Usd,
    /// `subtotal × (1 - discount)`.
    pub total_usd: Usd,
    /// `total_usd × rate`, frozen at settlement time.
    pub total_ves: Ves,
    /// Recorded amount paid. For mixed payments with change due this clamps
    /// to the total; the overage is in `change_usd`.
    pub amount_paid_usd: Usd,
    pub amount_paid_ves: Ves,
    /// Change returned to the customer (mixed payments only).
    pub change_usd: Usd,
    /// What the customer still owes on this sale.
    pub debt_usd: Usd,
    pub status: PaymentStatus,
    pub rate: ExchangeRate,
}

// =============================================================================
// Settlement
// =============================================================================

/// Settles a sale.
///
/// Fails with `EmptyCart`, `InvalidDiscount` (carried by [`DiscountRate`]
/// construction), a validation error, or `OverpaymentNotAllowed` — all
/// before the caller writes anything.
///
/// Status derivation: zero debt → `Paid`; credit → `Pending`; anything
/// else with debt remaining → `Partial` (including a partial sale where
/// nothing was paid; only credit sales report `Pending`).
///
/// ## Example
/// ```rust
/// use caja_core::config::LedgerConfig;
/// use caja_core::money::{ExchangeRate, Usd};
/// use caja_core::settlement::settle;
/// use caja_core::types::{Cart, CartLine, DiscountRate, PaymentStatus, PaymentType};
///
/// let cart = Cart::new(vec![CartLine {
///     product_id: "p1".into(),
///     name: "Harina PAN".into(),
///     unit_price_cents: 1000,
///     quantity: 2,
/// }]);
/// let result = settle(
///     &cart,
///     PaymentType::Partial,
///     DiscountRate::from_percentage(10.0).unwrap(),
///     Usd::from_cents(1000),
///     ExchangeRate::from_scaled(40_0000).unwrap(),
///     &LedgerConfig::default(),
/// )
/// .unwrap();
/// assert_eq!(result.total_usd.cents(), 1800);
/// assert_eq!(result.debt_usd.cents(), 800);
/// assert_eq!(result.status, PaymentStatus::Partial);
/// ```
pub fn settle(
    cart: &Cart,
    payment_type: PaymentType,
    discount: DiscountRate,
    amount_paid: Usd,
    rate: ExchangeRate,
    config: &LedgerConfig,
) -> CoreResult<Settlement> {
    if cart.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    validation::validate_cart_lines(cart)?;
    validation::validate_amount_paid_cents(amount_paid.cents())?;

    let subtotal_usd = cart.subtotal();
    let discount_usd = subtotal_usd.discount_amount(discount.bps());
    let total_usd = subtotal_usd - discount_usd;

    let (paid, change) = match payment_type {
        PaymentType::Full => (total_usd, Usd::zero()),
        PaymentType::Credit => (Usd::zero(), Usd::zero()),
        PaymentType::Partial => {
            if amount_paid > total_usd {
                return Err(CoreError::OverpaymentNotAllowed {
                    total_cents: total_usd.cents(),
                    paid_cents: amount_paid.cents(),
                });
            }
            (amount_paid, Usd::zero())
        }
        PaymentType::Mixed => {
            if amount_paid > total_usd {
                match config.mixed_overpayment {
                    OverpaymentPolicy::ChangeDue => (total_usd, amount_paid - total_usd),
                    OverpaymentPolicy::Reject => {
                        return Err(CoreError::OverpaymentNotAllowed {
                            total_cents: total_usd.cents(),
                            paid_cents: amount_paid.cents(),
                        })
                    }
                }
            } else {
                (amount_paid, Usd::zero())
            }
        }
    };

    let debt_usd = total_usd.sub_or_zero(paid);

    let status = if debt_usd.is_zero() {
        PaymentStatus::Paid
    } else if payment_type == PaymentType::Credit {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Partial
    };

    Ok(Settlement {
        subtotal_usd,
        discount_usd,
        total_usd,
        total_ves: rate.to_ves(total_usd),
        amount_paid_usd: paid,
        amount_paid_ves: rate.to_ves(paid),
        change_usd: change,
        debt_usd,
        status,
        rate,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CartLine;

    fn cart(lines: &[(i64, i64)]) -> Cart {
        Cart::new(
            lines
                .iter()
                .enumerate()
                .map(|(i, &(price, qty))| CartLine {
                    product_id: format!("p{i}"),
                    name: format!("Producto {i}"),
                    unit_price_cents: price,
                    quantity: qty,
                })
                .collect(),
        )
    }

    fn rate() -> ExchangeRate {
        ExchangeRate::from_scaled(40_0000).unwrap()
    }

    fn config() -> LedgerConfig {
        LedgerConfig::default()
    }

    #[test]
    fn test_partial_with_discount() {
        // [{price 10.00, qty 2}], 10% off → total 18.00; paid 10.00 → debt 8.00
        let result = settle(
            &cart(&[(1000, 2)]),
            PaymentType::Partial,
            DiscountRate::from_percentage(10.0).unwrap(),
            Usd::from_cents(1000),
            rate(),
            &config(),
        )
        .unwrap();

        assert_eq!(result.subtotal_usd.cents(), 2000);
        assert_eq!(result.discount_usd.cents(), 200);
        assert_eq!(result.total_usd.cents(), 1800);
        assert_eq!(result.total_ves.cents(), 72_000);
        assert_eq!(result.amount_paid_usd.cents(), 1000);
        assert_eq!(result.debt_usd.cents(), 800);
        assert_eq!(result.status, PaymentStatus::Partial);
    }

    #[test]
    fn test_full_payment() {
        let result = settle(
            &cart(&[(1000, 2), (350, 1)]),
            PaymentType::Full,
            DiscountRate::zero(),
            Usd::zero(),
            rate(),
            &config(),
        )
        .unwrap();

        assert_eq!(result.total_usd.cents(), 2350);
        assert_eq!(result.amount_paid_usd.cents(), 2350);
        assert_eq!(result.debt_usd.cents(), 0);
        assert_eq!(result.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_credit_sale() {
        let result = settle(
            &cart(&[(2500, 1)]),
            PaymentType::Credit,
            DiscountRate::zero(),
            Usd::zero(),
            rate(),
            &config(),
        )
        .unwrap();

        assert_eq!(result.amount_paid_usd.cents(), 0);
        assert_eq!(result.debt_usd.cents(), 2500);
        assert_eq!(result.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_empty_cart_rejected() {
        let err = settle(
            &Cart::default(),
            PaymentType::Full,
            DiscountRate::zero(),
            Usd::zero(),
            rate(),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::EmptyCart));
    }

    #[test]
    fn test_partial_overpayment_rejected() {
        let err = settle(
            &cart(&[(1000, 1)]),
            PaymentType::Partial,
            DiscountRate::zero(),
            Usd::from_cents(1500),
            rate(),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::OverpaymentNotAllowed {
                total_cents: 1000,
                paid_cents: 1500,
            }
        ));
    }

    #[test]
    fn test_mixed_overpayment_gives_change() {
        let result = settle(
            &cart(&[(1800, 1)]),
            PaymentType::Mixed,
            DiscountRate::zero(),
            Usd::from_cents(2000),
            rate(),
            &config(),
        )
        .unwrap();

        assert_eq!(result.amount_paid_usd.cents(), 1800);
        assert_eq!(result.change_usd.cents(), 200);
        assert_eq!(result.debt_usd.cents(), 0);
        assert_eq!(result.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_mixed_overpayment_reject_policy() {
        let config = LedgerConfig::default().mixed_overpayment(OverpaymentPolicy::Reject);
        let err = settle(
            &cart(&[(1800, 1)]),
            PaymentType::Mixed,
            DiscountRate::zero(),
            Usd::from_cents(2000),
            rate(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::OverpaymentNotAllowed { .. }));
    }

    #[test]
    fn test_partial_nothing_paid_is_partial_not_pending() {
        let result = settle(
            &cart(&[(1000, 1)]),
            PaymentType::Partial,
            DiscountRate::zero(),
            Usd::zero(),
            rate(),
            &config(),
        )
        .unwrap();
        assert_eq!(result.debt_usd.cents(), 1000);
        assert_eq!(result.status, PaymentStatus::Partial);
    }

    #[test]
    fn test_hundred_percent_discount_is_paid() {
        let result = settle(
            &cart(&[(1000, 3)]),
            PaymentType::Full,
            DiscountRate::from_percentage(100.0).unwrap(),
            Usd::zero(),
            rate(),
            &config(),
        )
        .unwrap();
        assert_eq!(result.total_usd.cents(), 0);
        assert_eq!(result.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_negative_amount_paid_rejected() {
        let err = settle(
            &cart(&[(1000, 1)]),
            PaymentType::Partial,
            DiscountRate::zero(),
            Usd::from_cents(-100),
            rate(),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_total_accumulates_without_rounding_drift() {
        // 33 lines of $0.10 ⇒ exactly $3.30; floats would have drifted.
        let lines: Vec<(i64, i64)> = vec![(10, 1); 33];
        let result = settle(
            &cart(&lines),
            PaymentType::Full,
            DiscountRate::zero(),
            Usd::zero(),
            rate(),
            &config(),
        )
        .unwrap();
        assert_eq!(result.total_usd.cents(), 330);
    }
}
