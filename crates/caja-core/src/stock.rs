//! # Stock Transitions
//!
//! Pure math for the stock ledger: movement direction and the
//! previous/new-stock transition. The storage crate wraps these in a
//! transaction with compare-and-swap retries; this module never touches
//! state.
//!
//! ## Sign Convention
//! ```text
//! IN                    stock goes up
//! ADJUSTMENT (qty > 0)  stock goes up
//! OUT                   stock goes down
//! SALE                  stock goes down
//! ADJUSTMENT (qty < 0)  stock goes down
//! ```
//! The stored quantity is always the unsigned magnitude; direction is
//! recoverable from the kind plus `new_stock - previous_stock`.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::MovementKind;

/// The computed outcome of applying one movement to a stock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockTransition {
    pub previous: i64,
    pub new: i64,
    /// Unsigned magnitude to store on the movement record.
    pub stored_quantity: i64,
    /// Set when the movement was permitted to take stock negative; the
    /// storage layer flags it in the movement's notes.
    pub went_negative: bool,
}

/// Returns the signed stock delta for a movement.
///
/// `In`, `Out`, and `Sale` require a positive quantity; `Adjustment`
/// requires a non-zero one and carries its direction in the sign.
pub fn movement_delta(kind: MovementKind, quantity: i64) -> CoreResult<i64> {
    match kind {
        MovementKind::In | MovementKind::Out | MovementKind::Sale => {
            if quantity <= 0 {
                return Err(ValidationError::MustBePositive { field: "quantity" }.into());
            }
            Ok(match kind {
                MovementKind::In => quantity,
                _ => -quantity,
            })
        }
        MovementKind::Adjustment => {
            if quantity == 0 {
                return Err(ValidationError::MustBeNonZero { field: "quantity" }.into());
            }
            Ok(quantity)
        }
    }
}

/// Computes the stock transition for one movement.
///
/// Fails with [`CoreError::InsufficientStock`] if the result would go
/// negative and `allow_negative` is not set.
pub fn apply_movement(
    product_id: &str,
    previous: i64,
    kind: MovementKind,
    quantity: i64,
    allow_negative: bool,
) -> CoreResult<StockTransition> {
    let delta = movement_delta(kind, quantity)?;
    let new = previous + delta;

    if new < 0 && !allow_negative {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available: previous,
            requested: delta.abs(),
        });
    }

    Ok(StockTransition {
        previous,
        new,
        stored_quantity: delta.abs(),
        went_negative: new < 0,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_convention() {
        assert_eq!(movement_delta(MovementKind::In, 5).unwrap(), 5);
        assert_eq!(movement_delta(MovementKind::Out, 5).unwrap(), -5);
        assert_eq!(movement_delta(MovementKind::Sale, 2).unwrap(), -2);
        assert_eq!(movement_delta(MovementKind::Adjustment, 3).unwrap(), 3);
        assert_eq!(movement_delta(MovementKind::Adjustment, -3).unwrap(), -3);
    }

    #[test]
    fn test_invalid_quantities() {
        assert!(movement_delta(MovementKind::In, 0).is_err());
        assert!(movement_delta(MovementKind::Sale, -2).is_err());
        assert!(movement_delta(MovementKind::Adjustment, 0).is_err());
    }

    #[test]
    fn test_sale_transition() {
        // stock 5, SALE quantity 2 → previous 5, new 3
        let t = apply_movement("p1", 5, MovementKind::Sale, 2, false).unwrap();
        assert_eq!(t.previous, 5);
        assert_eq!(t.new, 3);
        assert_eq!(t.stored_quantity, 2);
        assert!(!t.went_negative);
    }

    #[test]
    fn test_insufficient_stock() {
        // SALE quantity 4 on stock 3 without allow_negative → fails
        let err = apply_movement("p1", 3, MovementKind::Sale, 4, false).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_stock_permitted_and_flagged() {
        let t = apply_movement("p1", 3, MovementKind::Sale, 4, true).unwrap();
        assert_eq!(t.new, -1);
        assert!(t.went_negative);
    }

    #[test]
    fn test_negative_adjustment() {
        let t = apply_movement("p1", 10, MovementKind::Adjustment, -4, false).unwrap();
        assert_eq!(t.new, 6);
        assert_eq!(t.stored_quantity, 4);
    }

    #[test]
    fn test_round_trip_invariant() {
        // new_stock = previous_stock ± quantity, recoverable from the kind
        let t = apply_movement("p1", 7, MovementKind::In, 3, false).unwrap();
        assert_eq!(t.new - t.previous, t.stored_quantity);

        let t = apply_movement("p1", 7, MovementKind::Out, 3, false).unwrap();
        assert_eq!(t.previous - t.new, t.stored_quantity);
    }
}
