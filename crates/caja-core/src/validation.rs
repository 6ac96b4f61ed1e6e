//! # Validation Module
//!
//! Input checks that run before any business logic or write. A settlement
//! that fails validation leaves no partial state behind, because it never
//! gets past this layer.

use crate::error::ValidationError;
use crate::types::{Cart, PaymentEntry};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY, MAX_PAYMENT_INSTRUMENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: must be >= 1 and within the per-line cap.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive { field: "quantity" });
    }
    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity",
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a unit price in cents. Zero is allowed (promotional items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price",
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates an amount-paid value in cents. Zero is allowed (a partial
/// payment of nothing is a degenerate but legal input).
pub fn validate_amount_paid_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "amount_paid",
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Structure Validators
// =============================================================================

/// Validates cart shape: line count cap, and per-line quantity and price.
/// Emptiness is a settlement-level error (`EmptyCart`), not a validation one.
pub fn validate_cart_lines(cart: &Cart) -> ValidationResult<()> {
    if cart.lines.len() > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines",
            min: 0,
            max: MAX_CART_LINES as i64,
        });
    }
    for line in &cart.lines {
        validate_quantity(line.quantity)?;
        validate_price_cents(line.unit_price_cents)?;
    }
    Ok(())
}

/// Validates a payment breakdown: at most [`MAX_PAYMENT_INSTRUMENTS`] legs.
/// Non-positive legs are not an error here; the classifier discards them.
pub fn validate_breakdown(entries: &[PaymentEntry]) -> ValidationResult<()> {
    if entries.len() > MAX_PAYMENT_INSTRUMENTS {
        return Err(ValidationError::OutOfRange {
            field: "payment entries",
            min: 0,
            max: MAX_PAYMENT_INSTRUMENTS as i64,
        });
    }
    Ok(())
}

/// Validates a movement reference string.
pub fn validate_reference(reference: &str) -> ValidationResult<()> {
    if reference.trim().is_empty() {
        return Err(ValidationError::Required { field: "reference" });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CartLine, Currency, PaymentInstrument};

    fn line(qty: i64, price: i64) -> CartLine {
        CartLine {
            product_id: "p1".into(),
            name: "Arroz".into(),
            unit_price_cents: price,
            quantity: qty,
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(1099).is_ok());
        assert!(validate_price_cents(-100).is_err());
    }

    #[test]
    fn test_validate_cart_lines() {
        let cart = Cart::new(vec![line(2, 1000)]);
        assert!(validate_cart_lines(&cart).is_ok());

        let bad = Cart::new(vec![line(0, 1000)]);
        assert!(validate_cart_lines(&bad).is_err());

        let bad = Cart::new(vec![line(1, -5)]);
        assert!(validate_cart_lines(&bad).is_err());
    }

    #[test]
    fn test_validate_breakdown_caps_instruments() {
        let entry = PaymentEntry {
            instrument: PaymentInstrument::CashUsd,
            amount_minor: 100,
            currency: Some(Currency::Usd),
        };
        assert!(validate_breakdown(&vec![entry.clone(); MAX_PAYMENT_INSTRUMENTS]).is_ok());
        assert!(validate_breakdown(&vec![entry; MAX_PAYMENT_INSTRUMENTS + 1]).is_err());
    }

    #[test]
    fn test_validate_reference() {
        assert!(validate_reference("sale:abc").is_ok());
        assert!(validate_reference("   ").is_err());
    }
}
