//! # Ledger Configuration
//!
//! The knobs the original system kept as implicit global settings, made
//! explicit and passed into the settlement calculator and the ledgers at
//! call time. No ambient state.

use serde::{Deserialize, Serialize};

use crate::DEFAULT_TOLERANCE_CENTS;

/// What to do when a mixed payment tenders more than the final total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    /// Accept the tender and return change; the recorded amount paid clamps
    /// to the total. This is the register's default behavior.
    ChangeDue,
    /// Reject with `OverpaymentNotAllowed`, same as a partial payment.
    Reject,
}

/// Call-time configuration for settlement and the ledgers.
///
/// ## Example
/// ```rust
/// use caja_core::config::LedgerConfig;
///
/// let config = LedgerConfig::default()
///     .allow_negative_stock(true)
///     .low_stock_threshold(10);
/// assert!(config.allow_negative_stock);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Absolute tolerance (USD cents) for the legacy currency heuristic.
    /// The historical value is 0.5 currency units; it has no documented
    /// derivation, so it stays configurable rather than hardcoded.
    pub classifier_tolerance_cents: i64,

    /// Permit movements that take stock negative. When set, the movement is
    /// applied and flagged in its notes instead of failing.
    pub allow_negative_stock: bool,

    /// Stock level at or below which a product counts as low-stock.
    pub low_stock_threshold: i64,

    /// Overpayment behavior for mixed payments. Partial payments always
    /// reject overpayment regardless of this setting.
    pub mixed_overpayment: OverpaymentPolicy,
}

impl LedgerConfig {
    pub fn classifier_tolerance_cents(mut self, cents: i64) -> Self {
        self.classifier_tolerance_cents = cents;
        self
    }

    pub fn allow_negative_stock(mut self, allow: bool) -> Self {
        self.allow_negative_stock = allow;
        self
    }

    pub fn low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn mixed_overpayment(mut self, policy: OverpaymentPolicy) -> Self {
        self.mixed_overpayment = policy;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            classifier_tolerance_cents: DEFAULT_TOLERANCE_CENTS,
            allow_negative_stock: false,
            low_stock_threshold: 5,
            mixed_overpayment: OverpaymentPolicy::ChangeDue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.classifier_tolerance_cents, 50);
        assert!(!config.allow_negative_stock);
        assert_eq!(config.low_stock_threshold, 5);
        assert_eq!(config.mixed_overpayment, OverpaymentPolicy::ChangeDue);
    }

    #[test]
    fn test_builder() {
        let config = LedgerConfig::default()
            .classifier_tolerance_cents(100)
            .mixed_overpayment(OverpaymentPolicy::Reject);
        assert_eq!(config.classifier_tolerance_cents, 100);
        assert_eq!(config.mixed_overpayment, OverpaymentPolicy::Reject);
    }
}
