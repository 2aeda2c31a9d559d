//! Decimal money arithmetic and derived cart totals.
//!
//! Amounts are `rust_decimal::Decimal` in the store currency's standard unit
//! (dollars, not cents). Totals stay unrounded internally; rounding to two
//! decimal places happens only when an amount is displayed.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Flat sales tax applied to every cart subtotal (10%).
pub const TAX_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Subtotal, tax and total derived from cart contents.
///
/// Never stored: recompute with [`DerivedTotals::from_lines`] whenever the
/// underlying lines change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DerivedTotals {
    /// Sum of `unit_price * quantity` over all lines.
    pub subtotal: Decimal,
    /// `subtotal * TAX_RATE`, unrounded.
    pub tax: Decimal,
    /// `subtotal + tax`, unrounded.
    pub total: Decimal,
}

impl DerivedTotals {
    /// Compute totals from `(unit_price, quantity)` pairs.
    #[must_use]
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = (Decimal, u32)>,
    {
        let subtotal = lines
            .into_iter()
            .map(|(price, quantity)| price * Decimal::from(quantity))
            .sum::<Decimal>();
        Self::from_subtotal(subtotal)
    }

    /// Compute tax and total for a known subtotal.
    #[must_use]
    pub fn from_subtotal(subtotal: Decimal) -> Self {
        let tax = subtotal * TAX_RATE;
        Self {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }

    /// Copy with every amount rounded for display.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            subtotal: round_for_display(self.subtotal),
            tax: round_for_display(self.tax),
            total: round_for_display(self.total),
        }
    }
}

/// Round an amount to two decimal places, midpoints away from zero.
#[must_use]
pub fn round_for_display(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format an amount as a price string (e.g., `$19.99`).
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    format!("${:.2}", round_for_display(amount))
}
