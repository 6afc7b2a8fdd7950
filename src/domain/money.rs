//! Currency arithmetic helpers.
//!
//! All monetary values in the store are plain decimals at a fixed two-decimal
//! currency precision. The helpers here are the single place that precision
//! is decided, so totals computed in the order pipeline and amounts echoed to
//! the payment gateway always agree digit for digit.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places carried by every persisted or wire-visible amount.
pub const CURRENCY_DP: u32 = 2;

/// Round to currency precision, half away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Fixed two-decimal string form, the shape the gateway signs and compares.
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = round_currency(amount);
    rounded.rescale(CURRENCY_DP);
    rounded.to_string()
}

/// Parse a reported amount string leniently ("200", "200.0", " 200.00 ")
/// and normalize it for comparison against a stored amount.
pub fn normalize_amount(raw: &str) -> Option<String> {
    let parsed: Decimal = raw.trim().parse().ok()?;
    Some(format_amount(parsed))
}

/// Line total for a quantity of units at a unit price.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    round_currency(unit_price * Decimal::from(quantity))
}
