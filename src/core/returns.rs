//! Simple percentage returns

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Percent change from `start` to `end`, rounded half away from zero to two
/// decimals. `None` when `start` is not a positive price or the result is
/// not finite.
pub fn percent_change(start: f64, end: f64) -> Option<Decimal> {
    if start.is_nan() || start <= 0.0 || !end.is_finite() {
        return None;
    }
    let change = (end - start) / start * 100.0;
    Decimal::from_f64(change)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Percent change between the first and last value of a series; needs at
/// least two points.
pub fn series_change(closes: &[f64]) -> Option<Decimal> {
    match closes {
        [first, .., last] => percent_change(*first, *last),
        _ => None,
    }
}
