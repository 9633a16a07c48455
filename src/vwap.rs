//! C2 — VWAP estimator. Walks order-book depth to produce an all-in average
//! price (base fee + convex fee curve + slippage) for a target size, and
//! the inverse operation: the maximum size fillable within a deviation cap
//! of a limit price.

use crate::types::{BookLevel, Side};

/// Result of walking a book side to fill `target_shares` (or as much of it
/// as depth allows).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VwapFill {
    pub filled_shares: f64,
    pub avg_raw_price: f64,
    pub avg_all_in_price: f64,
    pub levels_used: u32,
}

/// Per-share fee at a raw level price: base bps plus an optional convex
/// curve term, clamped to non-negative.
pub fn per_share_fee(price: f64, fee_bps: f64, curve_rate: f64, curve_exponent: f64) -> f64 {
    let base = price * (fee_bps / 10_000.0);
    let curve = price * curve_rate * (price - 0.5).abs().powf(curve_exponent);
    (base + curve).max(0.0)
}

/// The all-in per-share price at one book level: raw price plus fee, plus
/// slippage added (buys) or subtracted (sells).
fn level_all_in_price(price: f64, side: Side, fee_bps: f64, curve_rate: f64, curve_exponent: f64, slippage_bps: f64) -> f64 {
    let fee = per_share_fee(price, fee_bps, curve_rate, curve_exponent);
    let slip = price * slippage_bps / 10_000.0;
    match side {
        Side::Buy => price + fee + slip,
        Side::Sell => price - fee - slip,
    }
}

/// Signed deviation of an all-in average from a limit, in bps. Positive is
/// adverse: paying more than the limit (buys) or receiving less (sells).
fn deviation_bps(avg_all_in: f64, limit: f64, side: Side) -> f64 {
    match side {
        Side::Buy => (avg_all_in - limit) / limit * 10_000.0,
        Side::Sell => (limit - avg_all_in) / limit * 10_000.0,
    }
}

/// Walks `levels` (asks for buys, bids for sells) to fill `target_shares`.
/// Returns `None` if the available depth cannot fill the target.
pub fn estimate(
    levels: &[BookLevel],
    target_shares: f64,
    side: Side,
    fee_bps: f64,
    curve_rate: f64,
    curve_exponent: f64,
    slippage_bps: f64,
) -> Option<VwapFill> {
    if target_shares <= 0.0 || !target_shares.is_finite() {
        return None;
    }

    let mut filled = 0.0;
    let mut raw_notional = 0.0;
    let mut all_in_notional = 0.0;
    let mut levels_used = 0u32;

    for level in levels {
        if filled >= target_shares {
            break;
        }
        let remaining = target_shares - filled;
        let take = remaining.min(level.size);
        if take <= 0.0 {
            continue;
        }
        let all_in = level_all_in_price(level.price, side, fee_bps, curve_rate, curve_exponent, slippage_bps);
        filled += take;
        raw_notional += take * level.price;
        all_in_notional += take * all_in;
        levels_used += 1;
    }

    if filled + 1e-9 < target_shares || filled <= 0.0 {
        return None;
    }

    Some(VwapFill {
        filled_shares: filled,
        avg_raw_price: raw_notional / filled,
        avg_all_in_price: all_in_notional / filled,
        levels_used,
    })
}

/// Inverse operation: walks `levels` while the running all-in average,
/// compared to `limit`, stays within `max_deviation_bps`. Returns the
/// cumulative shares at the point the cap would first be exceeded, using
/// linear interpolation on the running total within the level that would
/// breach it (each level contributes an affine all-in price, so the
/// breach point is exact, not approximated).
pub fn max_shares_for_limit(
    levels: &[BookLevel],
    limit: f64,
    max_deviation_bps: f64,
    side: Side,
    fee_bps: f64,
    curve_rate: f64,
    curve_exponent: f64,
    slippage_bps: f64,
) -> Option<VwapFill> {
    let mut shares = 0.0;
    let mut raw_notional = 0.0;
    let mut all_in_notional = 0.0;
    let mut levels_used = 0u32;

    let target_all_in = match side {
        Side::Buy => limit * (1.0 + max_deviation_bps / 10_000.0),
        Side::Sell => limit * (1.0 - max_deviation_bps / 10_000.0),
    };

    for level in levels {
        let p = level_all_in_price(level.price, side, fee_bps, curve_rate, curve_exponent, slippage_bps);

        let full_shares = shares + level.size;
        let full_notional = all_in_notional + level.size * p;
        let full_avg = full_notional / full_shares;
        let full_dev = deviation_bps(full_avg, limit, side);

        if full_dev <= max_deviation_bps {
            shares = full_shares;
            raw_notional += level.size * level.price;
            all_in_notional = full_notional;
            levels_used += 1;
            continue;
        }

        // Breach within this level: solve for x such that
        // (all_in_notional + x*p) / (shares + x) has deviation == cap.
        if (p - target_all_in).abs() < 1e-12 {
            break;
        }
        let x = (target_all_in * shares - all_in_notional) / (p - target_all_in);
        let x = x.clamp(0.0, level.size);
        if x > 1e-12 {
            shares += x;
            raw_notional += x * level.price;
            all_in_notional += x * p;
            levels_used += 1;
        }
        break;
    }

    if shares <= 0.0 {
        return None;
    }

    Some(VwapFill {
        filled_shares: shares,
        avg_raw_price: raw_notional / shares,
        avg_all_in_price: all_in_notional / shares,
        levels_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookLevel;

    fn asks() -> Vec<BookLevel> {
        vec![
            BookLevel { price: 0.40, size: 60.0 },
            BookLevel { price: 0.41, size: 40.0 },
        ]
    }

    #[test]
    fn estimate_fills_across_levels() {
        let fill = estimate(&asks(), 80.0, Side::Buy, 100.0, 0.0, 2.0, 0.0).unwrap();
        assert_eq!(fill.filled_shares, 80.0);
        assert_eq!(fill.levels_used, 2);
        assert!(fill.avg_all_in_price > fill.avg_raw_price);
    }

    #[test]
    fn estimate_returns_none_when_depth_insufficient() {
        assert!(estimate(&asks(), 1000.0, Side::Buy, 100.0, 0.0, 2.0, 0.0).is_none());
    }

    #[test]
    fn estimate_monotonic_in_size() {
        let f1 = estimate(&asks(), 30.0, Side::Buy, 100.0, 0.0, 2.0, 0.0).unwrap();
        let f2 = estimate(&asks(), 90.0, Side::Buy, 100.0, 0.0, 2.0, 0.0).unwrap();
        assert!(f1.filled_shares <= f2.filled_shares);
        assert!(f1.avg_all_in_price <= f2.avg_all_in_price);
    }

    #[test]
    fn max_shares_for_limit_respects_cap() {
        let book = vec![
            BookLevel { price: 0.40, size: 60.0 },
            BookLevel { price: 0.50, size: 40.0 },
        ];
        let fill = max_shares_for_limit(&book, 0.40, 100.0, Side::Buy, 100.0, 0.0, 2.0, 0.0).unwrap();
        // Deviation must not exceed the cap.
        let dev = deviation_bps(fill.avg_all_in_price, 0.40, Side::Buy);
        assert!(dev <= 100.0 + 1e-6);
        // Second, far worse level should not be fully consumed.
        assert!(fill.filled_shares < 100.0);
    }

    #[test]
    fn max_shares_for_limit_roundtrips_within_cap() {
        let book = vec![
            BookLevel { price: 0.40, size: 60.0 },
            BookLevel { price: 0.45, size: 60.0 },
            BookLevel { price: 0.50, size: 60.0 },
        ];
        let cap = 150.0;
        let fill = max_shares_for_limit(&book, 0.40, cap, Side::Buy, 100.0, 0.0, 2.0, 0.0).unwrap();
        let check = estimate(&book, fill.filled_shares, Side::Buy, 100.0, 0.0, 2.0, 0.0).unwrap();
        let dev = deviation_bps(check.avg_all_in_price, 0.40, Side::Buy);
        assert!(dev <= cap + 1e-6);
    }
}
