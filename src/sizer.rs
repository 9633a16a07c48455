//! C4 — adaptive sizer. Shrinks every leg to a single, balanced share count
//! bounded by the thinnest book among the legs, by configured depth usage,
//! and by the maximum-shares cap.

use std::collections::HashMap;

use crate::error::{ErrorKind, PreflightDepthKind, RouterError};
use crate::types::{Book, Leg, LegKey};
use crate::vwap;

/// Computes the common executable share count for a leg-set: the minimum
/// of each leg's `maxSharesForLimit` against its own book and side, scaled
/// by `depth_usage × quality_factor` and capped at `max_shares`. Fails with
/// `Preflight.Depth` if any leg's book is missing or if the resulting size
/// is below `min_depth_shares`.
#[allow(clippy::too_many_arguments)]
pub fn compute_adaptive_size(
    legs: &[Leg],
    books: &HashMap<LegKey, Book>,
    max_deviation_bps: f64,
    depth_usage: f64,
    quality_factor: f64,
    max_shares: f64,
    min_depth_shares: f64,
    fee_bps: f64,
    curve_rate: f64,
    curve_exponent: f64,
    slippage_bps: f64,
) -> Result<f64, RouterError> {
    let mut min_shares = f64::INFINITY;

    for leg in legs {
        let key = leg.key();
        let book = books
            .get(&key)
            .ok_or_else(|| RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::MissingOrderbook { key: key.clone() })))?;
        let levels = book.fill_side(leg.side);
        let fill = vwap::max_shares_for_limit(
            levels,
            leg.limit_price,
            max_deviation_bps,
            leg.side,
            fee_bps,
            curve_rate,
            curve_exponent,
            slippage_bps,
        )
        .ok_or_else(|| {
            RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::InsufficientDepth {
                available: 0.0,
                required: leg.target_shares,
            }))
        })?;
        min_shares = min_shares.min(fill.filled_shares);
    }

    if !min_shares.is_finite() {
        return Err(RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::InsufficientDepth {
            available: 0.0,
            required: 0.0,
        })));
    }

    let sized = (min_shares * depth_usage * quality_factor).min(max_shares);
    if sized < min_depth_shares {
        return Err(RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::InsufficientDepth {
            available: sized,
            required: min_depth_shares,
        })));
    }
    Ok(sized)
}

/// Returns a copy of `legs` with every leg's size replaced by `shares`.
pub fn apply_uniform_size(legs: &[Leg], shares: f64) -> Vec<Leg> {
    legs.iter().map(|leg| leg.with_shares(shares)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookLevel, Side, Venue};

    fn books_for(predict_depth: f64, poly_depth: f64) -> HashMap<LegKey, Book> {
        let mut m = HashMap::new();
        m.insert(
            LegKey { venue: Venue::Predict, token_id: "T1".into(), side: Side::Buy },
            Book {
                bids: vec![],
                asks: vec![BookLevel { price: 0.40, size: predict_depth }],
            },
        );
        m.insert(
            LegKey { venue: Venue::Polymarket, token_id: "T1p".into(), side: Side::Sell },
            Book {
                bids: vec![BookLevel { price: 0.55, size: poly_depth }],
                asks: vec![],
            },
        );
        m
    }

    fn legs() -> Vec<Leg> {
        vec![
            Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 200.0),
            Leg::new(Venue::Polymarket, "T1p", Side::Sell, 0.55, 200.0),
        ]
    }

    #[test]
    fn sizes_to_depth_usage_of_thinnest_book() {
        let books = books_for(60.0, 70.0);
        let sized = compute_adaptive_size(&legs(), &books, 10_000.0, 0.5, 1.0, 1_000.0, 1.0, 0.0, 0.0, 2.0, 0.0).unwrap();
        assert!((sized - 30.0).abs() < 1e-6);
    }

    #[test]
    fn fails_when_below_min_depth_shares() {
        let books = books_for(1.0, 1.0);
        let err = compute_adaptive_size(&legs(), &books, 10_000.0, 0.5, 1.0, 1_000.0, 10.0, 0.0, 0.0, 2.0, 0.0).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::PreflightDepth(PreflightDepthKind::InsufficientDepth { .. })));
    }

    #[test]
    fn fails_on_missing_book() {
        let books: HashMap<LegKey, Book> = HashMap::new();
        let err = compute_adaptive_size(&legs(), &books, 10_000.0, 0.5, 1.0, 1_000.0, 1.0, 0.0, 0.0, 2.0, 0.0).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::PreflightDepth(PreflightDepthKind::MissingOrderbook { .. })));
    }
}
