//! Core domain types shared by every component: legs, venues, order books,
//! and the results that flow between the dispatcher, post-trade monitor,
//! and reputation gate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three venues this router executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    Predict,
    Polymarket,
    Opinion,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Predict => "predict",
            Venue::Polymarket => "polymarket",
            Venue::Opinion => "opinion",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buy or sell side of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work handed to the dispatcher: one venue-side order forming
/// part of an arbitrage. Immutable after construction — the adaptive sizer
/// and retry loop produce *new* legs with adjusted size/price rather than
/// mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub venue: Venue,
    pub token_id: String,
    pub side: Side,
    /// Limit price, strictly inside (0, 1).
    pub limit_price: f64,
    /// Target size in shares, strictly positive.
    pub target_shares: f64,
}

impl Leg {
    pub fn new(venue: Venue, token_id: impl Into<String>, side: Side, limit_price: f64, target_shares: f64) -> Self {
        Self {
            venue,
            token_id: token_id.into(),
            side,
            limit_price,
            target_shares,
        }
    }

    pub fn key(&self) -> LegKey {
        LegKey {
            venue: self.venue,
            token_id: self.token_id.clone(),
            side: self.side,
        }
    }

    /// Returns a clone of this leg with `shares` substituted for its size.
    pub fn with_shares(&self, shares: f64) -> Leg {
        let mut leg = self.clone();
        leg.target_shares = shares;
        leg
    }

    /// Returns a clone of this leg with `price` substituted for its limit.
    pub fn with_limit_price(&self, price: f64) -> Leg {
        let mut leg = self.clone();
        leg.limit_price = price;
        leg
    }

    pub fn is_valid(&self) -> bool {
        self.limit_price.is_finite()
            && self.limit_price > 0.0
            && self.limit_price < 1.0
            && self.target_shares.is_finite()
            && self.target_shares > 0.0
    }
}

/// Derived identifier `(venue, tokenId, side)` used as cache and quality map
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LegKey {
    pub venue: Venue,
    pub token_id: String,
    pub side: Side,
}

impl fmt::Display for LegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.venue, self.token_id, self.side)
    }
}

/// One (price, size) level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// An order-book snapshot for one (venue, token). Bids descend by price,
/// asks ascend by price. Produced by the book cache (C1), consumed by the
/// VWAP estimator, preflight engine, and adaptive sizer within one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl Book {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// The side an order of `side` walks to get filled: asks for buys, bids
    /// for sells.
    pub fn fill_side(&self, side: Side) -> &[BookLevel] {
        match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        }
    }

    /// The best price on the side used as the post-trade drift reference:
    /// best ask for buys, best bid for sells.
    pub fn reference_price(&self, side: Side) -> Option<f64> {
        match side {
            Side::Buy => self.best_ask(),
            Side::Sell => self.best_bid(),
        }
    }

    /// Total size available on `side`.
    pub fn depth(&self, side: Side) -> f64 {
        self.fill_side(side).iter().map(|l| l.size).sum()
    }
}

/// Result of submitting one venue's group of legs. Produced by the venue
/// adapter; consumed by the dispatcher for cancel/hedge decisions and by
/// the post-trade monitor for residual-order detection.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub venue: Venue,
    pub order_ids: Vec<String>,
    pub legs: Vec<Leg>,
}

/// Timer checkpoints and error state for one call to `execute`.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub attempt_index: u32,
    pub preflight_start: Option<std::time::Instant>,
    pub exec_start: Option<std::time::Instant>,
}

impl AttemptContext {
    pub fn new(attempt_index: u32) -> Self {
        Self {
            attempt_index,
            preflight_start: None,
            exec_start: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leg_key_formats_as_venue_token_side() {
        let leg = Leg::new(Venue::Predict, "T1", Side::Buy, 0.4, 50.0);
        assert_eq!(leg.key().to_string(), "predict:T1:buy");
    }

    #[test]
    fn leg_validity_rejects_out_of_range_price() {
        let leg = Leg::new(Venue::Predict, "T1", Side::Buy, 1.5, 50.0);
        assert!(!leg.is_valid());
        let leg = Leg::new(Venue::Predict, "T1", Side::Buy, 0.4, -1.0);
        assert!(!leg.is_valid());
    }

    #[test]
    fn book_reference_price_matches_side() {
        let book = Book {
            bids: vec![BookLevel { price: 0.55, size: 80.0 }],
            asks: vec![BookLevel { price: 0.40, size: 80.0 }],
        };
        assert_eq!(book.reference_price(Side::Buy), Some(0.40));
        assert_eq!(book.reference_price(Side::Sell), Some(0.55));
    }
}
