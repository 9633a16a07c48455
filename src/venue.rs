//! The seam between this router and venue-specific wire protocols. Venue
//! executors implement `VenueAdapter`; everything past this trait (signed
//! order construction, REST/WebSocket transport) is an external
//! collaborator out of scope for this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Book, ExecutionResult, Leg, Side, Venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Fok,
    Fak,
    Gtc,
    Gtd,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Fok => "FOK",
            OrderType::Fak => "FAK",
            OrderType::Gtc => "GTC",
            OrderType::Gtd => "GTD",
        }
    }
}

/// Per-attempt execution options derived by the dispatcher and handed to
/// the venue adapter verbatim.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub use_fok: Option<bool>,
    pub use_limit: Option<bool>,
    pub order_type: Option<OrderType>,
    pub batch: Option<bool>,
}

/// Capability set a venue executor exposes: mandatory `execute`, optional
/// `cancel_orders` / `check_open_orders` / `hedge_legs` (default no-ops) for
/// venues that don't support them.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    async fn execute(&self, legs: &[Leg], options: &ExecutionOptions) -> anyhow::Result<ExecutionResult>;

    /// Best-effort cancellation; a venue that cannot cancel individually
    /// simply returns `Ok(())` having done nothing.
    async fn cancel_orders(&self, _order_ids: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns the subset of `order_ids` still open. Default: none (venue
    /// doesn't support the query, so nothing is reported as residual).
    async fn check_open_orders(&self, _order_ids: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Submits opposite-side orders sized to each leg's shares. Default:
    /// unsupported, reported to the caller as a no-op success with no
    /// orders placed.
    async fn hedge_legs(&self, _legs: &[Leg], _slippage_bps: f64) -> anyhow::Result<ExecutionResult> {
        Ok(ExecutionResult {
            venue: self.venue(),
            order_ids: Vec::new(),
            legs: Vec::new(),
        })
    }

    /// Fetches the current order-book snapshot for a token. Returns `None`
    /// when the book is missing, unreachable, or malformed.
    async fn fetch_book(&self, token_id: &str) -> anyhow::Result<Option<Book>>;
}

/// The opposite side of a leg, used when constructing a hedge order.
pub fn opposite_side(side: Side) -> Side {
    match side {
        Side::Buy => Side::Sell,
        Side::Sell => Side::Buy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_side_flips() {
        assert_eq!(opposite_side(Side::Buy), Side::Sell);
        assert_eq!(opposite_side(Side::Sell), Side::Buy);
    }

    #[test]
    fn order_type_as_str_matches_wire_tokens() {
        assert_eq!(OrderType::Fok.as_str(), "FOK");
        assert_eq!(OrderType::Gtd.as_str(), "GTD");
    }
}
