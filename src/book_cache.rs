//! C1 — order-book snapshot cache. Memoises one book per (venue, token) for
//! the lifetime of a single attempt; the cache is discarded at the end of
//! the attempt so the next one sees fresh depth.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{Book, BookLevel, Venue};
use crate::venue::VenueAdapter;

/// Parses a wire-level `(price, size)` string pair into floats, rejecting
/// non-finite or negative values as the teacher's scraper layer does for
/// `Order { price: String, size: String }`.
pub fn parse_level(price: &str, size: &str) -> Option<BookLevel> {
    let price: f64 = price.parse().ok()?;
    let size: f64 = size.parse().ok()?;
    if !price.is_finite() || !size.is_finite() || price <= 0.0 || size < 0.0 {
        return None;
    }
    Some(BookLevel { price, size })
}

/// Normalises raw `(price, size)` string pairs into a `Book`, dropping
/// malformed levels and capping to `depth_levels`. A side left with zero
/// usable levels makes the whole book `None` (missing book).
pub fn normalize_book(
    raw_bids: &[(String, String)],
    raw_asks: &[(String, String)],
    depth_levels: u32,
) -> Option<Book> {
    let mut bids: Vec<BookLevel> = raw_bids.iter().filter_map(|(p, s)| parse_level(p, s)).collect();
    let mut asks: Vec<BookLevel> = raw_asks.iter().filter_map(|(p, s)| parse_level(p, s)).collect();

    if bids.is_empty() || asks.is_empty() {
        return None;
    }

    bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
    asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

    bids.truncate(depth_levels as usize);
    asks.truncate(depth_levels as usize);

    Some(Book { bids, asks })
}

/// Per-attempt memoisation of order-book fetches, keyed by `(venue,
/// token_id)`. Discarded when the attempt ends.
#[derive(Default)]
pub struct BookCache {
    cache: HashMap<(Venue, String), Option<Book>>,
}

impl BookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the book for `(venue, token_id)`, hitting the adapter only
    /// the first time within this attempt.
    pub async fn fetch(&mut self, adapter: &dyn VenueAdapter, token_id: &str) -> Option<Book> {
        let key = (adapter.venue(), token_id.to_string());
        if let Some(cached) = self.cache.get(&key) {
            debug!(venue = %adapter.venue(), token = token_id, "book cache hit");
            return cached.clone();
        }
        let fetched = adapter.fetch_book(token_id).await.ok().flatten();
        debug!(venue = %adapter.venue(), token = token_id, hit = fetched.is_some(), "book cache miss, fetched");
        self.cache.insert(key, fetched.clone());
        fetched
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_book_sorts_and_drops_malformed() {
        let bids = vec![
            ("0.50".to_string(), "10".to_string()),
            ("0.55".to_string(), "5".to_string()),
            ("bad".to_string(), "5".to_string()),
        ];
        let asks = vec![("0.60".to_string(), "8".to_string())];
        let book = normalize_book(&bids, &asks, 10).unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.bids[0].price, 0.55);
        assert_eq!(book.bids[1].price, 0.50);
    }

    #[test]
    fn normalize_book_missing_side_is_none() {
        let bids: Vec<(String, String)> = vec![];
        let asks = vec![("0.60".to_string(), "8".to_string())];
        assert!(normalize_book(&bids, &asks, 10).is_none());
    }

    #[test]
    fn parse_level_rejects_negative_size() {
        assert!(parse_level("0.4", "-5").is_none());
        assert!(parse_level("-0.4", "5").is_none());
        assert!(parse_level("nan", "5").is_none());
    }

    #[test]
    fn normalize_book_caps_to_depth_levels() {
        let bids = vec![
            ("0.50".to_string(), "10".to_string()),
            ("0.49".to_string(), "10".to_string()),
            ("0.48".to_string(), "10".to_string()),
        ];
        let asks = vec![("0.60".to_string(), "8".to_string())];
        let book = normalize_book(&bids, &asks, 2).unwrap();
        assert_eq!(book.bids.len(), 2);
    }
}
