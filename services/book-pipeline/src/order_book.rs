//! Reconstructed order book for one provider+symbol pair
//!
//! Levels are kept in `BTreeMap`s keyed by exact decimal price, so bids
//! iterate descending, asks ascending, and no price can appear twice.
//! Zero-size levels are never stored.
//!
//! Only the engine mutates a `BookState`; everything handed to consumers is
//! an `Arc<BookState>` that is never written to again.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{ProviderId, StreamKey, Symbol};
use types::numeric::{Price, Quantity};
use types::order::BookSide;

/// A single aggregated price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// The price of this level.
    pub price: Price,
    /// Aggregate size resting at this price.
    pub size: Quantity,
    /// Number of entries (orders) at this price, as reported by the source.
    pub count: u32,
}

impl BookLevel {
    pub fn new(price: Price, size: Quantity, count: u32) -> Self {
        Self { price, size, count }
    }
}

/// Reconstructed order book state.
///
/// Bids stored in descending price order (best bid first).
/// Asks stored in ascending price order (best ask first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BookStateRepr", from = "BookStateRepr")]
pub struct BookState {
    pub provider: ProviderId,
    pub symbol: Symbol,
    /// Last applied sequence number.
    sequence: u64,
    /// Bid levels: price → level (BTreeMap sorts ascending, we reverse for best-bid-first).
    bids: BTreeMap<Decimal, BookLevel>,
    /// Ask levels: price → level (ascending = best ask first).
    asks: BTreeMap<Decimal, BookLevel>,
    /// Unix nanos of the last successful application.
    last_updated: i64,
}

impl BookState {
    /// Create an empty book for the given stream.
    pub fn new(provider: ProviderId, symbol: Symbol) -> Self {
        Self {
            provider,
            symbol,
            sequence: 0,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_updated: 0,
        }
    }

    /// Build a book from raw level lists, typically a parsed snapshot.
    ///
    /// Input order does not matter. Zero-size levels are skipped and a
    /// repeated price keeps the last level seen.
    pub fn from_levels(
        provider: ProviderId,
        symbol: Symbol,
        bids: impl IntoIterator<Item = BookLevel>,
        asks: impl IntoIterator<Item = BookLevel>,
    ) -> Self {
        let mut book = Self::new(provider, symbol);
        for level in bids {
            book.insert_level(BookSide::Bid, level);
        }
        for level in asks {
            book.insert_level(BookSide::Ask, level);
        }
        book
    }

    /// Key of the stream this book belongs to.
    pub fn key(&self) -> StreamKey {
        StreamKey {
            provider: self.provider.clone(),
            symbol: self.symbol.clone(),
        }
    }

    /// Last applied sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Unix nanos of the last successful application.
    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    /// Get all bid levels (descending price order).
    pub fn bid_levels(&self) -> Vec<BookLevel> {
        self.bids.values().rev().cloned().collect()
    }

    /// Get all ask levels (ascending price order).
    pub fn ask_levels(&self) -> Vec<BookLevel> {
        self.asks.values().cloned().collect()
    }

    /// Level lookup by exact price.
    pub fn level(&self, side: BookSide, price: Price) -> Option<&BookLevel> {
        self.side(side).get(&price.as_decimal())
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.values().next_back()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.values().next()
    }

    /// Get the mid-market price (average of best bid and best ask).
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                Some((bid.price.as_decimal() + ask.price.as_decimal()) / Decimal::from(2))
            }
            _ => None,
        }
    }

    /// Get the spread between best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price.as_decimal() - bid.price.as_decimal()),
            _ => None,
        }
    }

    /// Best bid at or above best ask. Sources can briefly publish crossed
    /// books; the engine reports but does not repair them.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Top `max_levels` of each side, best first.
    pub fn top_levels(&self, max_levels: usize) -> (Vec<BookLevel>, Vec<BookLevel>) {
        let bids = self.bids.values().rev().take(max_levels).cloned().collect();
        let asks = self.asks.values().take(max_levels).cloned().collect();
        (bids, asks)
    }

    /// Number of bid price levels.
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Same levels on both sides, ignoring sequence and timestamp.
    pub fn same_levels(&self, other: &BookState) -> bool {
        self.bids == other.bids && self.asks == other.asks
    }

    /// Check the structural invariants: every level is keyed by its own
    /// price, no zero-size level, bids strictly descending, asks strictly
    /// ascending.
    pub fn check_invariants(&self) -> bool {
        let keyed = |levels: &BTreeMap<Decimal, BookLevel>| {
            levels
                .iter()
                .all(|(price, level)| *price == level.price.as_decimal() && !level.size.is_zero())
        };
        let bids = self.bid_levels();
        let asks = self.ask_levels();
        keyed(&self.bids)
            && keyed(&self.asks)
            && bids.windows(2).all(|w| w[0].price > w[1].price)
            && asks.windows(2).all(|w| w[0].price < w[1].price)
    }

    // ── Mutation (engine only) ──────────────────────────────────────

    /// Insert or replace a level. A `None` count keeps the existing count,
    /// or 1 for a new level. Zero size removes the level instead.
    pub(crate) fn upsert(&mut self, side: BookSide, price: Price, size: Quantity, count: Option<u32>) {
        if size.is_zero() {
            self.remove(side, price);
            return;
        }
        self.side_mut(side)
            .entry(price.as_decimal())
            .and_modify(|level| {
                level.size = size;
                if let Some(count) = count {
                    level.count = count;
                }
            })
            .or_insert_with(|| BookLevel::new(price, size, count.unwrap_or(1)));
    }

    /// Remove a level. Returns false if no level existed at that price.
    pub(crate) fn remove(&mut self, side: BookSide, price: Price) -> bool {
        self.side_mut(side).remove(&price.as_decimal()).is_some()
    }

    pub(crate) fn stamp(&mut self, sequence: u64, timestamp: i64) {
        self.sequence = sequence;
        self.last_updated = timestamp;
    }

    fn insert_level(&mut self, side: BookSide, level: BookLevel) {
        if level.size.is_zero() {
            return;
        }
        self.side_mut(side).insert(level.price.as_decimal(), level);
    }

    fn side(&self, side: BookSide) -> &BTreeMap<Decimal, BookLevel> {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: BookSide) -> &mut BTreeMap<Decimal, BookLevel> {
        match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        }
    }
}

/// Wire shape of a `BookState`: levels as ordered lists.
#[derive(Serialize, Deserialize)]
struct BookStateRepr {
    provider: ProviderId,
    symbol: Symbol,
    sequence: u64,
    bids: Vec<BookLevel>,
    asks: Vec<BookLevel>,
    last_updated: i64,
}

impl From<BookState> for BookStateRepr {
    fn from(book: BookState) -> Self {
        let bids = book.bid_levels();
        let asks = book.ask_levels();
        Self {
            provider: book.provider,
            symbol: book.symbol,
            sequence: book.sequence,
            bids,
            asks,
            last_updated: book.last_updated,
        }
    }
}

impl From<BookStateRepr> for BookState {
    fn from(repr: BookStateRepr) -> Self {
        let mut book = BookState::from_levels(repr.provider, repr.symbol, repr.bids, repr.asks);
        book.stamp(repr.sequence, repr.last_updated);
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn level(price: u64, size: &str) -> BookLevel {
        BookLevel::new(Price::from_u64(price), Quantity::from_str(size).unwrap(), 1)
    }

    fn make_book() -> BookState {
        BookState::from_levels(
            ProviderId::new("binance"),
            Symbol::new("BTCUSDT"),
            vec![level(99, "1"), level(100, "5"), level(98, "2")],
            vec![level(102, "3"), level(101, "5")],
        )
    }

    #[test]
    fn test_empty_book() {
        let book = BookState::new(ProviderId::new("binance"), Symbol::new("BTCUSDT"));
        assert!(book.is_empty());
        assert!(book.best_bid().is_none());
        assert!(book.best_ask().is_none());
        assert!(book.mid_price().is_none());
        assert!(book.spread().is_none());
        assert_eq!(book.sequence(), 0);
    }

    #[test]
    fn test_levels_sorted_regardless_of_input_order() {
        let book = make_book();

        let bids: Vec<Price> = book.bid_levels().iter().map(|l| l.price).collect();
        assert_eq!(bids, vec![Price::from_u64(100), Price::from_u64(99), Price::from_u64(98)]);

        let asks: Vec<Price> = book.ask_levels().iter().map(|l| l.price).collect();
        assert_eq!(asks, vec![Price::from_u64(101), Price::from_u64(102)]);
        assert!(book.check_invariants());
    }

    #[test]
    fn test_from_levels_skips_zero_and_dedups() {
        let book = BookState::from_levels(
            ProviderId::new("binance"),
            Symbol::new("BTCUSDT"),
            vec![level(100, "1"), level(100, "4"), level(97, "0")],
            vec![],
        );
        assert_eq!(book.bid_depth(), 1);
        assert_eq!(book.best_bid().unwrap().size, Quantity::from_u64(4));
    }

    #[test]
    fn test_best_prices_mid_and_spread() {
        let book = make_book();
        assert_eq!(book.best_bid().unwrap().price, Price::from_u64(100));
        assert_eq!(book.best_ask().unwrap().price, Price::from_u64(101));
        assert_eq!(book.spread().unwrap(), Decimal::from(1));
        assert_eq!(book.mid_price().unwrap(), Decimal::from_str_exact("100.5").unwrap());
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_upsert_replaces_size_only() {
        let mut book = make_book();
        book.upsert(BookSide::Bid, Price::from_u64(99), Quantity::from_u64(7), None);

        let lvl = book.level(BookSide::Bid, Price::from_u64(99)).unwrap();
        assert_eq!(lvl.size, Quantity::from_u64(7));
        assert_eq!(lvl.count, 1);
        assert_eq!(book.bid_depth(), 3);
    }

    #[test]
    fn test_upsert_zero_removes() {
        let mut book = make_book();
        book.upsert(BookSide::Ask, Price::from_u64(101), Quantity::ZERO, None);
        assert_eq!(book.best_ask().unwrap().price, Price::from_u64(102));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut book = make_book();
        let before = book.clone();
        assert!(!book.remove(BookSide::Bid, Price::from_u64(50)));
        assert_eq!(book, before);
    }

    #[test]
    fn test_crossed_book_detected() {
        let book = BookState::from_levels(
            ProviderId::new("binance"),
            Symbol::new("BTCUSDT"),
            vec![level(101, "1")],
            vec![level(101, "1")],
        );
        assert!(book.is_crossed());
    }

    #[test]
    fn test_top_levels() {
        let book = make_book();
        let (bids, asks) = book.top_levels(2);
        assert_eq!(bids.len(), 2);
        assert_eq!(asks.len(), 2);
        assert_eq!(bids[0].price, Price::from_u64(100));
        assert_eq!(asks[0].price, Price::from_u64(101));
    }

    #[test]
    fn test_book_serialization_roundtrip() {
        let mut book = make_book();
        book.stamp(42, 1708123456789000000);

        let json = serde_json::to_string(&book).unwrap();
        let deserialized: BookState = serde_json::from_str(&json).unwrap();
        assert_eq!(book, deserialized);
        assert_eq!(deserialized.sequence(), 42);
    }
}
