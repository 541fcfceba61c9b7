//! Checksummed book snapshots
//!
//! A `BookSnapshot` is a flat, serializable copy of a `BookState` tagged
//! with a SHA-256 checksum, for handing a book across a process boundary
//! and checking it arrived intact. Decimals are normalized before hashing,
//! so `100` and `100.00` produce the same checksum.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::ids::StreamKey;

use crate::order_book::{BookLevel, BookState};

/// Flat copy of a book with an integrity checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub key: StreamKey,
    /// Bid levels in descending price order (best first).
    pub bids: Vec<BookLevel>,
    /// Ask levels in ascending price order (best first).
    pub asks: Vec<BookLevel>,
    /// Sequence the book was at.
    pub sequence: u64,
    /// Unix nanos of the book's last update.
    pub last_updated: i64,
    /// Hex-encoded SHA-256 over levels and sequence.
    pub checksum: String,
}

impl BookSnapshot {
    pub fn capture(book: &BookState) -> Self {
        let bids = book.bid_levels();
        let asks = book.ask_levels();
        let checksum = compute_checksum(&bids, &asks, book.sequence());

        Self {
            key: book.key(),
            bids,
            asks,
            sequence: book.sequence(),
            last_updated: book.last_updated(),
            checksum,
        }
    }

    /// Whether the checksum matches the content.
    pub fn verify(&self) -> bool {
        self.checksum == compute_checksum(&self.bids, &self.asks, self.sequence)
    }

    /// Rebuild the book, keeping only the levels (not the stamp).
    ///
    /// The result carries sequence 0; apply it through the engine to set
    /// the sequence.
    pub fn to_levels_book(&self) -> BookState {
        BookState::from_levels(
            self.key.provider.clone(),
            self.key.symbol.clone(),
            self.bids.iter().cloned(),
            self.asks.iter().cloned(),
        )
    }
}

/// Checksum of a book's levels and sequence.
pub fn book_checksum(book: &BookState) -> String {
    compute_checksum(&book.bid_levels(), &book.ask_levels(), book.sequence())
}

/// Whether `checksum` matches `book`.
pub fn verify_checksum(book: &BookState, checksum: &str) -> bool {
    book_checksum(book).eq_ignore_ascii_case(checksum)
}

fn compute_checksum(bids: &[BookLevel], asks: &[BookLevel], sequence: u64) -> String {
    let mut hasher = Sha256::new();

    for level in bids {
        hash_level(&mut hasher, level);
    }
    hasher.update(b"---");

    for level in asks {
        hash_level(&mut hasher, level);
    }
    hasher.update(b"---");

    hasher.update(sequence.to_le_bytes());

    format!("{:x}", hasher.finalize())
}

fn hash_level(hasher: &mut Sha256, level: &BookLevel) {
    hasher.update(normalized(level.price.as_decimal()).as_bytes());
    hasher.update(b":");
    hasher.update(normalized(level.size.as_decimal()).as_bytes());
    hasher.update(b":");
    hasher.update(level.count.to_le_bytes());
    hasher.update(b"|");
}

fn normalized(value: Decimal) -> String {
    value.normalize().to_string()
}
