//! Delta application for incremental book updates
//!
//! Pure state transitions: every function takes the current book by
//! reference and returns a new `BookState` or a `BookFault`. The input
//! book is never mutated, so a refused update leaves the caller's state
//! exactly as it was.
//!
//! Application flow:
//! 1. Validate the batch sequence against the current book
//! 2. Validate every item carries the batch sequence
//! 3. Clone the book and apply items in order (size 0 removes, >0 upserts)
//! 4. Stamp the new sequence and timestamp

use serde::{Deserialize, Serialize};
use types::numeric::{Price, Quantity};
use types::order::BookSide;

use crate::faults::{BookFault, SequenceFaultKind};
use crate::order_book::BookState;

/// A single change to one price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaItem {
    /// Which side changed.
    pub side: BookSide,
    /// The price level that changed.
    pub price: Price,
    /// New aggregate size at this level (0 = level removed).
    pub new_size: Quantity,
    /// Sequence number of the update this item belongs to.
    pub sequence: u64,
    /// New entry count, when the source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl DeltaItem {
    pub fn new(side: BookSide, price: Price, new_size: Quantity, sequence: u64) -> Self {
        Self {
            side,
            price,
            new_size,
            sequence,
            count: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Whether this item removes its level.
    pub fn is_removal(&self) -> bool {
        self.new_size.is_zero()
    }
}

/// An ordered batch of items sharing one target sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaBatch {
    pub sequence: u64,
    pub items: Vec<DeltaItem>,
}

impl DeltaBatch {
    pub fn new(sequence: u64, items: Vec<DeltaItem>) -> Self {
        Self { sequence, items }
    }

    /// A batch that only advances the sequence.
    pub fn empty(sequence: u64) -> Self {
        Self::new(sequence, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One level update inside a `DeltaModel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpdate {
    pub price: Price,
    pub size: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl LevelUpdate {
    pub fn new(price: Price, size: Quantity) -> Self {
        Self {
            price,
            size,
            count: None,
        }
    }
}

/// Side-split form of a batch, convenient for hand-written test input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaModel {
    pub sequence: u64,
    #[serde(default)]
    pub bids: Vec<LevelUpdate>,
    #[serde(default)]
    pub asks: Vec<LevelUpdate>,
}

impl DeltaModel {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            ..Self::default()
        }
    }

    pub fn bid(mut self, price: Price, size: Quantity) -> Self {
        self.bids.push(LevelUpdate::new(price, size));
        self
    }

    pub fn ask(mut self, price: Price, size: Quantity) -> Self {
        self.asks.push(LevelUpdate::new(price, size));
        self
    }

    /// Flatten into a batch: bid items first, then ask items.
    pub fn into_batch(self) -> DeltaBatch {
        let sequence = self.sequence;
        let to_item = |side: BookSide| {
            move |update: LevelUpdate| DeltaItem {
                side,
                price: update.price,
                new_size: update.size,
                sequence,
                count: update.count,
            }
        };

        let items = self
            .bids
            .into_iter()
            .map(to_item(BookSide::Bid))
            .chain(self.asks.into_iter().map(to_item(BookSide::Ask)))
            .collect();
        DeltaBatch::new(sequence, items)
    }
}

impl From<DeltaModel> for DeltaBatch {
    fn from(model: DeltaModel) -> Self {
        model.into_batch()
    }
}

/// Replace the book wholesale with `snapshot`, stamped at `sequence`.
///
/// Accepted when there is no current book or `sequence` is not behind it.
pub fn apply_snapshot(
    current: Option<&BookState>,
    snapshot: &BookState,
    sequence: u64,
    timestamp: i64,
) -> Result<BookState, BookFault> {
    if let Some(book) = current {
        if sequence < book.sequence() {
            return Err(BookFault::Sequence {
                kind: SequenceFaultKind::Regression,
                expected: book.sequence(),
                received: sequence,
            });
        }
    }

    let mut next = snapshot.clone();
    next.stamp(sequence, timestamp);
    Ok(next)
}

/// Apply a contiguous batch on top of `current`.
///
/// The whole batch is validated before anything is applied.
pub fn apply_deltas(
    current: Option<&BookState>,
    batch: &DeltaBatch,
    timestamp: i64,
) -> Result<BookState, BookFault> {
    let book = current.ok_or(BookFault::Sequence {
        kind: SequenceFaultKind::MissingSnapshot,
        expected: 0,
        received: batch.sequence,
    })?;

    check_contiguous(book.sequence(), batch.sequence)?;

    if let Some(item) = batch.items.iter().find(|item| item.sequence != batch.sequence) {
        return Err(BookFault::Sequence {
            kind: SequenceFaultKind::MixedBatch,
            expected: batch.sequence,
            received: item.sequence,
        });
    }

    let mut next = book.clone();
    for item in &batch.items {
        if item.is_removal() {
            next.remove(item.side, item.price);
        } else {
            next.upsert(item.side, item.price, item.new_size, item.count);
        }
    }
    next.stamp(batch.sequence, timestamp);
    Ok(next)
}

fn check_contiguous(current: u64, received: u64) -> Result<(), BookFault> {
    let Some(expected) = current.checked_add(1) else {
        return Err(BookFault::Sequence {
            kind: SequenceFaultKind::Exhausted,
            expected: current,
            received,
        });
    };
    if received == expected {
        return Ok(());
    }
    let kind = if received > expected {
        SequenceFaultKind::Gap
    } else {
        SequenceFaultKind::Regression
    };
    Err(BookFault::Sequence {
        kind,
        expected,
        received,
    })
}
