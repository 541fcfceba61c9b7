//! Reconstruction tests for the book pipeline
//!
//! Validates that snapshot + delta application keeps the book well-formed
//! and matches a naive level map, for both hand-written and generated input.
//!
//! Tests include:
//! - Snapshot then single removal (the canonical walk-through)
//! - Determinism of identical update sequences
//! - Property-based invariants under random contiguous batches
//! - Refused batches leaving state unchanged

use std::collections::BTreeMap;

use book_pipeline::delta::{apply_deltas, apply_snapshot, DeltaBatch, DeltaItem, DeltaModel};
use book_pipeline::faults::{BookFault, SequenceFaultKind};
use book_pipeline::order_book::{BookLevel, BookState};
use book_pipeline::snapshot::book_checksum;
use book_pipeline::{BookEngine, SourceCapabilities};
use proptest::prelude::*;
use types::ids::{ProviderId, StreamKey, Symbol};
use types::numeric::{Price, Quantity};
use types::order::BookSide;

const TS: i64 = 1708123456789000000;

fn level(price: u64, size: u64) -> BookLevel {
    BookLevel::new(Price::from_u64(price), Quantity::from_u64(size), 1)
}

fn make_snapshot(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> BookState {
    BookState::from_levels(ProviderId::new("binance"), Symbol::new("BTC/USDT"), bids, asks)
}

#[test]
fn test_snapshot_then_remove_best_bid() {
    let snapshot = make_snapshot(vec![level(100, 5)], vec![level(101, 5)]);
    let book = apply_snapshot(None, &snapshot, 1, TS).unwrap();

    let batch = DeltaBatch::new(
        2,
        vec![DeltaItem::new(BookSide::Bid, Price::from_u64(100), Quantity::ZERO, 2)],
    );
    let next = apply_deltas(Some(&book), &batch, TS + 1).unwrap();

    assert_eq!(next.sequence(), 2);
    assert!(next.bid_levels().is_empty());
    assert_eq!(next.ask_levels(), vec![level(101, 5)]);
}

#[test]
fn test_identical_updates_identical_books() {
    let run = || {
        let mut engine = BookEngine::new(StreamKey::new("binance", "BTC/USDT"), SourceCapabilities::default());
        engine
            .apply_snapshot(&make_snapshot(vec![level(100, 5), level(99, 2)], vec![level(101, 5)]), 10, TS)
            .unwrap();
        for sequence in 11..=20u64 {
            let model = DeltaModel::new(sequence)
                .bid(Price::from_u64(90 + sequence % 10), Quantity::from_u64(sequence % 3))
                .ask(Price::from_u64(101 + sequence % 7), Quantity::from_u64(sequence % 4));
            engine.apply_deltas(&model.into_batch(), TS + sequence as i64).unwrap();
        }
        engine.book().unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(*first, *second);
    assert_eq!(book_checksum(&first), book_checksum(&second));
}

#[test]
fn test_empty_batch_matches_snapshot() {
    let snapshot = make_snapshot(vec![level(100, 5), level(98, 1)], vec![level(101, 5), level(103, 7)]);
    let book = apply_snapshot(None, &snapshot, 41, TS).unwrap();
    let next = apply_deltas(Some(&book), &DeltaBatch::empty(42), TS + 1).unwrap();

    assert!(next.same_levels(&snapshot));
    assert_eq!(next.sequence(), 42);
}

#[test]
fn test_snapshot_only_source_always_refused() {
    let mut engine = BookEngine::new(StreamKey::new("kraken", "XBT/USD"), SourceCapabilities::snapshot_only());
    let snapshot = BookState::from_levels("kraken".into(), "XBT/USD".into(), vec![level(100, 1)], vec![]);
    engine.apply_snapshot(&snapshot, 1, TS).unwrap();

    for sequence in 0..5 {
        let err = engine.apply_deltas(&DeltaBatch::empty(sequence), TS).unwrap_err();
        assert!(matches!(err, BookFault::DeltaUnsupported { .. }));
    }
}

// ── Property-Based Tests ────────────────────────────────────────────

/// Naive reference: (side, price) → size.
type Reference = BTreeMap<(BookSide, u64), u64>;

fn side_strategy() -> impl Strategy<Value = BookSide> {
    prop_oneof![Just(BookSide::Bid), Just(BookSide::Ask)]
}

/// (side, price, size) with size 0 meaning removal.
fn update_strategy() -> impl Strategy<Value = (BookSide, u64, u64)> {
    (side_strategy(), 90u64..110, 0u64..5)
}

fn to_reference(book: &BookState) -> Reference {
    let mut reference = Reference::new();
    for (side, levels) in [(BookSide::Bid, book.bid_levels()), (BookSide::Ask, book.ask_levels())] {
        for level in levels {
            let price = level.price.as_decimal().to_string().parse::<u64>().unwrap();
            let size = level.size.as_decimal().to_string().parse::<u64>().unwrap();
            reference.insert((side, price), size);
        }
    }
    reference
}

proptest! {
    #[test]
    fn prop_contiguous_batches_keep_book_well_formed(
        snapshot_levels in proptest::collection::vec(update_strategy(), 0..20),
        batches in proptest::collection::vec(proptest::collection::vec(update_strategy(), 0..8), 1..20),
        start in 0u64..1_000,
    ) {
        let mut reference = Reference::new();
        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for (side, price, size) in snapshot_levels {
            if size == 0 {
                continue;
            }
            match side {
                BookSide::Bid => bids.push(level(price, size)),
                BookSide::Ask => asks.push(level(price, size)),
            }
            reference.insert((side, price), size);
        }

        let mut book = apply_snapshot(None, &make_snapshot(bids, asks), start, TS).unwrap();
        prop_assert_eq!(to_reference(&book), reference.clone());

        for (offset, updates) in batches.into_iter().enumerate() {
            let sequence = start + offset as u64 + 1;
            let items = updates
                .iter()
                .map(|&(side, price, size)| {
                    DeltaItem::new(side, Price::from_u64(price), Quantity::from_u64(size), sequence)
                })
                .collect();
            for &(side, price, size) in &updates {
                if size == 0 {
                    reference.remove(&(side, price));
                } else {
                    reference.insert((side, price), size);
                }
            }

            book = apply_deltas(Some(&book), &DeltaBatch::new(sequence, items), TS).unwrap();
            prop_assert!(book.check_invariants());
            prop_assert_eq!(book.sequence(), sequence);
            prop_assert_eq!(to_reference(&book), reference.clone());
        }
    }

    #[test]
    fn prop_non_contiguous_batch_refused_without_change(
        current in 1u64..1_000,
        received in 0u64..1_100,
        updates in proptest::collection::vec(update_strategy(), 0..8),
    ) {
        prop_assume!(received != current + 1);

        let book = apply_snapshot(None, &make_snapshot(vec![level(100, 5)], vec![level(101, 5)]), current, TS).unwrap();
        let before = book.clone();
        let items = updates
            .iter()
            .map(|&(side, price, size)| DeltaItem::new(side, Price::from_u64(price), Quantity::from_u64(size), received))
            .collect();

        let err = apply_deltas(Some(&book), &DeltaBatch::new(received, items), TS + 1).unwrap_err();
        let expected_kind = if received > current + 1 {
            SequenceFaultKind::Gap
        } else {
            SequenceFaultKind::Regression
        };
        prop_assert_eq!(
            err,
            BookFault::Sequence { kind: expected_kind, expected: current + 1, received }
        );
        prop_assert_eq!(book, before);
    }

    #[test]
    fn prop_removing_missing_level_is_noop(price in 1u64..1_000, side in side_strategy()) {
        prop_assume!(price != 100 && price != 101);

        let book = apply_snapshot(None, &make_snapshot(vec![level(100, 5)], vec![level(101, 5)]), 1, TS).unwrap();
        let batch = DeltaBatch::new(2, vec![DeltaItem::new(side, Price::from_u64(price), Quantity::ZERO, 2)]);
        let next = apply_deltas(Some(&book), &batch, TS).unwrap();

        prop_assert!(next.same_levels(&book));
    }
}
