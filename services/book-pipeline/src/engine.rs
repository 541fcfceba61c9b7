//! Per-stream book engine
//!
//! Owns the current book for one provider+symbol pair together with the
//! source's capability flags, and routes updates through the pure
//! transitions in `delta`. The engine is the single writer of its book:
//! each successful transition replaces the held `Arc<BookState>` with a
//! fresh one, and states already handed out are never touched again.

use std::sync::Arc;

use tracing::{debug, info, warn};
use types::ids::StreamKey;
use types::order::Order;

use crate::capabilities::SourceCapabilities;
use crate::delta::{self, DeltaBatch};
use crate::faults::BookFault;
use crate::order_book::BookState;
use crate::scenarios::{self, Scenario, ScenarioOrder};

/// Delta application engine for a single stream.
#[derive(Debug, Clone)]
pub struct BookEngine {
    key: StreamKey,
    caps: SourceCapabilities,
    /// Absent until the first snapshot lands.
    book: Option<Arc<BookState>>,
}

impl BookEngine {
    pub fn new(key: StreamKey, caps: SourceCapabilities) -> Self {
        info!(
            stream = %key,
            supports_deltas = caps.supports_deltas,
            supports_sequencing = caps.supports_sequencing,
            supports_scenarios = caps.supports_scenarios,
            "BookEngine initialized"
        );
        Self {
            key,
            caps,
            book: None,
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn capabilities(&self) -> &SourceCapabilities {
        &self.caps
    }

    /// The current book, if a snapshot has been applied.
    pub fn book(&self) -> Option<Arc<BookState>> {
        self.book.clone()
    }

    /// Sequence of the current book, if any.
    pub fn sequence(&self) -> Option<u64> {
        self.book.as_ref().map(|book| book.sequence())
    }

    /// Replace the book with `snapshot` at `sequence`.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &BookState,
        sequence: u64,
        timestamp: i64,
    ) -> Result<Arc<BookState>, BookFault> {
        let received = snapshot.key();
        if received != self.key {
            return Err(self.refuse(BookFault::StreamMismatch {
                expected: self.key.clone(),
                received,
            }));
        }

        let next = delta::apply_snapshot(self.book.as_deref(), snapshot, sequence, timestamp)
            .map_err(|fault| self.refuse(fault))?;

        debug!(
            stream = %self.key,
            sequence,
            bid_levels = next.bid_depth(),
            ask_levels = next.ask_depth(),
            "Snapshot applied"
        );
        Ok(self.publish(next))
    }

    /// Apply a contiguous delta batch.
    ///
    /// A source without delta support is refused before any sequence
    /// check, so it never sees a partial application.
    pub fn apply_deltas(
        &mut self,
        batch: &DeltaBatch,
        timestamp: i64,
    ) -> Result<Arc<BookState>, BookFault> {
        if !self.caps.supports_deltas {
            return Err(self.refuse(BookFault::DeltaUnsupported {
                provider: self.key.provider.clone(),
            }));
        }

        let next = delta::apply_deltas(self.book.as_deref(), batch, timestamp)
            .map_err(|fault| self.refuse(fault))?;

        debug!(
            stream = %self.key,
            sequence = batch.sequence,
            items = batch.len(),
            "Delta batch applied"
        );
        Ok(self.publish(next))
    }

    /// Play a private-message scenario for this stream.
    pub fn execute_scenario(
        &self,
        scenario: Scenario,
        template: &ScenarioOrder,
        timestamp: i64,
    ) -> Result<Vec<Order>, BookFault> {
        if !self.caps.models(scenario) {
            return Err(self.refuse(BookFault::ScenarioUnsupported {
                provider: self.key.provider.clone(),
                scenario,
            }));
        }

        let orders = scenarios::play(scenario, template, &self.key, timestamp);
        debug!(
            stream = %self.key,
            scenario = %scenario,
            messages = orders.len(),
            "Scenario played"
        );
        Ok(orders)
    }

    /// Drop the current book. The next update must be a snapshot.
    pub fn reset(&mut self) {
        if self.book.take().is_some() {
            info!(stream = %self.key, "Book discarded");
        }
    }

    fn publish(&mut self, next: BookState) -> Arc<BookState> {
        let next = Arc::new(next);
        self.book = Some(Arc::clone(&next));
        next
    }

    fn refuse(&self, fault: BookFault) -> BookFault {
        warn!(
            stream = %self.key,
            fault = fault.label(),
            needs_resnapshot = fault.needs_resnapshot(),
            error = %fault,
            "Update refused"
        );
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaModel;
    use crate::faults::SequenceFaultKind;
    use crate::order_book::BookLevel;
    use types::numeric::{Price, Quantity};
    use types::order::OrderStatus;

    const TS: i64 = 1708123456789000000;

    fn key() -> StreamKey {
        StreamKey::new("binance", "BTC/USDT")
    }

    fn snapshot() -> BookState {
        BookState::from_levels(
            key().provider,
            key().symbol,
            vec![BookLevel::new(Price::from_u64(100), Quantity::from_u64(5), 1)],
            vec![BookLevel::new(Price::from_u64(101), Quantity::from_u64(5), 1)],
        )
    }

    fn make_engine(caps: SourceCapabilities) -> BookEngine {
        let mut engine = BookEngine::new(key(), caps);
        engine.apply_snapshot(&snapshot(), 1, TS).unwrap();
        engine
    }

    #[test]
    fn test_snapshot_then_delta() {
        let mut engine = make_engine(SourceCapabilities::default());
        let first = engine.book().unwrap();

        let batch = DeltaModel::new(2).bid(Price::from_u64(100), Quantity::ZERO).into_batch();
        let next = engine.apply_deltas(&batch, TS + 1).unwrap();

        assert_eq!(next.sequence(), 2);
        assert!(next.bid_levels().is_empty());
        assert_eq!(first.sequence(), 1);
        assert_eq!(first.bid_depth(), 1);
        assert_eq!(engine.sequence(), Some(2));
    }

    #[test]
    fn test_fault_keeps_current_book() {
        let mut engine = make_engine(SourceCapabilities::default());
        let before = engine.book().unwrap();

        let err = engine.apply_deltas(&DeltaBatch::empty(5), TS).unwrap_err();
        assert!(matches!(
            err,
            BookFault::Sequence {
                kind: SequenceFaultKind::Gap,
                ..
            }
        ));
        assert!(Arc::ptr_eq(&before, &engine.book().unwrap()));
    }

    #[test]
    fn test_delta_unsupported_checked_first() {
        let mut engine = make_engine(SourceCapabilities::snapshot_only());

        for sequence in [0, 2, 9] {
            let err = engine.apply_deltas(&DeltaBatch::empty(sequence), TS).unwrap_err();
            assert!(matches!(err, BookFault::DeltaUnsupported { .. }));
        }
        assert_eq!(engine.sequence(), Some(1));
    }

    #[test]
    fn test_snapshot_for_other_stream() {
        let mut engine = BookEngine::new(key(), SourceCapabilities::default());
        let other = BookState::new("kraken".into(), "BTC/USDT".into());

        let err = engine.apply_snapshot(&other, 1, TS).unwrap_err();
        assert!(matches!(err, BookFault::StreamMismatch { .. }));
        assert!(engine.book().is_none());
    }

    #[test]
    fn test_scenario_requires_capability() {
        let engine = make_engine(SourceCapabilities::default());
        let err = engine
            .execute_scenario(Scenario::Fill, &ScenarioOrder::default(), TS)
            .unwrap_err();
        assert!(matches!(
            err,
            BookFault::ScenarioUnsupported {
                scenario: Scenario::Fill,
                ..
            }
        ));

        let engine = make_engine(SourceCapabilities::full());
        let orders = engine
            .execute_scenario(Scenario::Cancel, &ScenarioOrder::default(), TS)
            .unwrap();
        assert_eq!(orders.last().unwrap().status, OrderStatus::Canceled);
    }

    #[test]
    fn test_reset_requires_new_snapshot() {
        let mut engine = make_engine(SourceCapabilities::default());
        engine.reset();

        let err = engine.apply_deltas(&DeltaBatch::empty(2), TS).unwrap_err();
        assert!(matches!(
            err,
            BookFault::Sequence {
                kind: SequenceFaultKind::MissingSnapshot,
                ..
            }
        ));
    }
}
