//! Testable injection surface
//!
//! Lets harnesses drive a stream with hand-built snapshots, delta models and
//! private-message scenarios. Injected input goes through the same engine
//! entry points as live input, so it gets exactly the same validation.
//!
//! Implemented by `BookEngine` (results come back synchronously) and by
//! `BookStream` (commands are queued; engine faults arrive on the stream's
//! fault channel).

use std::sync::Arc;

use types::ids::StreamKey;
use types::order::Order;
use types::time::now_nanos;

use crate::capabilities::SourceCapabilities;
use crate::delta::DeltaModel;
use crate::engine::BookEngine;
use crate::faults::BookFault;
use crate::order_book::BookState;
use crate::scenarios::{self, Scenario, ScenarioOrder};
use crate::stream::BookStream;

/// Errors from injecting into a running stream.
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error(transparent)]
    Fault(#[from] BookFault),

    #[error("stream {0} is closed")]
    StreamClosed(StreamKey),
}

pub trait InjectionSurface {
    /// What a successful injection yields.
    type Applied;
    type Error: From<BookFault>;

    fn key(&self) -> &StreamKey;

    fn capabilities(&self) -> &SourceCapabilities;

    /// Replace the book with `book` at an explicit sequence.
    fn inject_snapshot(&mut self, book: BookState, sequence: u64) -> Result<Self::Applied, Self::Error>;

    /// Apply a side-split delta model as one batch.
    fn inject_delta_model(&mut self, model: DeltaModel) -> Result<Self::Applied, Self::Error>;

    /// Play `scenario` with the default order template.
    fn execute_private_message_scenario(&self, scenario: Scenario) -> Result<Vec<Order>, BookFault> {
        let caps = self.capabilities();
        if !caps.models(scenario) {
            return Err(BookFault::ScenarioUnsupported {
                provider: self.key().provider.clone(),
                scenario,
            });
        }
        Ok(scenarios::play(scenario, &ScenarioOrder::default(), self.key(), now_nanos()))
    }
}

fn require_sequencing(key: &StreamKey, caps: &SourceCapabilities) -> Result<(), BookFault> {
    if caps.supports_sequencing {
        Ok(())
    } else {
        Err(BookFault::SequencingUnsupported {
            provider: key.provider.clone(),
        })
    }
}

impl InjectionSurface for BookEngine {
    type Applied = Arc<BookState>;
    type Error = BookFault;

    fn key(&self) -> &StreamKey {
        BookEngine::key(self)
    }

    fn capabilities(&self) -> &SourceCapabilities {
        BookEngine::capabilities(self)
    }

    fn inject_snapshot(&mut self, book: BookState, sequence: u64) -> Result<Arc<BookState>, BookFault> {
        require_sequencing(BookEngine::key(self), BookEngine::capabilities(self))?;
        self.apply_snapshot(&book, sequence, now_nanos())
    }

    fn inject_delta_model(&mut self, model: DeltaModel) -> Result<Arc<BookState>, BookFault> {
        self.apply_deltas(&model.into_batch(), now_nanos())
    }

    fn execute_private_message_scenario(&self, scenario: Scenario) -> Result<Vec<Order>, BookFault> {
        self.execute_scenario(scenario, &ScenarioOrder::default(), now_nanos())
    }
}

impl InjectionSurface for BookStream {
    type Applied = ();
    type Error = InjectError;

    fn key(&self) -> &StreamKey {
        BookStream::key(self)
    }

    fn capabilities(&self) -> &SourceCapabilities {
        BookStream::capabilities(self)
    }

    fn inject_snapshot(&mut self, book: BookState, sequence: u64) -> Result<(), InjectError> {
        require_sequencing(BookStream::key(self), BookStream::capabilities(self))?;
        self.snapshot(book, sequence, now_nanos())
            .map_err(|_| InjectError::StreamClosed(BookStream::key(self).clone()))
    }

    fn inject_delta_model(&mut self, model: DeltaModel) -> Result<(), InjectError> {
        self.deltas(model.into_batch(), now_nanos())
            .map_err(|_| InjectError::StreamClosed(BookStream::key(self).clone()))
    }
}
