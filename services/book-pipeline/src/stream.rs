//! Book stream: one engine behind one ordered buffer
//!
//! Producers enqueue `BookCommand`s; the buffer's consumer task owns the
//! `BookEngine`, applies each command in order and hands every successful
//! state to the consumer callback as an `Arc<BookState>`.
//!
//! Engine faults are recoverable: they are reported on the fault channel,
//! the book stays as it was and the loop moves on. A failing consumer
//! callback is fatal to this stream only, and is reported on the same
//! channel as a terminal `ConsumerFailed` fault.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::ids::StreamKey;

use crate::buffer::{EnqueueError, OrderedBuffer, ProcessError, Processor, StreamExit, TeardownMode};
use crate::capabilities::SourceCapabilities;
use crate::delta::DeltaBatch;
use crate::engine::BookEngine;
use crate::events::FeedKind;
use crate::faults::{BookFault, FaultReport};
use crate::metrics::PipelineMetrics;
use crate::order_book::BookState;

/// Work item for a book stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookCommand {
    /// Replace the book wholesale.
    Snapshot {
        book: BookState,
        sequence: u64,
        timestamp: i64,
    },
    /// Apply one contiguous batch.
    Deltas { batch: DeltaBatch, timestamp: i64 },
    /// Discard the book; the next update must be a snapshot.
    Reset,
}

impl BookCommand {
    pub fn label(&self) -> &'static str {
        match self {
            BookCommand::Snapshot { .. } => "snapshot",
            BookCommand::Deltas { .. } => "deltas",
            BookCommand::Reset => "reset",
        }
    }
}

/// Runs on the stream's consumer task and owns the engine.
struct BookProcessor<C> {
    engine: BookEngine,
    consumer: C,
    faults: mpsc::UnboundedSender<FaultReport>,
    metrics: Arc<PipelineMetrics>,
}

impl<C> BookProcessor<C>
where
    C: FnMut(Arc<BookState>) -> Result<(), ProcessError> + Send + 'static,
{
    fn report(&self, fault: BookFault) {
        self.metrics.record_fault(&fault);
        let report = FaultReport::new(FeedKind::Book, self.engine.key().clone(), fault);
        if self.faults.send(report).is_err() {
            debug!(stream = %self.engine.key(), "Fault channel closed, report dropped");
        }
    }
}

impl<C> Processor<BookCommand> for BookProcessor<C>
where
    C: FnMut(Arc<BookState>) -> Result<(), ProcessError> + Send + 'static,
{
    fn process(&mut self, command: BookCommand) -> Result<(), ProcessError> {
        let started = Instant::now();
        let applied = match command {
            BookCommand::Snapshot {
                book,
                sequence,
                timestamp,
            } => self.engine.apply_snapshot(&book, sequence, timestamp).map(|next| {
                self.metrics.record_snapshot(elapsed_ns(started));
                next
            }),
            BookCommand::Deltas { batch, timestamp } => {
                self.engine.apply_deltas(&batch, timestamp).map(|next| {
                    self.metrics.record_delta_batch(batch.len(), elapsed_ns(started));
                    next
                })
            }
            BookCommand::Reset => {
                self.engine.reset();
                return Ok(());
            }
        };

        match applied {
            Ok(book) => {
                self.metrics.record_publish();
                (self.consumer)(book)
            }
            Err(fault) => {
                self.report(fault);
                Ok(())
            }
        }
    }
}

fn elapsed_ns(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Exit hook that reports a failed consumer on the fault channel.
pub(crate) fn report_termination(
    feed: FeedKind,
    key: StreamKey,
    faults: mpsc::UnboundedSender<FaultReport>,
    metrics: Arc<PipelineMetrics>,
) -> impl FnOnce(&StreamExit) + Send + 'static {
    move |exit: &StreamExit| {
        let Some(error) = exit.failure.clone() else {
            return;
        };
        metrics.record_consumer_failure();
        warn!(stream = %key, feed = %feed, error = %error, "Stream terminated by consumer failure");
        let report = FaultReport::new(feed, key, BookFault::ConsumerFailed { error });
        if faults.send(report).is_err() {
            debug!("Fault channel closed, termination report dropped");
        }
    }
}

/// Handle to a running book stream.
pub struct BookStream {
    key: StreamKey,
    caps: SourceCapabilities,
    buffer: OrderedBuffer<BookCommand>,
}

impl BookStream {
    /// Spawn the stream's consumer task. Must be called inside a tokio runtime.
    pub fn open<C>(
        key: StreamKey,
        caps: SourceCapabilities,
        faults: mpsc::UnboundedSender<FaultReport>,
        metrics: Arc<PipelineMetrics>,
        consumer: C,
    ) -> Self
    where
        C: FnMut(Arc<BookState>) -> Result<(), ProcessError> + Send + 'static,
    {
        let on_exit = report_termination(FeedKind::Book, key.clone(), faults.clone(), Arc::clone(&metrics));
        let processor = BookProcessor {
            engine: BookEngine::new(key.clone(), caps.clone()),
            consumer,
            faults,
            metrics,
        };
        let buffer = OrderedBuffer::spawn_with_exit(format!("book:{}", key), processor, on_exit);
        info!(stream = %key, "Book stream opened");

        Self { key, caps, buffer }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn capabilities(&self) -> &SourceCapabilities {
        &self.caps
    }

    pub fn send(&self, command: BookCommand) -> Result<(), EnqueueError<BookCommand>> {
        self.buffer.enqueue(command)
    }

    pub fn snapshot(
        &self,
        book: BookState,
        sequence: u64,
        timestamp: i64,
    ) -> Result<(), EnqueueError<BookCommand>> {
        self.send(BookCommand::Snapshot {
            book,
            sequence,
            timestamp,
        })
    }

    pub fn deltas(&self, batch: DeltaBatch, timestamp: i64) -> Result<(), EnqueueError<BookCommand>> {
        self.send(BookCommand::Deltas { batch, timestamp })
    }

    /// Commands queued and not yet picked up by the consumer.
    pub fn backlog(&self) -> usize {
        self.buffer.count()
    }

    pub fn is_terminated(&self) -> bool {
        self.buffer.is_terminated()
    }

    pub async fn terminated(&self) {
        self.buffer.terminated().await
    }

    /// Tear the stream down. The book is discarded with the consumer task.
    pub async fn close(self, mode: TeardownMode) -> StreamExit {
        let exit = self.buffer.shutdown(mode).await;
        info!(
            stream = %self.key,
            delivered = exit.delivered,
            undelivered = exit.undelivered,
            failed = exit.failure.is_some(),
            "Book stream closed"
        );
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaModel;
    use crate::faults::SequenceFaultKind;
    use crate::order_book::BookLevel;
    use std::sync::Mutex;
    use types::numeric::{Price, Quantity};

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

    type Published = Arc<Mutex<Vec<Arc<BookState>>>>;

    fn open_stream(
        caps: SourceCapabilities,
    ) -> (BookStream, Published, mpsc::UnboundedReceiver<FaultReport>) {
        let published: Published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let stream = BookStream::open(
            key(),
            caps,
            fault_tx,
            Arc::new(PipelineMetrics::new()),
            move |book: Arc<BookState>| {
                sink.lock().unwrap().push(book);
                Ok(())
            },
        );
        (stream, published, fault_rx)
    }

    #[tokio::test]
    async fn test_publishes_each_transition() {
        let (stream, published, _faults) = open_stream(SourceCapabilities::default());

        stream.snapshot(snapshot(), 1, TS).unwrap();
        stream
            .deltas(DeltaModel::new(2).bid(Price::from_u64(100), Quantity::ZERO).into_batch(), TS + 1)
            .unwrap();
        let exit = stream.close(TeardownMode::Drain).await;

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].sequence(), 1);
        assert_eq!(published[0].bid_depth(), 1);
        assert_eq!(published[1].sequence(), 2);
        assert!(published[1].bid_levels().is_empty());
        assert_eq!(exit.delivered, 2);
    }

    #[tokio::test]
    async fn test_fault_reported_and_stream_continues() {
        let (stream, published, mut faults) = open_stream(SourceCapabilities::default());

        stream.snapshot(snapshot(), 1, TS).unwrap();
        stream.deltas(DeltaBatch::empty(3), TS + 1).unwrap();
        stream.deltas(DeltaBatch::empty(2), TS + 2).unwrap();
        let exit = stream.close(TeardownMode::Drain).await;

        let report = faults.recv().await.unwrap();
        assert_eq!(report.key, key());
        assert!(matches!(
            report.fault,
            BookFault::Sequence {
                kind: SequenceFaultKind::Gap,
                expected: 2,
                received: 3,
            }
        ));
        assert_eq!(published.lock().unwrap().last().unwrap().sequence(), 2);
        assert!(exit.is_clean());
    }

    #[tokio::test]
    async fn test_consumer_failure_is_fatal_and_reported() {
        let (fault_tx, mut fault_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(PipelineMetrics::new());
        let stream = BookStream::open(
            key(),
            SourceCapabilities::default(),
            fault_tx,
            Arc::clone(&metrics),
            |_book: Arc<BookState>| -> Result<(), ProcessError> { Err(ProcessError::consumer("downstream gone")) },
        );

        stream.snapshot(snapshot(), 1, TS).unwrap();
        let report = fault_rx.recv().await.unwrap();
        assert_eq!(report.feed, FeedKind::Book);
        assert_eq!(report.key, key());
        assert_eq!(
            report.fault,
            BookFault::ConsumerFailed {
                error: ProcessError::consumer("downstream gone"),
            }
        );
        assert!(stream.is_terminated());
        assert!(stream.snapshot(snapshot(), 2, TS).is_err());
        assert_eq!(metrics.export()["consumer_failures"], 1);

        let exit = stream.close(TeardownMode::Drain).await;
        assert_eq!(exit.failure, Some(ProcessError::consumer("downstream gone")));
    }
}
