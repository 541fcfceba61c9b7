//! Trade stream for public trade prints
//!
//! One ordered buffer per provider+symbol. Trades are immutable once
//! produced; each one is moved into the consumer callback, so the stream
//! keeps no reference after delivery.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use types::ids::StreamKey;
use types::trade::Trade;

use crate::buffer::{EnqueueError, OrderedBuffer, ProcessError, Processor, StreamExit, TeardownMode};
use crate::events::FeedKind;
use crate::faults::FaultReport;
use crate::metrics::PipelineMetrics;
use crate::stream::report_termination;

struct TradeProcessor<C> {
    key: StreamKey,
    consumer: C,
    metrics: Arc<PipelineMetrics>,
    last_sequence: Option<u64>,
}

impl<C> Processor<Trade> for TradeProcessor<C>
where
    C: FnMut(Trade) -> Result<(), ProcessError> + Send + 'static,
{
    fn process(&mut self, trade: Trade) -> Result<(), ProcessError> {
        // Trade sequences are informational; out-of-order prints are still delivered.
        if let Some(last) = self.last_sequence {
            if trade.sequence <= last {
                warn!(
                    stream = %self.key,
                    last_sequence = last,
                    received_sequence = trade.sequence,
                    "Non-monotonic trade sequence"
                );
            }
        }
        self.last_sequence = Some(trade.sequence);

        (self.consumer)(trade)?;
        self.metrics.record_trade();
        Ok(())
    }
}

/// Handle to a running trade stream.
pub struct TradeStream {
    key: StreamKey,
    buffer: OrderedBuffer<Trade>,
}

impl TradeStream {
    /// Spawn the stream's consumer task. Must be called inside a tokio runtime.
    ///
    /// Trades are never refused, so `faults` only ever carries the report of
    /// a failed consumer.
    pub fn open<C>(
        key: StreamKey,
        faults: mpsc::UnboundedSender<FaultReport>,
        metrics: Arc<PipelineMetrics>,
        consumer: C,
    ) -> Self
    where
        C: FnMut(Trade) -> Result<(), ProcessError> + Send + 'static,
    {
        let on_exit = report_termination(FeedKind::Trade, key.clone(), faults, Arc::clone(&metrics));
        let processor = TradeProcessor {
            key: key.clone(),
            consumer,
            metrics,
            last_sequence: None,
        };
        let buffer = OrderedBuffer::spawn_with_exit(format!("trade:{}", key), processor, on_exit);
        info!(stream = %key, "Trade stream opened");

        Self { key, buffer }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn send(&self, trade: Trade) -> Result<(), EnqueueError<Trade>> {
        self.buffer.enqueue(trade)
    }

    pub fn backlog(&self) -> usize {
        self.buffer.count()
    }

    pub fn is_terminated(&self) -> bool {
        self.buffer.is_terminated()
    }

    pub async fn close(self, mode: TeardownMode) -> StreamExit {
        let exit = self.buffer.shutdown(mode).await;
        info!(
            stream = %self.key,
            delivered = exit.delivered,
            undelivered = exit.undelivered,
            "Trade stream closed"
        );
        exit
    }
}
