//! Feed router
//!
//! Caller-owned registry of open streams. The provider/connection layer
//! hands every parsed event to `route`, which enqueues it on the matching
//! book or trade stream. Streams are opened and torn down one at a time;
//! there is no process-wide state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::ids::StreamKey;
use types::trade::Trade;

use crate::buffer::{ProcessError, StreamExit, TeardownMode};
use crate::capabilities::SourceCapabilities;
use crate::config::PipelineConfig;
use crate::events::{FeedEvent, FeedKind, Routed};
use crate::faults::FaultReport;
use crate::metrics::{check_backlog, Alert, PipelineMetrics};
use crate::order_book::BookState;
use crate::stream::BookStream;
use crate::trades::TradeStream;

/// Errors that can occur while routing or managing streams.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no {kind} stream open for {key}")]
    UnknownStream { kind: FeedKind, key: StreamKey },

    #[error("{kind} stream already open for {key}")]
    AlreadyOpen { kind: FeedKind, key: StreamKey },

    #[error("{kind} stream for {key} has terminated")]
    StreamClosed { kind: FeedKind, key: StreamKey },

    #[error("{kind} event addressed to {key} carries data for {payload}")]
    KeyMismatch {
        kind: FeedKind,
        key: StreamKey,
        payload: StreamKey,
    },
}

/// Routes feed events to per-stream buffers.
pub struct FeedRouter {
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
    fault_tx: mpsc::UnboundedSender<FaultReport>,
    books: BTreeMap<StreamKey, BookStream>,
    trades: BTreeMap<StreamKey, TradeStream>,
}

impl FeedRouter {
    /// Create a router. Faults from every stream arrive on the returned
    /// receiver, tagged with their feed and stream key. A stream whose
    /// consumer fails reports one terminal `ConsumerFailed` fault.
    pub fn new(config: PipelineConfig) -> (Self, mpsc::UnboundedReceiver<FaultReport>) {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        info!(
            teardown = ?config.teardown,
            backlog_warning_threshold = config.backlog_warning_threshold,
            "FeedRouter initialized"
        );

        let router = Self {
            config,
            metrics: Arc::new(PipelineMetrics::new()),
            fault_tx,
            books: BTreeMap::new(),
            trades: BTreeMap::new(),
        };
        (router, fault_rx)
    }

    pub fn with_defaults() -> (Self, mpsc::UnboundedReceiver<FaultReport>) {
        Self::new(PipelineConfig::default())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Open a book stream. `caps` falls back to the configured defaults.
    pub fn open_book_stream<C>(
        &mut self,
        key: StreamKey,
        caps: Option<SourceCapabilities>,
        consumer: C,
    ) -> Result<(), RouteError>
    where
        C: FnMut(Arc<BookState>) -> Result<(), ProcessError> + Send + 'static,
    {
        if self.books.contains_key(&key) {
            return Err(RouteError::AlreadyOpen {
                kind: FeedKind::Book,
                key,
            });
        }

        let caps = caps.unwrap_or_else(|| self.config.default_capabilities.clone());
        let stream = BookStream::open(
            key.clone(),
            caps,
            self.fault_tx.clone(),
            Arc::clone(&self.metrics),
            consumer,
        );
        self.books.insert(key, stream);
        Ok(())
    }

    pub fn open_trade_stream<C>(&mut self, key: StreamKey, consumer: C) -> Result<(), RouteError>
    where
        C: FnMut(Trade) -> Result<(), ProcessError> + Send + 'static,
    {
        if self.trades.contains_key(&key) {
            return Err(RouteError::AlreadyOpen {
                kind: FeedKind::Trade,
                key,
            });
        }

        let stream = TradeStream::open(
            key.clone(),
            self.fault_tx.clone(),
            Arc::clone(&self.metrics),
            consumer,
        );
        self.trades.insert(key, stream);
        Ok(())
    }

    /// Enqueue `event` on its stream. Never blocks.
    pub fn route(&self, event: FeedEvent) -> Result<(), RouteError> {
        let kind = event.kind();
        let key = event.key.clone();
        debug!(
            event_id = %event.event_id,
            stream = %key,
            event_type = event.event_type_label(),
            "Routing event"
        );

        let accepted = match Routed::from(event) {
            Routed::Book(command) => {
                let stream = self.books.get(&key).ok_or_else(|| self.unknown(kind, &key))?;
                stream.send(command).is_ok()
            }
            Routed::Trade(trade) => {
                let payload = trade.stream_key();
                if payload != key {
                    warn!(stream = %key, payload = %payload, "Trade addressed to the wrong stream");
                    return Err(RouteError::KeyMismatch { kind, key, payload });
                }
                let stream = self.trades.get(&key).ok_or_else(|| self.unknown(kind, &key))?;
                stream.send(trade).is_ok()
            }
        };

        if accepted {
            Ok(())
        } else {
            self.metrics.record_enqueue_refused();
            warn!(stream = %key, kind = %kind, "Event refused by terminated stream");
            Err(RouteError::StreamClosed { kind, key })
        }
    }

    /// Tear down one stream and report how it ended.
    pub async fn close_stream(
        &mut self,
        kind: FeedKind,
        key: &StreamKey,
        mode: TeardownMode,
    ) -> Result<StreamExit, RouteError> {
        let missing = || RouteError::UnknownStream {
            kind,
            key: key.clone(),
        };
        let exit = match kind {
            FeedKind::Book => self.books.remove(key).ok_or_else(missing)?.close(mode).await,
            FeedKind::Trade => self.trades.remove(key).ok_or_else(missing)?.close(mode).await,
        };
        Ok(exit)
    }

    /// Tear down every stream with the configured teardown mode.
    pub async fn close_all(&mut self) -> Vec<StreamExit> {
        let mode = self.config.teardown;
        let mut exits = Vec::with_capacity(self.stream_count());

        for (_, stream) in std::mem::take(&mut self.books) {
            exits.push(stream.close(mode).await);
        }
        for (_, stream) in std::mem::take(&mut self.trades) {
            exits.push(stream.close(mode).await);
        }
        exits
    }

    /// Current queue depth per open stream.
    pub fn backlog(&self) -> BTreeMap<(FeedKind, StreamKey), usize> {
        let books = self
            .books
            .iter()
            .map(|(key, stream)| ((FeedKind::Book, key.clone()), stream.backlog()));
        let trades = self
            .trades
            .iter()
            .map(|(key, stream)| ((FeedKind::Trade, key.clone()), stream.backlog()));
        books.chain(trades).collect()
    }

    /// Streams whose backlog is above the configured threshold.
    pub fn monitor_backlog(&self) -> Vec<Alert> {
        let labelled = self
            .backlog()
            .into_iter()
            .map(|((kind, key), depth)| (format!("{}:{}", kind, key), depth));
        check_backlog(labelled, self.config.backlog_warning_threshold)
    }

    /// Check every alert threshold, backlog included.
    pub fn check_alerts(&self) -> Vec<Alert> {
        let labelled = self
            .backlog()
            .into_iter()
            .map(|((kind, key), depth)| (format!("{}:{}", kind, key), depth));
        self.metrics
            .check_thresholds(&self.config.alert_thresholds(), labelled)
    }

    /// Whether a stream is registered and its consumer still running.
    /// A terminated stream stays registered until `close_stream` collects
    /// its exit status.
    pub fn is_open(&self, kind: FeedKind, key: &StreamKey) -> bool {
        match kind {
            FeedKind::Book => self.books.get(key).is_some_and(|stream| !stream.is_terminated()),
            FeedKind::Trade => self.trades.get(key).is_some_and(|stream| !stream.is_terminated()),
        }
    }

    pub fn stream_count(&self) -> usize {
        self.books.len() + self.trades.len()
    }

    fn unknown(&self, kind: FeedKind, key: &StreamKey) -> RouteError {
        warn!(stream = %key, kind = %kind, "No stream open for event");
        RouteError::UnknownStream {
            kind,
            key: key.clone(),
        }
    }
}
