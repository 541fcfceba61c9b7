//! Feed events handed to the router by the provider/connection layer
//!
//! Every event is already parsed and carries the stream key it belongs to.
//! Each one gets a UUID v7 so it can be traced through logs.

use std::fmt;

use serde::{Deserialize, Serialize};
use types::ids::StreamKey;
use types::trade::Trade;
use uuid::Uuid;

use crate::delta::DeltaBatch;
use crate::order_book::BookState;
use crate::stream::BookCommand;

/// Which kind of stream an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Book,
    Trade,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Book => f.write_str("book"),
            FeedKind::Trade => f.write_str("trade"),
        }
    }
}

/// One parsed update from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEvent {
    /// Unique event identifier (UUID v7)
    pub event_id: Uuid,
    /// Stream the event belongs to
    pub key: StreamKey,
    /// Unix nanos when the connection layer received it
    pub received_at: i64,
    pub payload: FeedPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedPayload {
    Snapshot { book: BookState, sequence: u64 },
    Deltas { batch: DeltaBatch },
    Trade { trade: Trade },
    Reset,
}

impl FeedEvent {
    fn new(key: StreamKey, received_at: i64, payload: FeedPayload) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            key,
            received_at,
            payload,
        }
    }

    pub fn snapshot(book: BookState, sequence: u64, received_at: i64) -> Self {
        Self::new(book.key(), received_at, FeedPayload::Snapshot { book, sequence })
    }

    pub fn deltas(key: StreamKey, batch: DeltaBatch, received_at: i64) -> Self {
        Self::new(key, received_at, FeedPayload::Deltas { batch })
    }

    pub fn trade(trade: Trade) -> Self {
        let key = trade.stream_key();
        let received_at = trade.timestamp;
        Self::new(key, received_at, FeedPayload::Trade { trade })
    }

    pub fn reset(key: StreamKey, received_at: i64) -> Self {
        Self::new(key, received_at, FeedPayload::Reset)
    }

    pub fn kind(&self) -> FeedKind {
        match self.payload {
            FeedPayload::Trade { .. } => FeedKind::Trade,
            _ => FeedKind::Book,
        }
    }

    /// Short label for logging.
    pub fn event_type_label(&self) -> &'static str {
        match self.payload {
            FeedPayload::Snapshot { .. } => "snapshot",
            FeedPayload::Deltas { .. } => "deltas",
            FeedPayload::Trade { .. } => "trade",
            FeedPayload::Reset => "reset",
        }
    }
}

/// Where a routed payload ends up.
pub(crate) enum Routed {
    Book(BookCommand),
    Trade(Trade),
}

impl From<FeedEvent> for Routed {
    fn from(event: FeedEvent) -> Self {
        let timestamp = event.received_at;
        match event.payload {
            FeedPayload::Snapshot { book, sequence } => Routed::Book(BookCommand::Snapshot {
                book,
                sequence,
                timestamp,
            }),
            FeedPayload::Deltas { batch } => Routed::Book(BookCommand::Deltas { batch, timestamp }),
            FeedPayload::Trade { trade } => Routed::Trade(trade),
            FeedPayload::Reset => Routed::Book(BookCommand::Reset),
        }
    }
}
