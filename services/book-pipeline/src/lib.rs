//! Order-Book Reconstruction Pipeline
//!
//! Consumes already-parsed provider updates and produces:
//! - Reconstructed order books per provider+symbol, built from snapshots
//!   and contiguous delta batches
//! - Explicit capability and sequencing faults (never silent drops)
//! - Strictly ordered, per-stream delivery of books and trades to consumers
//! - An injection surface for harnesses (snapshots, delta models, scenarios)
//!
//! # Architecture
//!
//! ```text
//!  Provider/connection layer
//!        │  FeedEvent
//!    ┌───▼────┐
//!    │ Router │  ← one buffer per stream, no cross-stream ordering
//!    └───┬────┘
//!        │
//!   ┌────┴──────────────┐
//!   │                   │
//! ┌─▼──────────┐  ┌─────▼──────┐
//! │BookStream  │  │TradeStream │
//! │ (engine)   │  │            │
//! └─┬──────┬───┘  └─────┬──────┘
//!   │      │ faults     │
//!   │      ▼            │
//! ┌─▼───────────────────▼──┐
//! │   consumer callbacks   │
//! └────────────────────────┘
//! ```

pub mod buffer;
pub mod capabilities;
pub mod config;
pub mod delta;
pub mod engine;
pub mod events;
pub mod faults;
pub mod ingestion;
pub mod injection;
pub mod metrics;
pub mod order_book;
pub mod scenarios;
pub mod snapshot;
pub mod stream;
pub mod trades;

pub use buffer::{EnqueueError, OrderedBuffer, ProcessError, StreamExit, TeardownMode};
pub use capabilities::SourceCapabilities;
pub use config::{ConfigError, PipelineConfig};
pub use delta::{apply_deltas, apply_snapshot, DeltaBatch, DeltaItem, DeltaModel};
pub use engine::BookEngine;
pub use events::{FeedEvent, FeedKind};
pub use faults::{BookFault, FaultReport, SequenceFaultKind};
pub use ingestion::{FeedRouter, RouteError};
pub use injection::{InjectError, InjectionSurface};
pub use order_book::{BookLevel, BookState};
pub use scenarios::{Scenario, ScenarioParseError};
pub use stream::{BookCommand, BookStream};
pub use trades::TradeStream;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
