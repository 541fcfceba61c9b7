//! Capability and sequencing faults
//!
//! Every fallible engine operation returns one of these variants. They are
//! recoverable by the caller, who decides whether to request a fresh
//! snapshot, fall back to snapshot-only mode, or escalate to an operator.
//! The engine never drops an update without returning one of them.
//!
//! `ConsumerFailed` is the exception: it is never returned by the engine,
//! only reported once when a stream's consumer stops for good.

use serde::{Deserialize, Serialize};
use types::ids::{ProviderId, StreamKey};

use crate::buffer::ProcessError;
use crate::events::FeedKind;
use crate::scenarios::Scenario;

/// Why a sequence number was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceFaultKind {
    /// Received sequence is ahead of the next expected one.
    Gap,
    /// Received sequence is behind the current book.
    Regression,
    /// Deltas arrived before any snapshot established a baseline.
    MissingSnapshot,
    /// An item in a batch carries a different sequence than the batch.
    MixedBatch,
    /// The book is at `u64::MAX`; only a reset can move it on.
    Exhausted,
}

impl std::fmt::Display for SequenceFaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SequenceFaultKind::Gap => "gap",
            SequenceFaultKind::Regression => "regression",
            SequenceFaultKind::MissingSnapshot => "missing snapshot",
            SequenceFaultKind::MixedBatch => "mixed batch",
            SequenceFaultKind::Exhausted => "exhausted",
        };
        f.write_str(label)
    }
}

/// Faults returned by the delta application engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookFault {
    #[error("sequence {kind}: expected {expected}, received {received}")]
    Sequence {
        kind: SequenceFaultKind,
        expected: u64,
        received: u64,
    },

    #[error("provider {provider} does not support incremental deltas")]
    DeltaUnsupported { provider: ProviderId },

    #[error("provider {provider} does not model scenario {scenario}")]
    ScenarioUnsupported {
        provider: ProviderId,
        scenario: Scenario,
    },

    #[error("provider {provider} cannot sequence snapshots")]
    SequencingUnsupported { provider: ProviderId },

    #[error("update for stream {received} sent to stream {expected}")]
    StreamMismatch {
        expected: StreamKey,
        received: StreamKey,
    },

    #[error("stream terminated: {error}")]
    ConsumerFailed { error: ProcessError },
}

impl BookFault {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            BookFault::Sequence { .. } => "sequence",
            BookFault::DeltaUnsupported { .. } => "delta_unsupported",
            BookFault::ScenarioUnsupported { .. } => "scenario_unsupported",
            BookFault::SequencingUnsupported { .. } => "sequencing_unsupported",
            BookFault::StreamMismatch { .. } => "stream_mismatch",
            BookFault::ConsumerFailed { .. } => "consumer_failed",
        }
    }

    /// Whether the stream that raised this has stopped consuming.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookFault::ConsumerFailed { .. })
    }

    /// Whether the caller should recover by requesting a fresh snapshot.
    pub fn needs_resnapshot(&self) -> bool {
        matches!(
            self,
            BookFault::Sequence {
                kind: SequenceFaultKind::Gap | SequenceFaultKind::MissingSnapshot,
                ..
            }
        )
    }
}

/// A fault raised inside a stream's consumer context, tagged with the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReport {
    pub feed: FeedKind,
    pub key: StreamKey,
    pub fault: BookFault,
    /// Unix nanos when the fault was raised
    pub raised_at: i64,
}

impl FaultReport {
    pub fn new(feed: FeedKind, key: StreamKey, fault: BookFault) -> Self {
        Self {
            feed,
            key,
            fault,
            raised_at: types::time::now_nanos(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_fault_display() {
        let fault = BookFault::Sequence {
            kind: SequenceFaultKind::Gap,
            expected: 5,
            received: 9,
        };
        assert_eq!(fault.to_string(), "sequence gap: expected 5, received 9");
        assert_eq!(fault.label(), "sequence");
    }

    #[test]
    fn test_needs_resnapshot() {
        let gap = BookFault::Sequence {
            kind: SequenceFaultKind::Gap,
            expected: 2,
            received: 4,
        };
        let stale = BookFault::Sequence {
            kind: SequenceFaultKind::Regression,
            expected: 5,
            received: 3,
        };
        let unsupported = BookFault::DeltaUnsupported {
            provider: ProviderId::new("snapshots-only"),
        };

        assert!(gap.needs_resnapshot());
        assert!(!stale.needs_resnapshot());
        assert!(!unsupported.needs_resnapshot());
    }

    #[test]
    fn test_scenario_unsupported_display() {
        let fault = BookFault::ScenarioUnsupported {
            provider: ProviderId::new("binance"),
            scenario: Scenario::CancelReject,
        };
        assert!(fault.to_string().contains("cancel_reject"));
    }

    #[test]
    fn test_consumer_failed_is_terminal() {
        let fault = BookFault::ConsumerFailed {
            error: ProcessError::consumer("sink closed"),
        };
        assert!(fault.is_terminal());
        assert!(!fault.needs_resnapshot());
        assert_eq!(fault.label(), "consumer_failed");
        assert_eq!(fault.to_string(), "stream terminated: consumer failed: sink closed");
    }
}
