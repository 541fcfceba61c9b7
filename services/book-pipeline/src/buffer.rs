//! Per-entity ordered buffer
//!
//! An unbounded FIFO with exactly one consumer task. Producers enqueue from
//! any thread without blocking; the consumer dequeues strictly in enqueue
//! order and hands each item to a synchronous processor, one at a time.
//! The processor runs on tokio's blocking pool, so a slow callback holds up
//! its own buffer and nothing else.
//!
//! A processor failure (or panic) stops the consumer for good. The exit
//! status reports the failure plus how many items were left undelivered;
//! there is no automatic restart.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Failure raised by a processor. Fatal to its buffer only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    #[error("consumer failed: {0}")]
    Consumer(String),

    #[error("consumer panicked: {0}")]
    Panicked(String),
}

impl ProcessError {
    pub fn consumer(reason: impl Into<String>) -> Self {
        ProcessError::Consumer(reason.into())
    }
}

/// Enqueue refused. The item is handed back so nothing is silently lost.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError<T> {
    #[error("buffer consumer has terminated")]
    Closed(T),
}

impl<T> EnqueueError<T> {
    pub fn into_inner(self) -> T {
        match self {
            EnqueueError::Closed(item) => item,
        }
    }
}

/// How the consumer winds down on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownMode {
    /// Process everything already enqueued, then exit.
    #[default]
    Drain,
    /// Exit after the in-flight item; the rest count as undelivered.
    Abandon,
}

/// How a consumer loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamExit {
    pub label: String,
    /// Items handed to the processor successfully.
    pub delivered: u64,
    /// Items enqueued but never handed to the processor.
    pub undelivered: usize,
    /// The processor failure that stopped the loop, if any.
    pub failure: Option<ProcessError>,
}

impl StreamExit {
    pub fn is_clean(&self) -> bool {
        self.failure.is_none() && self.undelivered == 0
    }
}

/// Synchronous per-item callback. May block.
pub trait Processor<T>: Send + 'static {
    fn process(&mut self, item: T) -> Result<(), ProcessError>;
}

impl<T, F> Processor<T> for F
where
    F: FnMut(T) -> Result<(), ProcessError> + Send + 'static,
{
    fn process(&mut self, item: T) -> Result<(), ProcessError> {
        self(item)
    }
}

/// Single-consumer FIFO bound to one entity.
pub struct OrderedBuffer<T> {
    label: String,
    tx: mpsc::UnboundedSender<T>,
    pending: Arc<AtomicUsize>,
    stop: watch::Sender<Option<TeardownMode>>,
    handle: JoinHandle<StreamExit>,
}

impl<T: Send + 'static> OrderedBuffer<T> {
    /// Start the consumer task. Must be called inside a tokio runtime.
    pub fn spawn<P>(label: impl Into<String>, processor: P) -> Self
    where
        P: Processor<T>,
    {
        Self::spawn_with_exit(label, processor, |_: &StreamExit| {})
    }

    /// Like `spawn`, with `on_exit` run on the consumer task as soon as the
    /// loop ends, before anyone calls `shutdown`.
    pub fn spawn_with_exit<P, E>(label: impl Into<String>, processor: P, on_exit: E) -> Self
    where
        P: Processor<T>,
        E: FnOnce(&StreamExit) + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(None);
        let pending = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(consume(
            label.clone(),
            rx,
            stop_rx,
            Arc::clone(&pending),
            processor,
            on_exit,
        ));
        debug!(buffer = %label, "Consumer spawned");

        Self {
            label,
            tx,
            pending,
            stop,
            handle,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Append an item. Never blocks.
    pub fn enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(item).map_err(|rejected| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            EnqueueError::Closed(rejected.0)
        })
    }

    /// Items enqueued and not yet dequeued.
    pub fn count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the consumer has stopped accepting items.
    pub fn is_terminated(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer stops accepting items.
    pub async fn terminated(&self) {
        self.tx.closed().await
    }

    /// Stop the consumer and wait for it to exit.
    pub async fn shutdown(self, mode: TeardownMode) -> StreamExit {
        // A consumer that already exited has dropped its receiver.
        let _ = self.stop.send(Some(mode));
        let label = self.label;
        let pending = self.pending;

        match self.handle.await {
            Ok(exit) => exit,
            Err(join_err) => {
                error!(buffer = %label, error = %join_err, "Consumer task aborted");
                StreamExit {
                    label,
                    delivered: 0,
                    undelivered: pending.swap(0, Ordering::AcqRel),
                    failure: Some(ProcessError::Panicked(join_err.to_string())),
                }
            }
        }
    }
}

/// Run one item on the blocking pool and hand the processor back.
async fn dispatch<T, P>(mut processor: P, item: T) -> Result<(P, Result<(), ProcessError>), ProcessError>
where
    T: Send + 'static,
    P: Processor<T>,
{
    tokio::task::spawn_blocking(move || {
        let outcome = processor.process(item);
        (processor, outcome)
    })
    .await
    .map_err(|join_err| ProcessError::Panicked(join_err.to_string()))
}

async fn consume<T, P, E>(
    label: String,
    mut rx: mpsc::UnboundedReceiver<T>,
    mut stop: watch::Receiver<Option<TeardownMode>>,
    pending: Arc<AtomicUsize>,
    mut processor: P,
    on_exit: E,
) -> StreamExit
where
    T: Send + 'static,
    P: Processor<T>,
    E: FnOnce(&StreamExit),
{
    let mut delivered = 0u64;
    let mut draining = false;

    let failure = loop {
        tokio::select! {
            biased;

            changed = stop.changed(), if !draining => {
                // A dropped handle drains like an explicit shutdown.
                let mode = match changed {
                    Ok(()) => {
                        let requested = *stop.borrow();
                        requested.unwrap_or_default()
                    }
                    Err(_) => TeardownMode::Drain,
                };
                rx.close();
                debug!(buffer = %label, mode = ?mode, "Teardown requested");
                if mode == TeardownMode::Abandon {
                    break None;
                }
                draining = true;
            }

            item = rx.recv() => {
                let Some(item) = item else { break None };
                pending.fetch_sub(1, Ordering::AcqRel);
                match dispatch(processor, item).await {
                    Ok((returned, Ok(()))) => {
                        processor = returned;
                        delivered += 1;
                    }
                    Ok((_, Err(err))) | Err(err) => break Some(err),
                }
            }
        }
    };

    rx.close();
    let mut undelivered = 0usize;
    while rx.try_recv().is_ok() {
        pending.fetch_sub(1, Ordering::AcqRel);
        undelivered += 1;
    }

    match &failure {
        Some(err) => error!(
            buffer = %label,
            delivered,
            undelivered,
            error = %err,
            "Consumer failed"
        ),
        None => info!(buffer = %label, delivered, undelivered, "Consumer stopped"),
    }

    let exit = StreamExit {
        label,
        delivered,
        undelivered,
        failure,
    };
    on_exit(&exit);
    exit
}
