//! Pipeline counters and backlog monitoring
//!
//! Counters are plain atomics shared through an `Arc<PipelineMetrics>`;
//! every stream records into the same instance. `export` flattens them into
//! a sorted map for whatever exposition layer sits on top.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::warn;

use crate::faults::BookFault;

/// Core metrics for the reconstruction pipeline.
pub struct PipelineMetrics {
    // Engine transitions
    pub snapshots_applied: AtomicU64,
    pub delta_batches_applied: AtomicU64,
    pub delta_items_applied: AtomicU64,
    pub apply_latency_ns: Mutex<LatencyTracker>,

    // Faults
    pub faults_raised: AtomicU64,
    pub faults_by_kind: Mutex<BTreeMap<&'static str, u64>>,

    // Delivery
    pub books_published: AtomicU64,
    pub trades_delivered: AtomicU64,
    pub consumer_failures: AtomicU64,
    pub enqueue_refused: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            snapshots_applied: AtomicU64::new(0),
            delta_batches_applied: AtomicU64::new(0),
            delta_items_applied: AtomicU64::new(0),
            apply_latency_ns: Mutex::new(LatencyTracker::new(1000)),
            faults_raised: AtomicU64::new(0),
            faults_by_kind: Mutex::new(BTreeMap::new()),
            books_published: AtomicU64::new(0),
            trades_delivered: AtomicU64::new(0),
            consumer_failures: AtomicU64::new(0),
            enqueue_refused: AtomicU64::new(0),
        }
    }

    pub fn record_snapshot(&self, latency_ns: u64) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ns);
    }

    pub fn record_delta_batch(&self, items: usize, latency_ns: u64) {
        self.delta_batches_applied.fetch_add(1, Ordering::Relaxed);
        self.delta_items_applied.fetch_add(items as u64, Ordering::Relaxed);
        self.record_latency(latency_ns);
    }

    pub fn record_fault(&self, fault: &BookFault) {
        self.faults_raised.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.faults_by_kind.lock() {
            *by_kind.entry(fault.label()).or_insert(0) += 1;
        }
    }

    pub fn record_publish(&self) {
        self.books_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade(&self) {
        self.trades_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_consumer_failure(&self) {
        self.consumer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueue_refused(&self) {
        self.enqueue_refused.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency_ns: u64) {
        if let Ok(mut tracker) = self.apply_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    /// Check counters and per-stream backlog against `thresholds`.
    ///
    /// Stateless: the same counters always yield the same alerts.
    pub fn check_thresholds<K: Display>(
        &self,
        thresholds: &AlertThresholds,
        backlog: impl IntoIterator<Item = (K, usize)>,
    ) -> Vec<Alert> {
        let mut alerts = check_backlog(backlog, thresholds.max_backlog);

        let faults = self.faults_raised.load(Ordering::Relaxed);
        if faults > thresholds.max_faults {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                metric: "faults_raised".to_string(),
                message: format!("Faults raised: {} > threshold {}", faults, thresholds.max_faults),
            });
        }

        let failures = self.consumer_failures.load(Ordering::Relaxed);
        if failures > 0 {
            alerts.push(Alert {
                level: AlertLevel::Critical,
                metric: "consumer_failures".to_string(),
                message: format!("{} stream consumer(s) terminated", failures),
            });
        }

        if let Ok(tracker) = self.apply_latency_ns.lock() {
            if let Some(p99) = tracker.percentile(99) {
                if p99 > thresholds.max_apply_p99_ns {
                    alerts.push(Alert {
                        level: AlertLevel::Warning,
                        metric: "apply_latency_p99".to_string(),
                        message: format!(
                            "Apply p99: {}ns > threshold {}ns",
                            p99, thresholds.max_apply_p99_ns
                        ),
                    });
                }
            }
        }

        alerts
    }

    /// Export metrics as a sorted map.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("snapshots_applied".to_string(), self.snapshots_applied.load(Ordering::Relaxed));
        m.insert("delta_batches_applied".to_string(), self.delta_batches_applied.load(Ordering::Relaxed));
        m.insert("delta_items_applied".to_string(), self.delta_items_applied.load(Ordering::Relaxed));
        m.insert("faults_raised".to_string(), self.faults_raised.load(Ordering::Relaxed));
        m.insert("books_published".to_string(), self.books_published.load(Ordering::Relaxed));
        m.insert("trades_delivered".to_string(), self.trades_delivered.load(Ordering::Relaxed));
        m.insert("consumer_failures".to_string(), self.consumer_failures.load(Ordering::Relaxed));
        m.insert("enqueue_refused".to_string(), self.enqueue_refused.load(Ordering::Relaxed));
        if let Ok(by_kind) = self.faults_by_kind.lock() {
            for (kind, count) in by_kind.iter() {
                m.insert(format!("faults_{}", kind), *count);
            }
        }
        m
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Flag every stream whose backlog exceeds `threshold`.
pub fn check_backlog<K: Display>(
    backlog: impl IntoIterator<Item = (K, usize)>,
    threshold: usize,
) -> Vec<Alert> {
    backlog
        .into_iter()
        .filter(|(_, depth)| *depth > threshold)
        .map(|(stream, depth)| {
            warn!(stream = %stream, depth, threshold, "Stream backlog above threshold");
            Alert {
                level: AlertLevel::Warning,
                metric: "backlog".to_string(),
                message: format!("Backlog for {}: {} > threshold {}", stream, depth, threshold),
            }
        })
        .collect()
}

/// Sliding window of latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample, evicting the oldest when full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = p.min(100) * (sorted.len() - 1) / 100;
        Some(sorted[idx])
    }

    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as u64)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Alert severity level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// An alert triggered by threshold breach.
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
}

/// Configurable alert thresholds.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    /// Max queued items on any one stream.
    pub max_backlog: usize,
    /// Max faults raised across all streams.
    pub max_faults: u64,
    /// Max apply p99 latency in nanoseconds.
    pub max_apply_p99_ns: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_backlog: 10_000,
            max_faults: 100,
            max_apply_p99_ns: 1_000_000, // 1ms
        }
    }
}
