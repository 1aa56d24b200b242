//! Diagnostics telemetry collector and helpers.
//!
//! The collector multiplexes classification, status, actuation, and error
//! events into a bounded history plus an async broadcast stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::analysis::classifier::{ClassifierKind, Prediction};
use crate::error::{DetectorError, ErrorCode, ProtocolError};
use crate::protocol::{ContextId, DetectorStatus};

pub mod events;

pub use events::{ActuationMode, DiagnosticError, MetricEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
    /// Error events since start, including those no longer in `recent`
    pub error_events: u64,
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
    error_events: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
            error_events: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if matches!(event, MetricEvent::Error { .. }) {
            self.error_events.fetch_add(1, Ordering::Relaxed);
        }
        {
            let mut history = lock_recovering(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = lock_recovering(&self.history);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
            error_events: self.error_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling window of per-window processing times.
struct LatencyTracker {
    samples: VecDeque<f32>,
    max_samples: usize,
}

impl LatencyTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    fn observe(&mut self, value: f32) -> (f32, f32, usize) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value.abs());

        let count = self.samples.len();
        let sum: f32 = self.samples.iter().copied().sum();
        let max = self
            .samples
            .iter()
            .copied()
            .fold(0.0_f32, |acc, next| acc.max(next));
        (sum / count as f32, max, count)
    }
}

/// Top-level hub wrapping collector state plus derived gauges.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    latency: Mutex<LatencyTracker>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, latency_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            latency: Mutex::new(LatencyTracker::new(latency_window)),
        }
    }

    /// Live stream of every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.collector.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn record_classification(&self, classifier: ClassifierKind, prediction: &Prediction) {
        self.collector.publish(MetricEvent::Classification {
            classifier,
            category: prediction.category,
            confidence: prediction.confidence,
        });
    }

    pub fn record_cycle_time(&self, elapsed: Duration) {
        let (avg, max, count) =
            lock_recovering(&self.latency).observe(elapsed.as_secs_f32() * 1000.0);

        self.collector.publish(MetricEvent::Latency {
            avg_ms: avg,
            max_ms: max,
            sample_count: count,
        });
    }

    pub fn record_status(&self, detector: &ContextId, status: DetectorStatus) {
        self.collector.publish(MetricEvent::StatusChanged {
            detector: detector.to_string(),
            status,
        });
    }

    pub fn record_actuation(&self, volume: f32, mode: ActuationMode) {
        self.collector
            .publish(MetricEvent::Actuation { volume, mode });
    }

    pub fn record_delivery_failure(&self, recipient: &ContextId, err: &ProtocolError) {
        self.record_error(
            DiagnosticError::DeliveryFailed,
            format!("{} (code {})", recipient, err.code()),
        );
    }

    /// Record a detector fault that was recovered locally
    pub fn record_detector_error(&self, err: &DetectorError) {
        let code = match err {
            DetectorError::MalformedWindow { .. } => DiagnosticError::MalformedWindow,
            DetectorError::ClassifierFault { .. } | DetectorError::ModelLoad { .. } => {
                DiagnosticError::ClassifierFault
            }
            DetectorError::SetupFailed { .. }
            | DetectorError::NoPlaybackSource
            | DetectorError::RetriesExhausted { .. } => DiagnosticError::SetupFailed,
        };
        self.record_error(code, format!("code {}: {}", err.code(), err.message()));
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}
