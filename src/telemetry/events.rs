//! Telemetry event types describing detector and coordination activity.

use serde::{Deserialize, Serialize};

use crate::analysis::classifier::{Category, ClassifierKind};
use crate::protocol::DetectorStatus;

/// Diagnostic error kinds surfaced via telemetry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    MalformedWindow,
    ClassifierFault,
    DeliveryFailed,
    StoreFailed,
    SetupFailed,
}

/// How a volume change was applied
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActuationMode {
    Instant,
    Fade,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    /// Rolling per-window processing time
    Latency {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    Classification {
        classifier: ClassifierKind,
        category: Category,
        confidence: f32,
    },
    StatusChanged {
        detector: String,
        status: DetectorStatus,
    },
    Actuation {
        volume: f32,
        mode: ActuationMode,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
