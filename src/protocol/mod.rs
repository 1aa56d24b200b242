//! Cross-context coordination protocol.
//!
//! Detectors, the coordinator, and observers share no memory. Every exchange
//! is an owned `Envelope` pushed into the recipient's inbox; payloads are
//! plain serde records so the same messages can cross a real process boundary
//! as JSON.

pub mod fanout;
pub mod settings;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::analysis::classifier::Category;
use crate::error::ProtocolError;

pub use fanout::{fan_out, report_failures, Delivery};
pub use settings::{SettingsPatch, SettingsRecord};
pub use store::{JsonFileStore, MemoryStore, SettingsStore};

/// Identity of one execution context
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn coordinator() -> Self {
        Self::new("coordinator")
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Externally visible detector status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStatus {
    /// Detection not running
    #[default]
    Idle,
    /// Running, prerequisites or first decision still pending
    Processing,
    Program,
    Ad,
    /// Setup retries exhausted
    Unavailable,
}

impl From<Category> for DetectorStatus {
    fn from(category: Category) -> Self {
        match category {
            Category::Program => DetectorStatus::Program,
            Category::Ad => DetectorStatus::Ad,
        }
    }
}

/// One detector's status, as fanned out to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub detector: ContextId,
    pub status: DetectorStatus,
}

/// Reply to `QueryState`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub settings: SettingsRecord,
    /// Last status reported by each detector (transient, never persisted)
    #[serde(default)]
    pub statuses: Vec<StatusReport>,
}

/// Every message kind exchanged between contexts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    /// Observer/Detector → Coordinator
    QueryState,
    /// Coordinator → requester
    StateSnapshot(StateSnapshot),
    /// Observer → Coordinator
    SetEnabled(bool),
    /// Observer → Coordinator
    UpdateSettings(SettingsPatch),
    /// Coordinator → Detectors (and observers, for their mirror)
    EnabledChanged(bool),
    /// Coordinator → Detectors (and observers, for their mirror)
    SettingsChanged(SettingsRecord),
    /// Detector → Coordinator → Observers
    StatusChanged(StatusReport),
}

/// A message plus its sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: ContextId,
    pub message: Message,
}

impl Envelope {
    pub fn new(from: ContextId, message: Message) -> Self {
        Self { from, message }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Send half of a context's inbox
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: ContextId,
    tx: mpsc::Sender<Envelope>,
}

impl Endpoint {
    pub fn new(id: ContextId, tx: mpsc::Sender<Envelope>) -> Self {
        Self { id, tx }
    }

    /// Create an endpoint and the inbox it feeds
    pub fn channel(id: ContextId, capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(id, tx), rx)
    }

    /// Non-blocking delivery; a full or closed inbox is reported, not awaited
    pub fn deliver(&self, envelope: Envelope) -> Result<(), ProtocolError> {
        self.tx
            .try_send(envelope)
            .map_err(|_| ProtocolError::RecipientUnavailable {
                recipient: self.id.to_string(),
            })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_json_shape() {
        let envelope = Envelope::new(ContextId::new("observer-1"), Message::SetEnabled(false));
        let json = envelope.to_json().unwrap();
        assert!(json.contains(r#""type":"set_enabled""#));
        assert!(json.contains(r#""payload":false"#));
        assert_eq!(Envelope::from_json(&json).unwrap(), envelope);
    }

    #[test]
    fn test_query_state_has_no_payload() {
        let envelope = Envelope::new(ContextId::new("detector-1"), Message::QueryState);
        let json = envelope.to_json().unwrap();
        assert!(json.contains(r#""type":"query_state""#));
    }

    #[test]
    fn test_decode_garbage_is_protocol_error() {
        assert!(matches!(
            Envelope::from_json("{\"from\": 3}"),
            Err(ProtocolError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_endpoint_reports_unavailable() {
        let (endpoint, rx) = Endpoint::channel(ContextId::new("detector-1"), 4);
        drop(rx);
        let result = endpoint.deliver(Envelope::new(ContextId::coordinator(), Message::QueryState));
        assert_eq!(
            result,
            Err(ProtocolError::RecipientUnavailable {
                recipient: "detector-1".to_string()
            })
        );
    }
}
