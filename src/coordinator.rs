// Coordinator: settings of record, enable/disable authority, fan-out
// Single Responsibility: own the SettingsRecord and relay state between contexts

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::error::{log_protocol_error, ProtocolError};
use crate::protocol::settings::SettingsPatch;
use crate::protocol::{
    fan_out, report_failures, ContextId, Delivery, DetectorStatus, Endpoint, Envelope, Message,
    SettingsRecord, SettingsStore, StateSnapshot, StatusReport,
};
use crate::telemetry::{self, DiagnosticError};

/// Single writer of the settings record
///
/// The coordinator is the only context that persists settings. Detectors and
/// observers register an inbox `Endpoint` and receive owned copies of every
/// change:
/// - `SetEnabled` / `UpdateSettings` mutate, persist, then fan out
/// - `StatusChanged` is mirrored in memory and forwarded to observers only
/// - `QueryState` is answered to the sender with a `StateSnapshot`
///
/// # Failure handling
/// - A failed store write is logged and the in-memory record stays
///   authoritative; the change is still broadcast
/// - A recipient that cannot be reached never blocks the others
pub struct Coordinator<S: SettingsStore> {
    id: ContextId,
    store: S,
    settings: SettingsRecord,
    detectors: Vec<Endpoint>,
    observers: Vec<Endpoint>,
    statuses: BTreeMap<ContextId, DetectorStatus>,
}

impl<S: SettingsStore> Coordinator<S> {
    /// Create a coordinator, loading the persisted record
    ///
    /// # Notes
    /// - Missing record: defaults are used and nothing is written until the
    ///   first change
    /// - Unreadable record: logged, defaults are used
    pub async fn start(store: S) -> Self {
        let settings = match store.load().await {
            Ok(Some(record)) => {
                tracing::info!(
                    "[Coordinator] Loaded settings (enabled={})",
                    record.enabled
                );
                record.normalized()
            }
            Ok(None) => {
                tracing::info!("[Coordinator] No stored settings, using defaults");
                SettingsRecord::default()
            }
            Err(err) => {
                log_protocol_error(&err, "Coordinator::start");
                telemetry::hub().record_error(DiagnosticError::StoreFailed, err.to_string());
                SettingsRecord::default()
            }
        };

        Self {
            id: ContextId::coordinator(),
            store,
            settings,
            detectors: Vec::new(),
            observers: Vec::new(),
            statuses: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &ContextId {
        &self.id
    }

    pub fn settings(&self) -> &SettingsRecord {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Last status each detector reported
    pub fn statuses(&self) -> &BTreeMap<ContextId, DetectorStatus> {
        &self.statuses
    }

    /// Register a detector inbox; replaces an earlier endpoint with the same id
    pub fn register_detector(&mut self, endpoint: Endpoint) {
        self.detectors.retain(|e| e.id != endpoint.id);
        tracing::info!("[Coordinator] Detector {} registered", endpoint.id);
        self.detectors.push(endpoint);
    }

    /// Register an observer inbox; replaces an earlier endpoint with the same id
    pub fn register_observer(&mut self, endpoint: Endpoint) {
        self.observers.retain(|e| e.id != endpoint.id);
        tracing::info!("[Coordinator] Observer {} registered", endpoint.id);
        self.observers.push(endpoint);
    }

    /// Forget a context and any status it reported
    pub fn unregister(&mut self, id: &ContextId) {
        self.detectors.retain(|e| &e.id != id);
        self.observers.retain(|e| &e.id != id);
        self.statuses.remove(id);
    }

    /// Current settings plus the transient status mirror
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            settings: self.settings.clone(),
            statuses: self
                .statuses
                .iter()
                .map(|(detector, status)| StatusReport {
                    detector: detector.clone(),
                    status: *status,
                })
                .collect(),
        }
    }

    /// Apply one incoming message
    ///
    /// # Returns
    /// One `Delivery` per recipient the message caused a send to. Failed
    /// deliveries have already been logged.
    pub async fn handle(&mut self, envelope: Envelope) -> Vec<Delivery> {
        let Envelope { from, message } = envelope;
        let deliveries = match message {
            Message::QueryState => self.reply_state(&from),
            Message::SetEnabled(enabled) => self.set_enabled(enabled).await,
            Message::UpdateSettings(patch) => self.update_settings(&patch).await,
            Message::StatusChanged(report) => self.relay_status(report),
            other => {
                tracing::warn!(
                    "[Coordinator] Ignoring unexpected {:?} from {}",
                    other,
                    from
                );
                Vec::new()
            }
        };

        let failed = report_failures(&deliveries, "Coordinator::handle");
        self.prune_closed(&failed);
        deliveries
    }

    /// Serve the inbox until every sender is dropped
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Envelope>) -> Self {
        tracing::info!("[Coordinator] Running");
        while let Some(envelope) = inbox.recv().await {
            self.handle(envelope).await;
        }
        tracing::info!("[Coordinator] Inbox closed, stopping");
        self
    }

    fn reply_state(&self, to: &ContextId) -> Vec<Delivery> {
        let reply = Envelope::new(self.id.clone(), Message::StateSnapshot(self.snapshot()));
        let result = match self
            .detectors
            .iter()
            .chain(&self.observers)
            .find(|e| &e.id == to)
        {
            Some(endpoint) => endpoint.deliver(reply),
            None => Err(ProtocolError::RecipientUnavailable {
                recipient: to.to_string(),
            }),
        };
        vec![Delivery {
            recipient: to.clone(),
            result,
        }]
    }

    async fn set_enabled(&mut self, enabled: bool) -> Vec<Delivery> {
        if self.settings.enabled == enabled {
            tracing::debug!("[Coordinator] enabled already {}", enabled);
            return Vec::new();
        }

        self.settings.enabled = enabled;
        tracing::info!("[Coordinator] Detection {}", if enabled { "enabled" } else { "disabled" });
        self.persist().await;
        self.broadcast(Message::EnabledChanged(enabled))
    }

    async fn update_settings(&mut self, patch: &SettingsPatch) -> Vec<Delivery> {
        if !self.settings.apply_patch(patch) {
            tracing::debug!("[Coordinator] Settings patch changed nothing");
            return Vec::new();
        }

        tracing::info!("[Coordinator] Settings updated");
        self.persist().await;
        self.broadcast(Message::SettingsChanged(self.settings.clone()))
    }

    fn relay_status(&mut self, report: StatusReport) -> Vec<Delivery> {
        self.statuses.insert(report.detector.clone(), report.status);
        let envelope = Envelope::new(self.id.clone(), Message::StatusChanged(report));
        fan_out(&self.observers, &envelope)
    }

    fn broadcast(&self, message: Message) -> Vec<Delivery> {
        let envelope = Envelope::new(self.id.clone(), message);
        fan_out(self.detectors.iter().chain(&self.observers), &envelope)
    }

    async fn persist(&self) {
        if let Err(err) = self.store.save(&self.settings).await {
            log_protocol_error(&err, "Coordinator::persist");
            telemetry::hub().record_error(DiagnosticError::StoreFailed, err.to_string());
        }
    }

    /// Drop endpoints whose inbox is gone for good (full inboxes stay)
    fn prune_closed(&mut self, failed: &[ContextId]) {
        if failed.is_empty() {
            return;
        }
        let closed: Vec<ContextId> = self
            .detectors
            .iter()
            .chain(&self.observers)
            .filter(|e| failed.contains(&e.id) && e.is_closed())
            .map(|e| e.id.clone())
            .collect();
        for id in closed {
            tracing::info!("[Coordinator] Dropping closed context {}", id);
            self.unregister(&id);
        }
    }
}
