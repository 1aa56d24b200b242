//! Observer surface: a read-only mirror of coordinator state plus intents.
//!
//! Observers never own settings. They render whatever the coordinator last
//! told them and send `SetEnabled` / `UpdateSettings` intents back.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;

use crate::error::ProtocolError;
use crate::protocol::{
    ContextId, DetectorStatus, Endpoint, Envelope, Message, SettingsPatch, SettingsRecord,
};

/// What an observer can render
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserverView {
    /// A StateSnapshot has been received
    pub synced: bool,
    pub enabled: bool,
    pub settings: SettingsRecord,
    /// Latest status per detector
    pub statuses: BTreeMap<ContextId, DetectorStatus>,
}

impl ObserverView {
    /// One status summarising every detector
    ///
    /// Idle when detection is disabled; otherwise the most significant status
    /// any detector reports (Ad, then Program, then Processing).
    pub fn status(&self) -> DetectorStatus {
        if !self.enabled {
            return DetectorStatus::Idle;
        }
        let any = |wanted: DetectorStatus| self.statuses.values().any(|&s| s == wanted);
        if any(DetectorStatus::Ad) {
            DetectorStatus::Ad
        } else if any(DetectorStatus::Program) {
            DetectorStatus::Program
        } else if any(DetectorStatus::Processing) {
            DetectorStatus::Processing
        } else if !self.statuses.is_empty()
            && self
                .statuses
                .values()
                .all(|&s| s == DetectorStatus::Unavailable)
        {
            DetectorStatus::Unavailable
        } else {
            DetectorStatus::Idle
        }
    }
}

pub struct Observer {
    id: ContextId,
    coordinator: Endpoint,
    view: ObserverView,
    updates: broadcast::Sender<ObserverView>,
}

impl Observer {
    pub fn new(id: ContextId, coordinator: Endpoint, buffer: usize) -> Self {
        let (updates, _) = broadcast::channel(buffer.max(1));
        Self {
            id,
            coordinator,
            view: ObserverView::default(),
            updates,
        }
    }

    pub fn id(&self) -> &ContextId {
        &self.id
    }

    pub fn view(&self) -> &ObserverView {
        &self.view
    }

    /// Request the current state from the coordinator
    pub fn attach(&self) -> Result<(), ProtocolError> {
        self.send(Message::QueryState)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), ProtocolError> {
        self.send(Message::SetEnabled(enabled))
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<(), ProtocolError> {
        self.send(Message::UpdateSettings(patch))
    }

    /// Stream of views, one per change applied after subscribing
    ///
    /// A subscriber that falls behind skips the views it missed.
    pub fn updates(&self) -> impl Stream<Item = ObserverView> + Send + 'static {
        BroadcastStream::new(self.updates.subscribe())
            .filter_map(|result| async move { result.ok() })
    }

    /// Fold one coordinator message into the view
    ///
    /// Returns true when the view changed.
    pub fn apply(&mut self, envelope: Envelope) -> bool {
        let before = self.view.clone();
        match envelope.message {
            Message::StateSnapshot(snapshot) => {
                self.view.synced = true;
                self.view.enabled = snapshot.settings.enabled;
                self.view.settings = snapshot.settings;
                self.view.statuses = snapshot
                    .statuses
                    .into_iter()
                    .map(|report| (report.detector, report.status))
                    .collect();
            }
            Message::EnabledChanged(enabled) => {
                self.view.enabled = enabled;
                self.view.settings.enabled = enabled;
            }
            Message::SettingsChanged(record) => {
                self.view.enabled = record.enabled;
                self.view.settings = record;
            }
            Message::StatusChanged(report) => {
                self.view.statuses.insert(report.detector, report.status);
            }
            other => {
                tracing::warn!("[Observer] {} ignoring unexpected {:?}", self.id, other);
            }
        }

        let changed = self.view != before;
        if changed {
            // No subscribers is fine
            let _ = self.updates.send(self.view.clone());
        }
        changed
    }

    /// Apply inbox messages until every sender is dropped
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Envelope>) -> Self {
        while let Some(envelope) = inbox.recv().await {
            self.apply(envelope);
        }
        self
    }

    fn send(&self, message: Message) -> Result<(), ProtocolError> {
        self.coordinator
            .deliver(Envelope::new(self.id.clone(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{StateSnapshot, StatusReport};

    fn observer() -> (Observer, mpsc::Receiver<Envelope>) {
        let (coordinator, rx) = Endpoint::channel(ContextId::coordinator(), 8);
        (Observer::new(ContextId::new("popup"), coordinator, 8), rx)
    }

    fn from_coordinator(message: Message) -> Envelope {
        Envelope::new(ContextId::coordinator(), message)
    }

    fn report(detector: &str, status: DetectorStatus) -> Envelope {
        from_coordinator(Message::StatusChanged(StatusReport {
            detector: ContextId::new(detector),
            status,
        }))
    }

    #[test]
    fn test_intents_are_sent_to_coordinator() {
        let (observer, mut rx) = observer();
        observer.attach().unwrap();
        observer.set_enabled(false).unwrap();
        observer
            .update_settings(SettingsPatch {
                reduced_volume: Some(5.0),
                ..SettingsPatch::default()
            })
            .unwrap();

        let messages: Vec<Message> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.message)
            .collect();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::QueryState);
        assert_eq!(messages[1], Message::SetEnabled(false));
        assert!(matches!(messages[2], Message::UpdateSettings(_)));
    }

    #[test]
    fn test_snapshot_populates_view() {
        let (mut observer, _rx) = observer();
        let snapshot = StateSnapshot {
            settings: SettingsRecord::default(),
            statuses: vec![StatusReport {
                detector: ContextId::new("tab-1"),
                status: DetectorStatus::Program,
            }],
        };
        assert!(observer.apply(from_coordinator(Message::StateSnapshot(snapshot))));

        let view = observer.view();
        assert!(view.synced);
        assert!(view.enabled);
        assert_eq!(view.status(), DetectorStatus::Program);
    }

    #[test]
    fn test_status_summary_prefers_ad() {
        let (mut observer, _rx) = observer();
        observer.apply(from_coordinator(Message::EnabledChanged(true)));
        observer.apply(report("tab-1", DetectorStatus::Program));
        observer.apply(report("tab-2", DetectorStatus::Ad));
        assert_eq!(observer.view().status(), DetectorStatus::Ad);

        observer.apply(from_coordinator(Message::EnabledChanged(false)));
        assert_eq!(observer.view().status(), DetectorStatus::Idle);
    }

    #[test]
    fn test_all_unavailable_is_reported() {
        let (mut observer, _rx) = observer();
        observer.apply(from_coordinator(Message::EnabledChanged(true)));
        observer.apply(report("tab-1", DetectorStatus::Unavailable));
        assert_eq!(observer.view().status(), DetectorStatus::Unavailable);
    }

    #[test]
    fn test_repeated_message_is_not_a_change() {
        let (mut observer, _rx) = observer();
        assert!(observer.apply(report("tab-1", DetectorStatus::Ad)));
        assert!(!observer.apply(report("tab-1", DetectorStatus::Ad)));
    }

    #[tokio::test]
    async fn test_updates_stream_yields_changed_views() {
        let (mut observer, _rx) = observer();
        let mut updates = Box::pin(observer.updates());

        let mut record = SettingsRecord::default();
        record.volume.reduced_volume = 12.0;
        observer.apply(from_coordinator(Message::SettingsChanged(record)));

        let view = updates.next().await.unwrap();
        assert_eq!(view.settings.volume.reduced_volume, 12.0);
    }
}
