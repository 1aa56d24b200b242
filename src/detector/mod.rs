// Detector - per-playback-context pipeline
//
// window → FeatureExtractor → DecisionSmoother(Classifier) → VolumeActuator
//
// All mutable per-context state lives in an owned `DetectorState`; nothing is
// shared with other contexts. Settings arrive only through the coordinator:
// on attach the detector sends QueryState and ignores EnabledChanged and
// SettingsChanged until the StateSnapshot reply has been applied.
//
// Status lifecycle:
//   Idle ──start──▶ Processing ──first decision──▶ Program | Ad
//   Processing ──setup retries exhausted──▶ Unavailable
//   any ──stop──▶ Idle

mod runner;
mod tap;

pub use runner::run_detector;
pub use tap::{AudioTap, ReplayTap};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actuator::VolumeActuator;
use crate::analysis::classifier::{build_classifier, kind_of, Category, Classifier, ClassifierKind};
use crate::analysis::{
    AnalysisWindow, DecisionSmoother, FeatureExtractor, FeatureVector, SmootherOutcome,
    SmootherState,
};
use crate::clock::TimeSource;
use crate::config::{AppConfig, DetectorConfig};
use crate::error::{log_detector_error, log_protocol_error, DetectorError, ProtocolError};
use crate::protocol::{
    ContextId, DetectorStatus, Endpoint, Envelope, Message, SettingsRecord, StateSnapshot,
    StatusReport,
};
use crate::telemetry::{self, ActuationMode};

/// Mutable per-context detector state
#[derive(Debug, Clone, Default)]
pub struct DetectorState {
    /// Last status published to the coordinator
    pub status: DetectorStatus,
    /// A StateSnapshot has been applied
    pub synced: bool,
    /// When the in-flight QueryState was delivered; cleared by the reply
    pub query_sent_at: Option<Instant>,
    /// When the last StateSnapshot was applied
    pub synced_at: Option<Instant>,
    /// Pipeline started by EnabledChanged(true) or the snapshot
    pub running: bool,
    pub tap_attached: bool,
    /// Failed attach attempts since the last start
    pub setup_attempts: u32,
    /// Earliest time for the next attach attempt
    pub next_setup_at: Option<Instant>,
    /// Features of the previous window, for spectral flux
    pub previous: Option<FeatureVector>,
    /// Last volume handed to the actuator, percent
    pub last_volume: Option<f32>,
    pub windows_processed: u64,
}

pub struct Detector {
    id: ContextId,
    config: DetectorConfig,
    fade_tick: Duration,
    clock: Arc<dyn TimeSource>,
    coordinator: Endpoint,
    tap: Box<dyn AudioTap>,
    extractor: FeatureExtractor,
    smoother: DecisionSmoother,
    classifier: Box<dyn Classifier>,
    actuator: VolumeActuator,
    settings: SettingsRecord,
    state: DetectorState,
}

impl Detector {
    pub fn new(
        id: ContextId,
        config: &AppConfig,
        coordinator: Endpoint,
        tap: Box<dyn AudioTap>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let settings = SettingsRecord::default();
        Self {
            id,
            config: config.detector.clone(),
            fade_tick: config.actuator.fade_tick(),
            smoother: DecisionSmoother::new(
                config.detector.history_capacity,
                config.detector.min_samples,
            ),
            classifier: build_classifier(&settings.classifier),
            actuator: VolumeActuator::new(&config.actuator, clock.clone()),
            extractor: FeatureExtractor::new(),
            clock,
            coordinator,
            tap,
            settings,
            state: DetectorState::default(),
        }
    }

    pub fn id(&self) -> &ContextId {
        &self.id
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn fade_tick(&self) -> Duration {
        self.fade_tick
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn settings(&self) -> &SettingsRecord {
        &self.settings
    }

    pub fn smoother_state(&self) -> SmootherState {
        self.smoother.state()
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        self.classifier.kind()
    }

    pub fn actuator(&self) -> &VolumeActuator {
        &self.actuator
    }

    /// Sinks are attached through the actuator
    pub fn actuator_mut(&mut self) -> &mut VolumeActuator {
        &mut self.actuator
    }

    pub fn is_fading(&self) -> bool {
        self.actuator.is_ramping()
    }

    /// Ask the coordinator for the current state
    ///
    /// Nothing else happens until the StateSnapshot reply arrives.
    pub fn attach(&mut self) -> Result<(), ProtocolError> {
        let query = Envelope::new(self.id.clone(), Message::QueryState);
        let result = self.coordinator.deliver(query);
        self.state.query_sent_at = result.is_ok().then(|| self.clock.now());
        match (&result, self.state.synced) {
            (Ok(()), false) => tracing::info!("[Detector] {} attached, awaiting state", self.id),
            (Ok(()), true) => tracing::debug!("[Detector] {} re-querying state", self.id),
            _ => {}
        }
        result
    }

    /// Apply one message from the coordinator
    pub fn handle(&mut self, envelope: Envelope) {
        match envelope.message {
            Message::StateSnapshot(snapshot) => self.apply_snapshot(snapshot),
            message @ (Message::EnabledChanged(_) | Message::SettingsChanged(_))
                if !self.state.synced =>
            {
                tracing::debug!(
                    "[Detector] {} dropping {:?}: {}",
                    self.id,
                    message,
                    ProtocolError::NotSynced
                );
                // The coordinator is reachable, so the snapshot can still come
                if self.state.query_sent_at.is_none() {
                    self.query_state("Detector::handle");
                }
            }
            Message::EnabledChanged(enabled) => {
                self.settings.enabled = enabled;
                if enabled {
                    self.start();
                } else {
                    self.stop();
                }
            }
            Message::SettingsChanged(record) => self.apply_settings(record),
            other => {
                tracing::warn!("[Detector] {} ignoring unexpected {:?}", self.id, other);
            }
        }
    }

    /// One sampling-loop tick: state reconciliation, setup retry if needed,
    /// then at most one window
    pub fn on_sample_tick(&mut self) -> Option<SmootherOutcome> {
        if self.query_due() {
            self.query_state("Detector::on_sample_tick");
        }
        if !self.state.synced {
            return None;
        }
        if !self.state.running {
            return None;
        }
        if !self.state.tap_attached {
            if self.state.status == DetectorStatus::Unavailable {
                return None;
            }
            let due = self
                .state
                .next_setup_at
                .map_or(true, |at| self.clock.now() >= at);
            if due {
                self.try_setup();
            }
            if !self.state.tap_attached {
                return None;
            }
        }

        let window = self.tap.read_window()?;
        Some(self.process_window(&window))
    }

    /// Advance an in-flight fade
    pub fn tick_fade(&mut self) -> bool {
        self.actuator.tick()
    }

    /// Run one window through the pipeline
    pub fn process_window(&mut self, window: &AnalysisWindow) -> SmootherOutcome {
        let started = self.clock.now();

        let features = self.extractor.extract(window, self.state.previous.as_ref());
        self.state.previous = Some(features.clone());
        self.state.windows_processed += 1;

        let outcome = self.smoother.push(features, self.classifier.as_mut());
        match outcome {
            SmootherOutcome::Ignored => {}
            SmootherOutcome::Warming { collected, required } => {
                tracing::debug!("[Detector] warming up {}/{}", collected, required);
            }
            SmootherOutcome::Settled(prediction) => {
                telemetry::hub().record_classification(self.classifier.kind(), &prediction);
                tracing::info!(
                    "[Detector] {} settled on {:?} ({:.3})",
                    self.id,
                    prediction.category,
                    prediction.confidence
                );
                self.set_status(prediction.category.into());
                // Playback starts at the original volume
                if prediction.category == Category::Ad {
                    self.actuate(prediction.category);
                }
            }
            SmootherOutcome::Held(prediction) => {
                telemetry::hub().record_classification(self.classifier.kind(), &prediction);
            }
            SmootherOutcome::Changed { from, prediction } => {
                telemetry::hub().record_classification(self.classifier.kind(), &prediction);
                tracing::info!(
                    "[Detector] {} {:?} → {:?} ({:.3})",
                    self.id,
                    from,
                    prediction.category,
                    prediction.confidence
                );
                self.set_status(prediction.category.into());
                self.actuate(prediction.category);
            }
        }

        telemetry::hub().record_cycle_time(self.clock.now().saturating_duration_since(started));
        outcome
    }

    /// Stop the pipeline and release the tap
    pub fn shutdown(&mut self) {
        if self.state.running {
            self.stop();
        }
        if self.state.tap_attached {
            self.tap.detach();
            self.state.tap_attached = false;
        }
    }

    /// Whether QueryState should be (re)sent this tick
    ///
    /// An unanswered query is re-sent after `query_timeout`. Once synced the
    /// detector re-queries every `resync_interval`, so a state change it
    /// missed on a full inbox is picked up from the next snapshot.
    fn query_due(&self) -> bool {
        let now = self.clock.now();
        let elapsed = |since: Instant| now.saturating_duration_since(since);

        match (self.state.query_sent_at, self.state.synced_at) {
            (Some(sent), _) => elapsed(sent) >= self.config.query_timeout(),
            (None, None) => !self.state.synced,
            (None, Some(synced)) => self
                .config
                .resync_interval()
                .is_some_and(|interval| elapsed(synced) >= interval),
        }
    }

    fn query_state(&mut self, context: &str) {
        if self.state.query_sent_at.is_some() {
            tracing::debug!("[Detector] {} no reply to QueryState, re-sending", self.id);
        }
        if let Err(err) = self.attach() {
            log_protocol_error(&err, context);
        }
    }

    fn apply_snapshot(&mut self, snapshot: StateSnapshot) {
        let first = !self.state.synced;
        self.state.synced = true;
        self.state.query_sent_at = None;
        self.state.synced_at = Some(self.clock.now());

        let enabled = snapshot.settings.enabled;
        self.apply_settings(snapshot.settings);

        match (enabled, self.state.running) {
            (true, false) => self.start(),
            (false, true) => self.stop(),
            (false, false) if first => self.send_status(DetectorStatus::Idle),
            _ => {}
        }
    }

    fn start(&mut self) {
        if self.state.running {
            return;
        }
        tracing::info!("[Detector] {} starting", self.id);

        self.state.running = true;
        self.state.setup_attempts = 0;
        self.state.next_setup_at = None;
        self.state.previous = None;
        self.classifier = build_classifier(&self.settings.classifier);
        self.actuator.set_auto_adjust(self.settings.volume.auto_adjust);
        self.smoother.arm();
        self.set_status(DetectorStatus::Processing);

        if !self.state.tap_attached {
            self.try_setup();
        }
    }

    fn stop(&mut self) {
        if !self.state.running {
            return;
        }
        tracing::info!("[Detector] {} stopping", self.id);

        self.state.running = false;
        self.state.previous = None;
        self.state.next_setup_at = None;
        self.smoother.reset();
        self.classifier.reset();

        self.actuator.halt();
        if self.settings.volume.auto_adjust {
            let original = self.settings.volume.original_volume;
            if self.actuator.set_target(original, ActuationMode::Instant) {
                self.state.last_volume = Some(original);
            }
        }

        if self.state.tap_attached {
            self.tap.detach();
            self.state.tap_attached = false;
        }
        self.set_status(DetectorStatus::Idle);
    }

    fn try_setup(&mut self) {
        match self.tap.attach() {
            Ok(()) => {
                self.state.tap_attached = true;
                self.state.setup_attempts = 0;
                self.state.next_setup_at = None;
                tracing::info!("[Detector] {} audio tap attached", self.id);
            }
            Err(err) => {
                self.state.setup_attempts += 1;
                log_detector_error(&err, "Detector::try_setup");
                telemetry::hub().record_detector_error(&err);

                if self.state.setup_attempts >= self.config.max_setup_retries {
                    let exhausted = DetectorError::RetriesExhausted {
                        attempts: self.state.setup_attempts,
                    };
                    log_detector_error(&exhausted, "Detector::try_setup");
                    self.state.next_setup_at = None;
                    self.set_status(DetectorStatus::Unavailable);
                } else {
                    self.state.next_setup_at = Some(self.clock.now() + self.config.setup_backoff());
                }
            }
        }
    }

    /// Store a new record; side effects only while running
    fn apply_settings(&mut self, record: SettingsRecord) {
        let previous = std::mem::replace(&mut self.settings, record.normalized());
        if !self.state.running {
            tracing::debug!("[Detector] {} idle, settings stored", self.id);
            return;
        }

        if kind_of(&self.settings.classifier) != self.classifier.kind() {
            tracing::info!(
                "[Detector] {} switching classifier to {:?}",
                self.id,
                kind_of(&self.settings.classifier)
            );
            self.classifier = build_classifier(&self.settings.classifier);
        } else {
            self.classifier.reconfigure(&self.settings.classifier);
        }

        let volume = &self.settings.volume;
        self.actuator.set_auto_adjust(volume.auto_adjust);

        if let Some(category) = self.smoother.category() {
            let target_moved = previous.volume.volume_for(category) != volume.volume_for(category);
            let resumed = volume.auto_adjust && !previous.volume.auto_adjust;
            if target_moved || resumed {
                self.actuate(category);
            }
        }
    }

    fn actuate(&mut self, category: Category) {
        let volume = &self.settings.volume;
        if !volume.auto_adjust {
            tracing::debug!("[Detector] auto adjust off, leaving volume alone");
            return;
        }
        let target = volume.volume_for(category);
        let mode = if volume.fade_transitions {
            ActuationMode::Fade
        } else {
            ActuationMode::Instant
        };
        if self.actuator.set_target(target, mode) {
            self.state.last_volume = Some(target);
        }
    }

    fn set_status(&mut self, status: DetectorStatus) {
        if self.state.status == status {
            return;
        }
        self.send_status(status);
    }

    fn send_status(&mut self, status: DetectorStatus) {
        self.state.status = status;
        telemetry::hub().record_status(&self.id, status);

        let report = StatusReport {
            detector: self.id.clone(),
            status,
        };
        let envelope = Envelope::new(self.id.clone(), Message::StatusChanged(report));
        if let Err(err) = self.coordinator.deliver(envelope) {
            log_protocol_error(&err, "Detector::send_status");
            telemetry::hub().record_delivery_failure(&self.coordinator.id, &err);
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
