use super::*;
use crate::actuator::{MemorySink, PlaybackSink};
use crate::analysis::classifier::{HeuristicParams, LinearModelParams};
use crate::analysis::features::FEATURE_COUNT;
use crate::clock::ManualTimeSource;
use crate::protocol::settings::ClassifierParams;
use tokio::sync::mpsc;

const PROGRAM_BIN: usize = 1;
const AD_BIN: usize = 6;

struct Harness {
    detector: Detector,
    coordinator_rx: mpsc::Receiver<Envelope>,
    sink: Arc<MemorySink>,
    clock: Arc<ManualTimeSource>,
}

/// Detector wired to a manual clock, an inspectable sink, and a bare inbox
/// standing in for the coordinator
fn harness(tap: ReplayTap) -> Harness {
    let clock = Arc::new(ManualTimeSource::new());
    let (coordinator, coordinator_rx) = Endpoint::channel(ContextId::coordinator(), 64);
    let mut detector = Detector::new(
        ContextId::new("tab-1"),
        &AppConfig::default(),
        coordinator,
        Box::new(tap),
        clock.clone(),
    );
    let sink = Arc::new(MemorySink::new(1.0));
    detector.actuator_mut().attach_sink(sink.clone());
    Harness {
        detector,
        coordinator_rx,
        sink,
        clock,
    }
}

/// Single-peak window; the spectral centroid equals `bin`
fn window(timestamp_ms: u64, bin: usize) -> AnalysisWindow {
    let mut magnitudes = vec![0.0; 8];
    magnitudes[bin] = 0.5;
    AnalysisWindow::new(
        timestamp_ms,
        magnitudes,
        vec![0.1, -0.1, 0.1, -0.1, 0.1, -0.1, 0.1, -0.1],
    )
}

fn windows(bins: &[usize]) -> Vec<AnalysisWindow> {
    bins.iter()
        .enumerate()
        .map(|(i, &bin)| window(i as u64 * 1000, bin))
        .collect()
}

/// Linear model that calls Ad when the centroid is above bin 3.5
fn centroid_model() -> ClassifierParams {
    let mut coefficients = vec![0.0; FEATURE_COUNT];
    coefficients[0] = 1.0;
    let mut scaler_mean = vec![0.0; FEATURE_COUNT];
    scaler_mean[0] = 3.5;
    ClassifierParams::LogisticRegression(LinearModelParams {
        coefficients,
        scaler_mean,
        ..LinearModelParams::default()
    })
}

fn settings(enabled: bool, fade: bool) -> SettingsRecord {
    let mut record = SettingsRecord {
        enabled,
        ..SettingsRecord::default()
    };
    record.classifier.params = centroid_model();
    record.volume.fade_transitions = fade;
    record
}

fn from_coordinator(message: Message) -> Envelope {
    Envelope::new(ContextId::coordinator(), message)
}

fn snapshot(record: SettingsRecord) -> Envelope {
    from_coordinator(Message::StateSnapshot(StateSnapshot {
        settings: record,
        statuses: Vec::new(),
    }))
}

fn drain_statuses(rx: &mut mpsc::Receiver<Envelope>) -> Vec<DetectorStatus> {
    let mut statuses = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        if let Message::StatusChanged(report) = envelope.message {
            statuses.push(report.status);
        }
    }
    statuses
}

fn run_ticks(detector: &mut Detector, ticks: usize) {
    for _ in 0..ticks {
        detector.on_sample_tick();
    }
}

#[test]
fn test_attach_queries_state_and_waits() {
    let mut h = harness(ReplayTap::new(windows(&[AD_BIN; 3])));
    h.detector.attach().unwrap();
    assert_eq!(h.coordinator_rx.try_recv().unwrap().message, Message::QueryState);

    // Not synced: enable is ignored and ticks do nothing
    h.detector.handle(from_coordinator(Message::EnabledChanged(true)));
    run_ticks(&mut h.detector, 3);

    assert!(!h.detector.state().running);
    assert_eq!(h.detector.smoother_state(), SmootherState::Idle);
    assert_eq!(h.sink.write_count(), 0);
}

#[test]
fn test_disabled_snapshot_reports_idle() {
    let mut h = harness(ReplayTap::new(Vec::new()));
    h.detector.handle(snapshot(settings(false, false)));

    assert!(h.detector.state().synced);
    assert!(!h.detector.state().running);
    assert_eq!(drain_statuses(&mut h.coordinator_rx), vec![DetectorStatus::Idle]);
}

#[test]
fn test_settles_on_ad_after_min_samples() {
    let mut h = harness(ReplayTap::new(windows(&[AD_BIN; 3])));
    h.detector.handle(snapshot(settings(true, false)));
    assert_eq!(h.detector.classifier_kind(), ClassifierKind::LinearModel);

    run_ticks(&mut h.detector, 2);
    assert_eq!(h.detector.smoother_state(), SmootherState::Armed);
    assert_eq!(h.sink.write_count(), 0);

    run_ticks(&mut h.detector, 1);
    assert_eq!(h.detector.smoother_state(), SmootherState::Stable(Category::Ad));
    assert!((h.sink.volume() - 0.3).abs() < 1e-6);
    assert_eq!(h.detector.state().last_volume, Some(30.0));
    assert_eq!(
        drain_statuses(&mut h.coordinator_rx),
        vec![DetectorStatus::Processing, DetectorStatus::Ad]
    );
}

#[test]
fn test_settling_on_program_leaves_volume_alone() {
    let mut h = harness(ReplayTap::new(windows(&[PROGRAM_BIN; 4])));
    h.detector.handle(snapshot(settings(true, false)));
    run_ticks(&mut h.detector, 4);

    assert_eq!(
        h.detector.smoother_state(),
        SmootherState::Stable(Category::Program)
    );
    assert_eq!(h.sink.write_count(), 0);
    assert_eq!(
        drain_statuses(&mut h.coordinator_rx),
        vec![DetectorStatus::Processing, DetectorStatus::Program]
    );
}

#[test]
fn test_flip_to_ad_fades_down() {
    let mut h = harness(ReplayTap::new(windows(&[
        PROGRAM_BIN,
        PROGRAM_BIN,
        PROGRAM_BIN,
        AD_BIN,
    ])));
    h.detector.handle(snapshot(settings(true, true)));
    run_ticks(&mut h.detector, 4);

    assert!(h.detector.is_fading());
    let mut guard = 0;
    while h.detector.tick_fade() {
        h.clock.advance(Duration::from_millis(16));
        guard += 1;
        assert!(guard < 100);
    }
    assert!((h.sink.volume() - 0.3).abs() < 1e-6);

    let writes = h.sink.writes();
    assert!(writes.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn test_auto_adjust_off_never_touches_sink() {
    let mut record = settings(true, false);
    record.volume.auto_adjust = false;
    let mut h = harness(ReplayTap::new(windows(&[
        PROGRAM_BIN,
        PROGRAM_BIN,
        PROGRAM_BIN,
        AD_BIN,
        PROGRAM_BIN,
    ])));
    h.detector.handle(snapshot(record));
    run_ticks(&mut h.detector, 5);

    // Classification still runs and is reported
    assert_eq!(
        drain_statuses(&mut h.coordinator_rx),
        vec![
            DetectorStatus::Processing,
            DetectorStatus::Program,
            DetectorStatus::Ad,
            DetectorStatus::Program
        ]
    );
    assert_eq!(h.sink.write_count(), 0);
    assert_eq!(h.detector.actuator().last_target(), None);
}

#[test]
fn test_disable_while_ad_restores_original_instantly() {
    let mut h = harness(ReplayTap::new(windows(&[
        PROGRAM_BIN,
        PROGRAM_BIN,
        PROGRAM_BIN,
        AD_BIN,
    ])));
    h.detector.handle(snapshot(settings(true, true)));
    run_ticks(&mut h.detector, 4);
    h.clock.advance(Duration::from_millis(250));
    h.detector.tick_fade();
    assert!(h.sink.volume() < 1.0);

    h.detector.handle(from_coordinator(Message::EnabledChanged(false)));

    assert_eq!(h.detector.smoother_state(), SmootherState::Idle);
    assert!(!h.detector.is_fading());
    assert_eq!(h.sink.volume(), 1.0);
    assert_eq!(h.detector.state().status, DetectorStatus::Idle);
    assert!(h.detector.state().previous.is_none());
}

#[test]
fn test_settings_change_keeps_stable_state() {
    let mut h = harness(ReplayTap::new(windows(&[AD_BIN; 4])));
    h.detector.handle(snapshot(settings(true, false)));
    run_ticks(&mut h.detector, 3);
    assert!((h.sink.volume() - 0.3).abs() < 1e-6);
    drain_statuses(&mut h.coordinator_rx);

    let mut record = h.detector.settings().clone();
    record.volume.reduced_volume = 10.0;
    h.detector
        .handle(from_coordinator(Message::SettingsChanged(record.clone())));

    assert_eq!(h.detector.smoother_state(), SmootherState::Stable(Category::Ad));
    assert!((h.sink.volume() - 0.1).abs() < 1e-6);

    // Switching classifier variant keeps the public state too
    record.classifier.params = ClassifierParams::SimpleRules(HeuristicParams::default());
    h.detector
        .handle(from_coordinator(Message::SettingsChanged(record)));
    assert_eq!(h.detector.classifier_kind(), ClassifierKind::Heuristic);
    assert_eq!(h.detector.smoother_state(), SmootherState::Stable(Category::Ad));
    assert!(drain_statuses(&mut h.coordinator_rx).is_empty());
}

#[test]
fn test_settings_while_idle_are_stored_without_side_effects() {
    let mut h = harness(ReplayTap::new(windows(&[AD_BIN; 3])));
    h.detector.handle(snapshot(settings(false, false)));
    drain_statuses(&mut h.coordinator_rx);

    let mut record = settings(false, true);
    record.volume.original_volume = 60.0;
    h.detector
        .handle(from_coordinator(Message::SettingsChanged(record)));

    assert_eq!(h.detector.settings().volume.original_volume, 60.0);
    assert_eq!(h.sink.write_count(), 0);
    assert!(drain_statuses(&mut h.coordinator_rx).is_empty());

    // Applied on the next start
    h.detector.handle(from_coordinator(Message::EnabledChanged(true)));
    h.detector.handle(from_coordinator(Message::EnabledChanged(false)));
    assert!((h.sink.volume() - 0.6).abs() < 1e-6);
}

#[test]
fn test_setup_retries_on_backoff() {
    let tap = ReplayTap::new(windows(&[AD_BIN; 3])).unavailable_for(2);
    let mut h = harness(tap);
    h.detector.handle(snapshot(settings(true, false)));
    assert_eq!(h.detector.state().setup_attempts, 1);
    assert!(!h.detector.state().tap_attached);

    // Backoff not elapsed
    h.clock.advance(Duration::from_millis(1000));
    h.detector.on_sample_tick();
    assert_eq!(h.detector.state().setup_attempts, 1);

    h.clock.advance(Duration::from_millis(1000));
    h.detector.on_sample_tick();
    assert_eq!(h.detector.state().setup_attempts, 2);

    h.clock.advance(Duration::from_millis(2000));
    let outcome = h.detector.on_sample_tick();
    assert!(h.detector.state().tap_attached);
    assert!(matches!(outcome, Some(SmootherOutcome::Warming { .. })));
    assert_eq!(h.detector.state().status, DetectorStatus::Processing);
}

#[test]
fn test_setup_gives_up_as_unavailable() {
    let tap = ReplayTap::new(Vec::new()).unavailable_for(u32::MAX);
    let mut h = harness(tap);
    h.detector.handle(snapshot(settings(true, false)));

    for _ in 0..10 {
        h.clock.advance(Duration::from_millis(2000));
        h.detector.on_sample_tick();
    }

    let max = AppConfig::default().detector.max_setup_retries;
    assert_eq!(h.detector.state().setup_attempts, max);
    assert_eq!(
        drain_statuses(&mut h.coordinator_rx),
        vec![DetectorStatus::Processing, DetectorStatus::Unavailable]
    );

    // Re-enabling starts a fresh round of attempts
    h.detector.handle(from_coordinator(Message::EnabledChanged(false)));
    h.detector.handle(from_coordinator(Message::EnabledChanged(true)));
    assert_eq!(h.detector.state().setup_attempts, 1);
}

#[test]
fn test_malformed_window_is_recovered() {
    let mut bad = window(0, AD_BIN);
    bad.magnitudes[2] = f32::NAN;
    let mut tap = ReplayTap::new(vec![bad]);
    tap.push(window(1000, AD_BIN));
    let mut h = harness(tap);
    h.detector.handle(snapshot(settings(true, false)));

    run_ticks(&mut h.detector, 2);
    assert_eq!(h.detector.state().windows_processed, 2);
    assert_eq!(h.detector.smoother_state(), SmootherState::Armed);
}

#[test]
fn test_shutdown_detaches_and_goes_idle() {
    let mut h = harness(ReplayTap::new(windows(&[AD_BIN; 3])));
    h.detector.handle(snapshot(settings(true, false)));
    run_ticks(&mut h.detector, 3);

    h.detector.shutdown();
    assert!(!h.detector.state().running);
    assert!(!h.detector.state().tap_attached);
    assert_eq!(h.sink.volume(), 1.0);
}

fn count_queries(rx: &mut mpsc::Receiver<Envelope>) -> usize {
    std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|envelope| envelope.message == Message::QueryState)
        .count()
}

fn tick_seconds(h: &mut Harness, seconds: usize) {
    for _ in 0..seconds {
        h.clock.advance(Duration::from_millis(1000));
        h.detector.on_sample_tick();
    }
}

#[test]
fn test_unanswered_query_is_resent_after_timeout() {
    let mut h = harness(ReplayTap::new(windows(&[AD_BIN; 3])));
    h.detector.attach().unwrap();
    assert_eq!(count_queries(&mut h.coordinator_rx), 1);

    tick_seconds(&mut h, 1);
    assert_eq!(count_queries(&mut h.coordinator_rx), 0);

    // 2s query timeout
    tick_seconds(&mut h, 1);
    assert_eq!(count_queries(&mut h.coordinator_rx), 1);
    tick_seconds(&mut h, 4);
    assert_eq!(count_queries(&mut h.coordinator_rx), 2);
    assert!(!h.detector.state().synced);

    // A late reply still syncs and starts the pipeline
    h.detector.handle(snapshot(settings(true, false)));
    assert!(h.detector.state().synced);
    assert!(h.detector.state().running);
    assert_eq!(h.detector.state().query_sent_at, None);
}

#[test]
fn test_state_message_while_unsynced_requests_snapshot() {
    let mut h = harness(ReplayTap::new(Vec::new()));

    h.detector.handle(from_coordinator(Message::EnabledChanged(true)));

    assert!(!h.detector.state().running);
    assert_eq!(count_queries(&mut h.coordinator_rx), 1);
    assert!(h.detector.state().query_sent_at.is_some());
}

#[test]
fn test_periodic_resync_recovers_missed_disable() {
    let mut h = harness(ReplayTap::new(windows(&[AD_BIN; 40])));
    h.detector.handle(snapshot(settings(true, false)));
    tick_seconds(&mut h, 3);
    assert_eq!(h.detector.smoother_state(), SmootherState::Stable(Category::Ad));
    assert!((h.sink.volume() - 0.3).abs() < 1e-6);
    drain_statuses(&mut h.coordinator_rx);

    // EnabledChanged(false) never arrived; the 30s resync asks again
    tick_seconds(&mut h, 26);
    assert_eq!(count_queries(&mut h.coordinator_rx), 0);
    tick_seconds(&mut h, 1);
    assert_eq!(count_queries(&mut h.coordinator_rx), 1);

    h.detector.handle(snapshot(settings(false, false)));

    assert!(!h.detector.state().running);
    assert_eq!(h.detector.state().status, DetectorStatus::Idle);
    assert_eq!(h.sink.volume(), 1.0);
}

#[test]
fn test_resync_can_be_disabled() {
    let clock = Arc::new(ManualTimeSource::new());
    let (coordinator, mut coordinator_rx) = Endpoint::channel(ContextId::coordinator(), 64);
    let mut config = AppConfig::default();
    config.detector.resync_interval_ms = 0;
    let mut detector = Detector::new(
        ContextId::new("tab-1"),
        &config,
        coordinator,
        Box::new(ReplayTap::new(Vec::new())),
        clock.clone(),
    );
    detector.handle(snapshot(settings(false, false)));

    for _ in 0..120 {
        clock.advance(Duration::from_millis(1000));
        detector.on_sample_tick();
    }
    assert_eq!(count_queries(&mut coordinator_rx), 0);
}
