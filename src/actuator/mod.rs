// VolumeActuator - applies category volumes to the playback sinks
//
// Volumes cross this boundary in percent ([0, 100]) and are clamped before
// conversion to the sinks' native [0, 1] range. Two modes:
// - Instant: written synchronously inside `set_target`
// - Fade: an eased FadeRamp advanced by `tick()` on each rendering tick
//
// A new target supersedes any in-flight ramp; the new ramp starts from each
// sink's live volume. Ramps are never queued.

mod ramp;
mod sink;

pub use ramp::{ease_out, FadeRamp};
pub use sink::{MemorySink, PlaybackSink};

use std::sync::Arc;
use std::time::Duration;

use crate::clock::TimeSource;
use crate::config::ActuatorConfig;
use crate::protocol::settings::clamp_volume;
use crate::telemetry::{self, events::ActuationMode};

/// Handle returned by `attach_sink`, used to detach it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkHandle(u64);

pub struct VolumeActuator {
    sinks: Vec<(u64, Arc<dyn PlaybackSink>)>,
    next_slot: u64,
    clock: Arc<dyn TimeSource>,
    fade_duration: Duration,
    auto_adjust: bool,
    ramp: Option<FadeRamp>,
    /// Last accepted target, percent
    last_target: Option<f32>,
}

impl VolumeActuator {
    pub fn new(config: &ActuatorConfig, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            sinks: Vec::new(),
            next_slot: 0,
            clock,
            fade_duration: config.fade_duration(),
            auto_adjust: true,
            ramp: None,
            last_target: None,
        }
    }

    pub fn attach_sink(&mut self, sink: Arc<dyn PlaybackSink>) -> SinkHandle {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.sinks.push((slot, sink));
        SinkHandle(slot)
    }

    pub fn detach_sink(&mut self, handle: SinkHandle) {
        self.sinks.retain(|(slot, _)| *slot != handle.0);
        if let Some(ramp) = self.ramp.as_mut() {
            ramp.forget(handle.0);
        }
        if self.sinks.is_empty() {
            self.ramp = None;
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn auto_adjust(&self) -> bool {
        self.auto_adjust
    }

    /// Gate actuation; disabling halts any in-flight ramp where it stands
    pub fn set_auto_adjust(&mut self, enabled: bool) {
        if self.auto_adjust && !enabled {
            self.halt();
        }
        self.auto_adjust = enabled;
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp.is_some()
    }

    pub fn last_target(&self) -> Option<f32> {
        self.last_target
    }

    /// Live volume of the first attached sink, percent
    pub fn current_volume(&self) -> Option<f32> {
        self.sinks.first().map(|(_, sink)| sink.volume() * 100.0)
    }

    /// Request `volume` (percent) on every sink
    ///
    /// Returns false without touching anything when auto-adjust is off or no
    /// sink is attached.
    pub fn set_target(&mut self, volume: f32, mode: ActuationMode) -> bool {
        if !self.auto_adjust || self.sinks.is_empty() {
            tracing::debug!(
                "[Actuator] set_target({:.1}) suppressed (auto_adjust={}, sinks={})",
                volume,
                self.auto_adjust,
                self.sinks.len()
            );
            return false;
        }

        let volume = clamp_volume(volume);
        let native = volume / 100.0;
        self.last_target = Some(volume);
        telemetry::hub().record_actuation(volume, mode);

        match mode {
            ActuationMode::Instant => {
                self.ramp = None;
                for (_, sink) in &self.sinks {
                    sink.set_volume(native);
                }
                tracing::info!("[Actuator] volume set to {:.1}", volume);
            }
            ActuationMode::Fade => {
                let starts = self
                    .sinks
                    .iter()
                    .map(|(slot, sink)| (*slot, sink.volume()))
                    .collect();
                if self.ramp.is_some() {
                    tracing::debug!("[Actuator] superseding in-flight fade");
                }
                self.ramp = Some(FadeRamp::new(
                    starts,
                    native,
                    self.clock.now(),
                    self.fade_duration,
                ));
                tracing::info!(
                    "[Actuator] fading to {:.1} over {}ms",
                    volume,
                    self.fade_duration.as_millis()
                );
                self.tick();
            }
        }
        true
    }

    /// Advance the in-flight ramp; returns true while it is still running
    pub fn tick(&mut self) -> bool {
        let Some(ramp) = self.ramp.as_ref() else {
            return false;
        };
        let now = self.clock.now();

        for (slot, value) in ramp.sample(now) {
            if let Some((_, sink)) = self.sinks.iter().find(|(s, _)| *s == slot) {
                sink.set_volume(value);
            }
        }

        if ramp.is_complete(now) {
            self.ramp = None;
            false
        } else {
            true
        }
    }

    /// Drop the in-flight ramp, leaving sinks at their current volume
    pub fn halt(&mut self) {
        if self.ramp.take().is_some() {
            tracing::debug!("[Actuator] fade halted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;

    fn actuator_with_sink(initial: f32) -> (VolumeActuator, Arc<MemorySink>, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new());
        let mut actuator = VolumeActuator::new(&ActuatorConfig::default(), clock.clone());
        let sink = Arc::new(MemorySink::new(initial));
        actuator.attach_sink(sink.clone());
        (actuator, sink, clock)
    }

    #[test]
    fn test_instant_applies_synchronously() {
        let (mut actuator, sink, _) = actuator_with_sink(1.0);
        assert!(actuator.set_target(30.0, ActuationMode::Instant));
        assert!((sink.volume() - 0.3).abs() < 1e-6);
        assert!(!actuator.is_ramping());
    }

    #[test]
    fn test_target_is_clamped_at_boundary() {
        let (mut actuator, sink, _) = actuator_with_sink(0.5);
        actuator.set_target(150.0, ActuationMode::Instant);
        assert_eq!(sink.volume(), 1.0);
        actuator.set_target(-20.0, ActuationMode::Instant);
        assert_eq!(sink.volume(), 0.0);
    }

    #[test]
    fn test_fade_is_monotonic_without_overshoot() {
        let (mut actuator, sink, clock) = actuator_with_sink(0.75);
        actuator.set_target(25.0, ActuationMode::Fade);

        let mut ticks = 0;
        while actuator.tick() {
            clock.advance(Duration::from_millis(16));
            ticks += 1;
            assert!(ticks < 100, "fade never completed");
        }

        let writes = sink.writes();
        assert!(writes.windows(2).all(|w| w[1] <= w[0]), "{:?}", writes);
        assert!(writes.iter().all(|&v| (0.25..=0.75).contains(&v)));
        assert_eq!(sink.volume(), 0.25);
        // 500ms at 16ms per tick
        assert!(ticks <= 32);
    }

    #[test]
    fn test_fade_completes_within_duration() {
        let (mut actuator, sink, clock) = actuator_with_sink(0.75);
        actuator.set_target(25.0, ActuationMode::Fade);
        clock.advance(Duration::from_millis(500));
        assert!(!actuator.tick());
        assert_eq!(sink.volume(), 0.25);
    }

    #[test]
    fn test_new_target_supersedes_from_live_volume() {
        let (mut actuator, sink, clock) = actuator_with_sink(1.0);
        actuator.set_target(0.0, ActuationMode::Fade);
        clock.advance(Duration::from_millis(250));
        actuator.tick();
        let live = sink.volume();
        assert!(live < 1.0 && live > 0.0);

        actuator.set_target(100.0, ActuationMode::Fade);
        // The new ramp starts where the old one left off
        assert!((sink.volume() - live).abs() < 1e-6);

        clock.advance(Duration::from_millis(500));
        actuator.tick();
        assert_eq!(sink.volume(), 1.0);
    }

    #[test]
    fn test_instant_cancels_fade() {
        let (mut actuator, sink, clock) = actuator_with_sink(1.0);
        actuator.set_target(30.0, ActuationMode::Fade);
        clock.advance(Duration::from_millis(100));
        actuator.tick();

        actuator.set_target(100.0, ActuationMode::Instant);
        assert!(!actuator.is_ramping());
        clock.advance(Duration::from_millis(500));
        actuator.tick();
        assert_eq!(sink.volume(), 1.0);
    }

    #[test]
    fn test_suppressed_when_auto_adjust_off() {
        let (mut actuator, sink, _) = actuator_with_sink(0.8);
        actuator.set_auto_adjust(false);
        assert!(!actuator.set_target(10.0, ActuationMode::Instant));
        assert_eq!(sink.write_count(), 0);
        assert_eq!(actuator.last_target(), None);
    }

    #[test]
    fn test_no_sink_is_noop() {
        let clock = Arc::new(ManualTimeSource::new());
        let mut actuator = VolumeActuator::new(&ActuatorConfig::default(), clock);
        assert!(!actuator.set_target(50.0, ActuationMode::Fade));
        assert!(!actuator.is_ramping());
    }

    #[test]
    fn test_disabling_auto_adjust_halts_ramp() {
        let (mut actuator, sink, clock) = actuator_with_sink(1.0);
        actuator.set_target(0.0, ActuationMode::Fade);
        clock.advance(Duration::from_millis(100));
        actuator.tick();
        let held = sink.volume();

        actuator.set_auto_adjust(false);
        clock.advance(Duration::from_millis(500));
        assert!(!actuator.tick());
        assert_eq!(sink.volume(), held);
    }

    #[test]
    fn test_detach_sink_stops_writes() {
        let (mut actuator, sink, _) = actuator_with_sink(1.0);
        let other = Arc::new(MemorySink::new(1.0));
        let handle = actuator.attach_sink(other.clone());
        actuator.detach_sink(handle);

        actuator.set_target(40.0, ActuationMode::Instant);
        assert!((sink.volume() - 0.4).abs() < 1e-6);
        assert_eq!(other.write_count(), 0);
    }
}
