// FadeRamp - eased volume transition sampled on rendering ticks
//
// value(t) = start + (target - start) · ease(t / duration)
// ease(p)  = p · (2 - p)
//
// ease is monotonic on [0, 1] with ease(0) = 0 and ease(1) = 1, so a ramp
// never overshoots its target.

use std::time::{Duration, Instant};

/// Quadratic ease-out
#[inline]
pub fn ease_out(progress: f32) -> f32 {
    let p = progress.clamp(0.0, 1.0);
    p * (2.0 - p)
}

/// One in-flight fade toward a single target
#[derive(Debug, Clone)]
pub struct FadeRamp {
    /// (sink slot, start volume) in native [0, 1] units
    starts: Vec<(u64, f32)>,
    target: f32,
    started_at: Instant,
    duration: Duration,
}

impl FadeRamp {
    pub fn new(starts: Vec<(u64, f32)>, target: f32, started_at: Instant, duration: Duration) -> Self {
        Self {
            starts,
            target,
            started_at,
            duration,
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Linear progress in [0, 1] at `now`
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    /// Volume for each sink slot at `now`; exactly the target once complete
    pub fn sample(&self, now: Instant) -> impl Iterator<Item = (u64, f32)> + '_ {
        let progress = self.progress(now);
        let eased = ease_out(progress);
        self.starts.iter().map(move |&(slot, start)| {
            let value = if progress >= 1.0 {
                self.target
            } else {
                start + (self.target - start) * eased
            };
            (slot, value)
        })
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }

    /// Stop tracking a detached sink
    pub fn forget(&mut self, slot: u64) {
        self.starts.retain(|&(s, _)| s != slot);
    }
}
