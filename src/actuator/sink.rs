//! Playback sinks the actuator writes to.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Volume control exposed by the host's playback pipeline.
///
/// Volumes are in the sink's native [0, 1] range. The actuator is the sole
/// writer while actuation is enabled.
pub trait PlaybackSink: Send + Sync {
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
}

/// In-memory sink that records every write.
///
/// Used by tests and the offline `replay` command.
pub struct MemorySink {
    volume_bits: AtomicU32,
    writes: Mutex<Vec<f32>>,
}

impl MemorySink {
    pub fn new(initial: f32) -> Self {
        Self {
            volume_bits: AtomicU32::new(initial.clamp(0.0, 1.0).to_bits()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Every value written so far, oldest first
    pub fn writes(&self) -> Vec<f32> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl PlaybackSink for MemorySink {
    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::SeqCst);
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(volume);
    }
}
