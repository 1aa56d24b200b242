//! Audio tap abstraction.
//!
//! The host's audio graph owns the tap; the detector only asks it to attach,
//! detach, and hand over one window per sampling tick.

use std::collections::VecDeque;

use crate::analysis::AnalysisWindow;
use crate::error::DetectorError;

/// Source of analysis windows for one playback context.
pub trait AudioTap: Send {
    /// Connect to the playback source; `NoPlaybackSource` while none exists
    fn attach(&mut self) -> Result<(), DetectorError>;

    fn detach(&mut self);

    /// Window for the current tick, or None when nothing is ready
    fn read_window(&mut self) -> Option<AnalysisWindow>;
}

/// Tap that plays back a prepared sequence of windows.
///
/// Used for offline replay and deterministic tests. `unavailable_attempts`
/// simulates a page whose media element appears late.
pub struct ReplayTap {
    windows: VecDeque<AnalysisWindow>,
    unavailable_attempts: u32,
    attach_calls: u32,
    attached: bool,
}

impl ReplayTap {
    pub fn new(windows: impl IntoIterator<Item = AnalysisWindow>) -> Self {
        Self {
            windows: windows.into_iter().collect(),
            unavailable_attempts: 0,
            attach_calls: 0,
            attached: false,
        }
    }

    /// Fail the first `attempts` attach calls with `NoPlaybackSource`
    pub fn unavailable_for(mut self, attempts: u32) -> Self {
        self.unavailable_attempts = attempts;
        self
    }

    pub fn push(&mut self, window: AnalysisWindow) {
        self.windows.push_back(window);
    }

    pub fn remaining(&self) -> usize {
        self.windows.len()
    }

    pub fn attach_calls(&self) -> u32 {
        self.attach_calls
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

impl AudioTap for ReplayTap {
    fn attach(&mut self) -> Result<(), DetectorError> {
        self.attach_calls += 1;
        if self.attach_calls <= self.unavailable_attempts {
            return Err(DetectorError::NoPlaybackSource);
        }
        self.attached = true;
        Ok(())
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn read_window(&mut self) -> Option<AnalysisWindow> {
        if !self.attached {
            return None;
        }
        self.windows.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_tap_fails_then_attaches() {
        let mut tap = ReplayTap::new([AnalysisWindow::new(0, vec![0.0; 4], vec![0.0; 4])])
            .unavailable_for(2);

        assert_eq!(tap.attach(), Err(DetectorError::NoPlaybackSource));
        assert_eq!(tap.attach(), Err(DetectorError::NoPlaybackSource));
        assert!(tap.attach().is_ok());
        assert_eq!(tap.attach_calls(), 3);
        assert!(tap.read_window().is_some());
        assert!(tap.read_window().is_none());
    }

    #[test]
    fn test_detached_tap_yields_nothing() {
        let mut tap = ReplayTap::new([AnalysisWindow::new(0, vec![0.0; 4], vec![0.0; 4])]);
        assert!(tap.read_window().is_none());
        assert_eq!(tap.remaining(), 1);
    }
}
