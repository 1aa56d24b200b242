// AnalysisWindow - one sampled slice of the playing stream

use serde::{Deserialize, Serialize};

use super::features::fft::{FftProcessor, FFT_SIZE};

/// One fixed-duration slice of audio as delivered by the audio tap
///
/// `magnitudes` are normalized frequency-domain magnitudes in [0, 1];
/// `samples` are normalized time-domain samples in [-1, 1]. Both are expected
/// to have the same power-of-two length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub timestamp_ms: u64,
    pub magnitudes: Vec<f32>,
    pub samples: Vec<f32>,
}

impl AnalysisWindow {
    pub fn new(timestamp_ms: u64, magnitudes: Vec<f32>, samples: Vec<f32>) -> Self {
        Self {
            timestamp_ms,
            magnitudes,
            samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty() && self.samples.is_empty()
    }

    /// Index of the first non-finite value, if any
    pub(crate) fn first_non_finite(&self) -> Option<(&'static str, usize)> {
        if let Some(i) = self.magnitudes.iter().position(|v| !v.is_finite()) {
            return Some(("magnitudes", i));
        }
        self.samples
            .iter()
            .position(|v| !v.is_finite())
            .map(|i| ("samples", i))
    }
}

/// Builds analysis windows from raw mono PCM
///
/// Each window uses the FFT_SIZE samples starting at the requested offset;
/// the time-domain half keeps the first FFT_SIZE / 2 of them so both
/// sequences share one length.
pub struct WindowBuilder {
    fft: FftProcessor,
}

impl WindowBuilder {
    pub fn new() -> Self {
        Self {
            fft: FftProcessor::new(FFT_SIZE),
        }
    }

    /// Samples consumed per window
    pub fn frame_len(&self) -> usize {
        FFT_SIZE
    }

    pub fn from_pcm(&self, pcm: &[f32], timestamp_ms: u64) -> AnalysisWindow {
        let frame = &pcm[..pcm.len().min(FFT_SIZE)];
        let magnitudes = self.fft.normalized_spectrum(frame);
        let bins = self.fft.bin_count();
        let samples = (0..bins)
            .map(|i| frame.get(i).copied().unwrap_or(0.0).clamp(-1.0, 1.0))
            .collect();

        AnalysisWindow::new(timestamp_ms, magnitudes, samples)
    }
}

impl Default for WindowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
