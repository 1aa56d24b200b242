// FeatureExtractor - per-window acoustic features for ad/program classification
//
// This module turns one AnalysisWindow into a FeatureVector. Features are
// computed from the normalized magnitudes and time-domain samples delivered by
// the audio tap.
//
// Module organization:
// - types: FeatureVector and the canonical feature order
// - fft: magnitude spectra for windows built from raw PCM
// - spectral: frequency-domain features
// - temporal: time-domain features (ZCR, RMS)
// - mod.rs: Coordinator (FeatureExtractor)
//
// Features extracted:
//  1. Spectral centroid, rolloff, bandwidth
//  2. Spectral flux against the previous window
//  3. Energy and energy entropy
//  4. Zero-crossing rate and RMS
//  5. Peak magnitude, magnitude variance, harmonic ratio
//
// The previous window is threaded in explicitly; the extractor keeps no
// per-stream state of its own.

pub(crate) mod fft;
mod spectral;
mod temporal;
mod types;

pub use types::{finite_or_zero, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

use crate::analysis::window::AnalysisWindow;
use crate::error::{log_detector_error, DetectorError};
use crate::telemetry;

/// FeatureExtractor computes FeatureVectors from analysis windows
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract all features from an analysis window
    ///
    /// `previous` is the vector extracted from the preceding window of the same
    /// stream; without it, spectral flux and harmonic ratio are 0.
    ///
    /// Never fails: empty windows yield a zero-valued vector, and windows with
    /// non-finite values are logged and replaced by a zero-valued vector that
    /// carries the previous window's magnitudes forward.
    pub fn extract(&self, window: &AnalysisWindow, previous: Option<&FeatureVector>) -> FeatureVector {
        match self.try_extract(window, previous) {
            Ok(features) => features,
            Err(err) => {
                log_detector_error(&err, "FeatureExtractor::extract");
                telemetry::hub().record_detector_error(&err);
                // Flux of the next window is measured against the last good spectrum
                let mut features = FeatureVector::zeroed(window.timestamp_ms);
                if let Some(prev) = previous {
                    features.magnitudes = prev.magnitudes.clone();
                }
                features
            }
        }
    }

    fn try_extract(
        &self,
        window: &AnalysisWindow,
        previous: Option<&FeatureVector>,
    ) -> Result<FeatureVector, DetectorError> {
        if window.magnitudes.is_empty() || window.samples.is_empty() {
            return Ok(FeatureVector::zeroed(window.timestamp_ms));
        }

        if let Some((field, index)) = window.first_non_finite() {
            return Err(DetectorError::MalformedWindow {
                reason: format!("non-finite value in {} at index {}", field, index),
            });
        }

        let m = &window.magnitudes;
        let magnitude_sum: f32 = m.iter().sum();

        let spectral_centroid = spectral::centroid(m, magnitude_sum);
        let spectral_rolloff = spectral::rolloff(m, magnitude_sum);
        let spectral_bandwidth = spectral::bandwidth(m, magnitude_sum, spectral_centroid);
        let energy = spectral::energy(m);
        let energy_entropy = spectral::energy_entropy(m, energy);
        let (dominant_bin, peak_volume) = spectral::peak(m);
        let volume_variance = spectral::variance(m, magnitude_sum);

        let (spectral_flux, harmonic_ratio) = match previous {
            Some(prev) => (
                spectral::flux(m, prev.magnitudes()),
                spectral::harmonic_ratio(m, magnitude_sum, dominant_bin),
            ),
            None => (0.0, 0.0),
        };

        let features = FeatureVector {
            spectral_centroid,
            spectral_rolloff,
            spectral_bandwidth,
            spectral_flux,
            energy,
            energy_entropy,
            zero_crossing_rate: temporal::zero_crossing_rate(&window.samples),
            rms: temporal::rms(&window.samples),
            peak_volume,
            volume_variance,
            harmonic_ratio,
            timestamp_ms: window.timestamp_ms,
            magnitudes: m.clone(),
        };

        if !features.is_finite() {
            return Err(DetectorError::MalformedWindow {
                reason: "feature computation produced a non-finite value".to_string(),
            });
        }

        Ok(features)
    }
}
