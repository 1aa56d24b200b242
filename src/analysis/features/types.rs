// Types module - Data structures for audio features
//
// FeatureVector is the per-window summary handed to classifiers. The scalar
// features are exposed in one fixed order (FEATURE_NAMES) because linear
// model coefficients are fit against that order.

use serde::{Deserialize, Serialize};

/// Number of scalar features in a FeatureVector
pub const FEATURE_COUNT: usize = 11;

/// Canonical feature order used for model coefficients and scalers
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "spectral_centroid",
    "spectral_rolloff",
    "spectral_bandwidth",
    "spectral_flux",
    "energy",
    "energy_entropy",
    "zero_crossing_rate",
    "rms",
    "peak_volume",
    "volume_variance",
    "harmonic_ratio",
];

/// Features extracted from one analysis window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Magnitude-weighted mean bin index
    pub spectral_centroid: f32,
    /// Fraction of the spectrum holding 85% of the magnitude sum
    pub spectral_rolloff: f32,
    /// Magnitude-weighted spread around the centroid, in bins
    pub spectral_bandwidth: f32,
    /// Euclidean distance to the previous window's magnitudes
    pub spectral_flux: f32,
    /// Sum of squared magnitudes
    pub energy: f32,
    /// Shannon entropy (bits) of the per-bin energy distribution
    pub energy_entropy: f32,
    /// Sign changes per adjacent sample pair
    pub zero_crossing_rate: f32,
    /// Root mean square of the time-domain samples
    pub rms: f32,
    /// Largest magnitude
    pub peak_volume: f32,
    /// Population variance of the magnitudes
    pub volume_variance: f32,
    /// Magnitude at harmonics 2..=5 of the dominant bin over the magnitude sum
    pub harmonic_ratio: f32,
    /// Capture time of the source window, milliseconds
    pub timestamp_ms: u64,
    /// Source magnitudes, kept so the next window can compute flux
    #[serde(skip)]
    pub(crate) magnitudes: Vec<f32>,
}

impl FeatureVector {
    /// All-zero vector for a window that could not be analysed
    pub fn zeroed(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Self::default()
        }
    }

    /// Scalar features in FEATURE_NAMES order, as extracted
    pub fn to_array(&self) -> [f32; FEATURE_COUNT] {
        [
            self.spectral_centroid,
            self.spectral_rolloff,
            self.spectral_bandwidth,
            self.spectral_flux,
            self.energy,
            self.energy_entropy,
            self.zero_crossing_rate,
            self.rms,
            self.peak_volume,
            self.volume_variance,
            self.harmonic_ratio,
        ]
    }

    /// Scalar features with every NaN/∞ replaced by 0
    pub fn sanitized(&self) -> [f32; FEATURE_COUNT] {
        self.to_array().map(finite_or_zero)
    }

    /// True when every scalar feature is finite
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Magnitudes of the window this vector was extracted from
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }
}

/// Replace a non-finite value with 0
#[inline]
pub fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
