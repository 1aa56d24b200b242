// Spectral module - Frequency-domain feature extraction
//
// All features operate on normalized magnitudes in [0, 1], indexed by bin.
// Frequencies are expressed in bins (centroid, bandwidth) or as a fraction of
// the spectrum (rolloff), never in Hz.

/// Spectral rolloff threshold (85% of the magnitude sum)
const ROLLOFF_THRESHOLD: f32 = 0.85;

/// Harmonic multiples of the dominant bin used by the harmonic ratio
const HARMONICS: std::ops::RangeInclusive<usize> = 2..=5;

/// Compute spectral centroid
///
/// Formula: centroid = Σ(i × m[i]) / Σm[i], 0 when the spectrum is silent
pub fn centroid(spectrum: &[f32], magnitude_sum: f32) -> f32 {
    if magnitude_sum == 0.0 {
        return 0.0;
    }

    let weighted_sum: f32 = spectrum
        .iter()
        .enumerate()
        .map(|(i, &mag)| i as f32 * mag)
        .sum();

    weighted_sum / magnitude_sum
}

/// Compute spectral rolloff as a fraction of the spectrum length
///
/// Returns the smallest i/N whose cumulative magnitude sum reaches 85% of the
/// total, or 1.0 if the threshold is never reached (including silence).
pub fn rolloff(spectrum: &[f32], magnitude_sum: f32) -> f32 {
    if magnitude_sum == 0.0 || spectrum.is_empty() {
        return 1.0;
    }

    let threshold = ROLLOFF_THRESHOLD * magnitude_sum;
    let mut cumulative = 0.0;
    for (i, &mag) in spectrum.iter().enumerate() {
        cumulative += mag;
        if cumulative >= threshold {
            return i as f32 / spectrum.len() as f32;
        }
    }

    1.0
}

/// Compute spectral bandwidth around a precomputed centroid
///
/// Formula: sqrt(Σ((i − centroid)² × m[i]) / Σm[i])
pub fn bandwidth(spectrum: &[f32], magnitude_sum: f32, centroid: f32) -> f32 {
    if magnitude_sum == 0.0 {
        return 0.0;
    }

    let spread: f32 = spectrum
        .iter()
        .enumerate()
        .map(|(i, &mag)| {
            let distance = i as f32 - centroid;
            distance * distance * mag
        })
        .sum();

    (spread / magnitude_sum).sqrt()
}

/// Compute spectral flux against the previous window's magnitudes
///
/// Bins missing from the shorter spectrum count as zero.
pub fn flux(spectrum: &[f32], previous: &[f32]) -> f32 {
    let len = spectrum.len().max(previous.len());
    let sum: f32 = (0..len)
        .map(|i| {
            let current = spectrum.get(i).copied().unwrap_or(0.0);
            let before = previous.get(i).copied().unwrap_or(0.0);
            let diff = current - before;
            diff * diff
        })
        .sum();
    sum.sqrt()
}

/// Sum of squared magnitudes
pub fn energy(spectrum: &[f32]) -> f32 {
    spectrum.iter().map(|&mag| mag * mag).sum()
}

/// Shannon entropy (base 2) of the normalized per-bin energy
pub fn energy_entropy(spectrum: &[f32], energy: f32) -> f32 {
    if energy == 0.0 {
        return 0.0;
    }

    -spectrum
        .iter()
        .map(|&mag| mag * mag / energy)
        .filter(|&p| p > 0.0)
        .map(|p| p * p.log2())
        .sum::<f32>()
}

/// Largest magnitude and the first bin holding it
pub fn peak(spectrum: &[f32]) -> (usize, f32) {
    spectrum
        .iter()
        .copied()
        .enumerate()
        .fold((0, 0.0), |(best_idx, best), (i, mag)| {
            if mag > best {
                (i, mag)
            } else {
                (best_idx, best)
            }
        })
}

/// Population variance of the magnitudes
pub fn variance(spectrum: &[f32], magnitude_sum: f32) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }

    let n = spectrum.len() as f32;
    let mean = magnitude_sum / n;
    spectrum
        .iter()
        .map(|&mag| {
            let diff = mag - mean;
            diff * diff
        })
        .sum::<f32>()
        / n
}

/// Coarse harmonicity: magnitude at multiples 2..=5 of the dominant bin
///
/// Indices past the end are clamped to the last bin.
pub fn harmonic_ratio(spectrum: &[f32], magnitude_sum: f32, dominant_bin: usize) -> f32 {
    if magnitude_sum == 0.0 || spectrum.is_empty() {
        return 0.0;
    }

    let last = spectrum.len() - 1;
    let harmonic_sum: f32 = HARMONICS
        .map(|k| spectrum[(k * dominant_bin).min(last)])
        .sum();

    harmonic_sum / magnitude_sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_single_bin() {
        let spectrum = [0.0, 0.0, 1.0, 0.0];
        assert_eq!(centroid(&spectrum, 1.0), 2.0);
    }

    #[test]
    fn test_rolloff_fraction() {
        // Cumulative sums: 0.1, 0.2, 1.0 → reaches 0.85 at bin 2
        let spectrum = [0.1, 0.1, 0.8, 0.0];
        assert_eq!(rolloff(&spectrum, 1.0), 0.5);
    }

    #[test]
    fn test_rolloff_silence_is_one() {
        assert_eq!(rolloff(&[0.0; 8], 0.0), 1.0);
    }

    #[test]
    fn test_bandwidth_symmetric_spread() {
        let spectrum = [1.0, 0.0, 1.0];
        let c = centroid(&spectrum, 2.0);
        assert_eq!(c, 1.0);
        assert!((bandwidth(&spectrum, 2.0, c) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_entropy_uniform_two_bins() {
        let spectrum = [0.5, 0.5];
        let e = energy(&spectrum);
        assert!((energy_entropy(&spectrum, e) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_harmonic_ratio_clamps_to_last_bin() {
        // Dominant bin 2; harmonics 4, 6, 8, 10 clamp to bin 4
        let spectrum = [0.0, 0.0, 1.0, 0.0, 0.5];
        let sum = 1.5;
        let (dominant, _) = peak(&spectrum);
        assert_eq!(dominant, 2);
        assert!((harmonic_ratio(&spectrum, sum, dominant) - 2.0 / 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_flux_handles_length_mismatch() {
        assert!((flux(&[1.0, 1.0], &[1.0]) - 1.0).abs() < 1e-6);
    }
}
