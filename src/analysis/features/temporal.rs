// Temporal module - Time-domain feature extraction
//
// Samples are normalized to [-1, 1].

/// Compute zero-crossing rate (ZCR)
///
/// Counts adjacent-sample sign changes (a sample ≥ 0 followed by one < 0, or
/// the reverse) and divides by the number of adjacent pairs.
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }

    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();

    crossings as f32 / (samples.len() - 1) as f32
}

/// Root mean square amplitude
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zcr_alternating_signal() {
        let samples = [1.0, -1.0, 1.0, -1.0, 1.0];
        assert_eq!(zero_crossing_rate(&samples), 1.0);
    }

    #[test]
    fn test_zcr_silence() {
        assert_eq!(zero_crossing_rate(&[0.0; 16]), 0.0);
    }

    #[test]
    fn test_rms_constant_signal() {
        assert!((rms(&[0.5; 8]) - 0.5).abs() < 1e-6);
    }
}
