// FFT module - Fast Fourier Transform computation
//
// Used when windows are derived from raw PCM (offline replay) rather than
// delivered pre-analysed by an audio tap. Magnitudes are mapped onto [0, 1]
// over a fixed decibel range, the same convention browser analyser nodes use
// for byte frequency data.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT size; yields FFT_SIZE / 2 frequency bins
pub const FFT_SIZE: usize = 2048;

/// Decibel level mapped to magnitude 0.0
pub const MIN_DECIBELS: f32 = -100.0;

/// Decibel level mapped to magnitude 1.0
pub const MAX_DECIBELS: f32 = -30.0;

/// FFT processor that computes normalized magnitude spectra
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window (pre-computed)
    window: Vec<f32>,
}

impl FftProcessor {
    pub fn new(fft_size: usize) -> Self {
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();

        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window,
        }
    }

    /// Number of frequency bins produced per spectrum
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Compute the normalized magnitude spectrum of `audio`
    ///
    /// Applies the Hann window, zero-pads short input, and returns
    /// `fft_size / 2` magnitudes in [0, 1].
    pub fn normalized_spectrum(&self, audio: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = self
            .window
            .iter()
            .enumerate()
            .map(|(i, &w)| Complex::new(audio.get(i).copied().unwrap_or(0.0) * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        buffer[..self.bin_count()]
            .iter()
            .map(|c| {
                let magnitude = c.norm() / self.fft_size as f32;
                if magnitude <= 0.0 {
                    return 0.0;
                }
                let db = 20.0 * magnitude.log10();
                ((db - MIN_DECIBELS) / range).clamp(0.0, 1.0)
            })
            .collect()
    }
}
