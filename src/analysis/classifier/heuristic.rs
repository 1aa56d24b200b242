// RuleBasedHeuristic - jump scoring between consecutive windows
//
// Ads tend to arrive with abrupt loudness and timbre changes. Each call scores
// the newest window against the one before it:
//   +0.3 if |Δpeak| > 0.2
//   +0.2 if |Δenergy| > 0.1
//   +0.2 if |Δcentroid| > 0.1
//   +0.2 if peak > 0.7
//   +0.1 if harmonic ratio < 0.3
// capped at 1.0. Scores go into a zero-filled ring buffer and the decision is
// Ad when the buffer mean (sum / capacity) exceeds sensitivity / 100.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{Category, Classifier, ClassifierKind, Prediction};
use crate::analysis::features::{finite_or_zero, FeatureVector};
use crate::protocol::settings::{ClassifierConfig, ClassifierParams};

/// Rule thresholds and weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicParams {
    pub peak_jump_threshold: f32,
    pub peak_jump_weight: f32,
    pub energy_jump_threshold: f32,
    pub energy_jump_weight: f32,
    pub centroid_shift_threshold: f32,
    pub centroid_shift_weight: f32,
    pub loud_peak_threshold: f32,
    pub loud_peak_weight: f32,
    pub harmonic_floor: f32,
    pub harmonic_weight: f32,
    /// Capacity of the score smoothing buffer
    pub smoothing_window: usize,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            peak_jump_threshold: 0.2,
            peak_jump_weight: 0.3,
            energy_jump_threshold: 0.1,
            energy_jump_weight: 0.2,
            centroid_shift_threshold: 0.1,
            centroid_shift_weight: 0.2,
            loud_peak_threshold: 0.7,
            loud_peak_weight: 0.2,
            harmonic_floor: 0.3,
            harmonic_weight: 0.1,
            smoothing_window: 10,
        }
    }
}

/// Stateful rule-based classifier
pub struct RuleBasedHeuristic {
    sensitivity: u8,
    params: HeuristicParams,
    scores: VecDeque<f32>,
}

impl RuleBasedHeuristic {
    pub fn new(sensitivity: u8, params: HeuristicParams) -> Self {
        let capacity = params.smoothing_window.max(1);
        Self {
            sensitivity,
            params,
            scores: VecDeque::from(vec![0.0; capacity]),
        }
    }

    /// Raw score of `latest` relative to `previous`, capped at 1.0
    pub fn score(&self, previous: &FeatureVector, latest: &FeatureVector) -> f32 {
        let p = &self.params;
        let peak = finite_or_zero(latest.peak_volume);
        let delta_peak = (peak - finite_or_zero(previous.peak_volume)).abs();
        let delta_energy = (finite_or_zero(latest.energy) - finite_or_zero(previous.energy)).abs();
        let delta_centroid = (finite_or_zero(latest.spectral_centroid)
            - finite_or_zero(previous.spectral_centroid))
        .abs();

        let mut score = 0.0;
        if delta_peak > p.peak_jump_threshold {
            score += p.peak_jump_weight;
        }
        if delta_energy > p.energy_jump_threshold {
            score += p.energy_jump_weight;
        }
        if delta_centroid > p.centroid_shift_threshold {
            score += p.centroid_shift_weight;
        }
        if peak > p.loud_peak_threshold {
            score += p.loud_peak_weight;
        }
        if finite_or_zero(latest.harmonic_ratio) < p.harmonic_floor {
            score += p.harmonic_weight;
        }

        f32::min(score, 1.0)
    }

    /// Mean over the full buffer capacity (unfilled slots count as 0)
    pub fn smoothed_score(&self) -> f32 {
        self.scores.iter().sum::<f32>() / self.scores.len() as f32
    }

    fn threshold(&self) -> f32 {
        self.sensitivity as f32 / 100.0
    }

    fn push_score(&mut self, score: f32) {
        self.scores.pop_front();
        self.scores.push_back(score);
    }

    fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        while self.scores.len() > capacity {
            self.scores.pop_front();
        }
        while self.scores.len() < capacity {
            self.scores.push_front(0.0);
        }
    }
}

impl Classifier for RuleBasedHeuristic {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Heuristic
    }

    fn predict(&mut self, history: &[FeatureVector]) -> Prediction {
        let [.., previous, latest] = history else {
            return Prediction::new(Category::Program, self.smoothed_score());
        };

        let score = self.score(previous, latest);
        self.push_score(score);
        let mean = self.smoothed_score();

        tracing::debug!(
            "[Classifier] heuristic score {:.2}, buffer mean {:.3}, threshold {:.2}",
            score,
            mean,
            self.threshold()
        );

        if mean > self.threshold() {
            Prediction::new(Category::Ad, mean)
        } else {
            Prediction::new(Category::Program, mean)
        }
    }

    fn reconfigure(&mut self, config: &ClassifierConfig) {
        self.sensitivity = config.sensitivity;
        if let ClassifierParams::SimpleRules(params) = &config.params {
            if params.smoothing_window != self.params.smoothing_window {
                self.resize(params.smoothing_window);
            }
            self.params = params.clone();
        }
    }

    fn reset(&mut self) {
        self.scores.iter_mut().for_each(|s| *s = 0.0);
    }
}
