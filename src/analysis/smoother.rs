// DecisionSmoother - bounded feature history and the public category state
//
// States:
//   Idle ──arm──▶ Armed ──(≥ min_samples, predict X)──▶ Stable(X)
//   Stable(X) ──predict X──▶ Stable(X)   (silent)
//   Stable(X) ──predict Y──▶ Stable(Y)   (status change + actuation)
//   any ──reset──▶ Idle                  (history cleared)
//
// The classifier is borrowed per call, so swapping classifier variants never
// touches this state.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::analysis::classifier::{Category, Classifier, Prediction};
use crate::analysis::features::FeatureVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "category", rename_all = "snake_case")]
pub enum SmootherState {
    Idle,
    Armed,
    Stable(Category),
}

/// Result of feeding one feature vector through the smoother
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmootherOutcome {
    /// Smoother is Idle; the window was dropped
    Ignored,
    /// Still collecting the minimum history
    Warming { collected: usize, required: usize },
    /// First stable decision after arming
    Settled(Prediction),
    /// Same category as before; nothing to publish
    Held(Prediction),
    /// Category flipped
    Changed { from: Category, prediction: Prediction },
}

pub struct DecisionSmoother {
    state: SmootherState,
    history: VecDeque<FeatureVector>,
    capacity: usize,
    min_samples: usize,
}

impl DecisionSmoother {
    /// `capacity` is clamped to at least `min_samples`, which is at least 2
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        let min_samples = min_samples.max(2);
        let capacity = capacity.max(min_samples);
        Self {
            state: SmootherState::Idle,
            history: VecDeque::with_capacity(capacity),
            capacity,
            min_samples,
        }
    }

    pub fn state(&self) -> SmootherState {
        self.state
    }

    /// Current stable category, if any
    pub fn category(&self) -> Option<Category> {
        match self.state {
            SmootherState::Stable(category) => Some(category),
            _ => None,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Newest feature vector in the history
    pub fn latest(&self) -> Option<&FeatureVector> {
        self.history.back()
    }

    /// Idle → Armed; no effect in any other state
    pub fn arm(&mut self) {
        if self.state == SmootherState::Idle {
            self.state = SmootherState::Armed;
        }
    }

    /// Any → Idle, clearing the history
    pub fn reset(&mut self) {
        self.state = SmootherState::Idle;
        self.history.clear();
    }

    /// Append a feature vector and advance the state machine
    pub fn push(
        &mut self,
        features: FeatureVector,
        classifier: &mut dyn Classifier,
    ) -> SmootherOutcome {
        if self.state == SmootherState::Idle {
            return SmootherOutcome::Ignored;
        }

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(features);

        if self.state == SmootherState::Armed && self.history.len() < self.min_samples {
            return SmootherOutcome::Warming {
                collected: self.history.len(),
                required: self.min_samples,
            };
        }

        let prediction = classifier.predict(self.history.make_contiguous());

        match self.state {
            SmootherState::Stable(current) if current == prediction.category => {
                SmootherOutcome::Held(prediction)
            }
            SmootherState::Stable(current) => {
                self.state = SmootherState::Stable(prediction.category);
                SmootherOutcome::Changed {
                    from: current,
                    prediction,
                }
            }
            _ => {
                self.state = SmootherState::Stable(prediction.category);
                SmootherOutcome::Settled(prediction)
            }
        }
    }
}
