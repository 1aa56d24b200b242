// Classifier - pluggable ad/program decision over recent feature vectors
//
// Two variants ship with the crate:
// - ParametricLinearModel: standardized features → logistic regression
// - RuleBasedHeuristic: frame-to-frame jump scoring with its own score buffer
//
// Both are selected from the `ClassifierParams` tag in the settings record and
// driven through the object-safe `Classifier` trait, so the DecisionSmoother
// never needs to know which one it is talking to.

mod heuristic;
mod linear;

pub use heuristic::{HeuristicParams, RuleBasedHeuristic};
pub use linear::{LinearModelParams, ParametricLinearModel};

use serde::{Deserialize, Serialize};

use crate::analysis::features::FeatureVector;
use crate::protocol::settings::{ClassifierConfig, ClassifierParams};

/// Content category of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Program,
    Ad,
}

/// Which classifier implementation is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    LinearModel,
    Heuristic,
}

/// Classifier output for one call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub category: Category,
    /// Probability (linear model) or smoothed score (heuristic) in [0, 1]
    pub confidence: f32,
}

impl Prediction {
    pub fn new(category: Category, confidence: f32) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Conservative fallback used when a classifier cannot decide
    pub fn program_fallback() -> Self {
        Self::new(Category::Program, 0.0)
    }
}

/// Capability set every classifier variant provides
///
/// `predict` receives the smoother's history, oldest first, newest last. It
/// must never panic on well-formed input; non-finite features are read as 0.
pub trait Classifier: Send {
    fn kind(&self) -> ClassifierKind;

    fn predict(&mut self, history: &[FeatureVector]) -> Prediction;

    /// Apply new sensitivity/parameters without clearing accumulated state
    fn reconfigure(&mut self, config: &ClassifierConfig);

    /// Drop any state accumulated across calls
    fn reset(&mut self) {}
}

/// Build the classifier selected by `config.params`
pub fn build_classifier(config: &ClassifierConfig) -> Box<dyn Classifier> {
    match &config.params {
        ClassifierParams::LogisticRegression(params) => {
            Box::new(ParametricLinearModel::new(params.clone()))
        }
        ClassifierParams::SimpleRules(params) => {
            Box::new(RuleBasedHeuristic::new(config.sensitivity, params.clone()))
        }
    }
}

/// Kind a config would build, without building it
pub fn kind_of(config: &ClassifierConfig) -> ClassifierKind {
    match config.params {
        ClassifierParams::LogisticRegression(_) => ClassifierKind::LinearModel,
        ClassifierParams::SimpleRules(_) => ClassifierKind::Heuristic,
    }
}
