// ParametricLinearModel - logistic regression over standardized features
//
// Parameters come from the training pipeline's JSON export:
//   { "type": "logistic_regression", "feature_names": [...], "coefficients": [...],
//     "intercept": f, "scaler_mean": [...], "scaler_scale": [...] }
// When feature names are present the arrays are re-ordered into FEATURE_NAMES
// order on load.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Category, Classifier, ClassifierKind, Prediction};
use crate::analysis::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::error::{log_detector_error, DetectorError};
use crate::protocol::settings::{ClassifierConfig, ClassifierParams};
use crate::telemetry;

/// Decision threshold on the logistic output
const DECISION_THRESHOLD: f32 = 0.5;

/// Fitted logistic-regression parameters plus the standard scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub coefficients: Vec<f32>,
    pub intercept: f32,
    pub scaler_mean: Vec<f32>,
    pub scaler_scale: Vec<f32>,
}

impl Default for LinearModelParams {
    /// Neutral model: every window scores p = 0.5 and is classified Program
    fn default() -> Self {
        Self {
            feature_names: None,
            coefficients: vec![0.0; FEATURE_COUNT],
            intercept: 0.0,
            scaler_mean: vec![0.0; FEATURE_COUNT],
            scaler_scale: vec![1.0; FEATURE_COUNT],
        }
    }
}

impl LinearModelParams {
    /// Load parameters from a training-pipeline JSON export
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DetectorError> {
        let contents = fs::read_to_string(&path)?;
        let params = match serde_json::from_str::<ClassifierParams>(&contents)? {
            ClassifierParams::LogisticRegression(params) => params,
            ClassifierParams::SimpleRules(_) => {
                return Err(DetectorError::ModelLoad {
                    reason: format!(
                        "{:?} holds a rule-based model, expected logistic_regression",
                        path.as_ref()
                    ),
                })
            }
        };
        let canonical = params.canonical()?;
        tracing::info!(
            "[Classifier] Loaded linear model from {:?} (intercept {:.4})",
            path.as_ref(),
            canonical.intercept
        );
        Ok(canonical)
    }

    /// Return parameters in FEATURE_NAMES order, validating lengths
    pub fn canonical(&self) -> Result<Self, DetectorError> {
        let Some(names) = &self.feature_names else {
            self.check_lengths()?;
            return Ok(self.clone());
        };

        if names.len() != self.coefficients.len()
            || names.len() != self.scaler_mean.len()
            || names.len() != self.scaler_scale.len()
        {
            return Err(DetectorError::ModelLoad {
                reason: format!(
                    "{} feature names for {} coefficients / {} means / {} scales",
                    names.len(),
                    self.coefficients.len(),
                    self.scaler_mean.len(),
                    self.scaler_scale.len()
                ),
            });
        }

        let mut ordered = Self {
            feature_names: None,
            coefficients: Vec::with_capacity(FEATURE_COUNT),
            intercept: self.intercept,
            scaler_mean: Vec::with_capacity(FEATURE_COUNT),
            scaler_scale: Vec::with_capacity(FEATURE_COUNT),
        };
        for expected in FEATURE_NAMES {
            let idx = names
                .iter()
                .position(|name| name == expected)
                .ok_or_else(|| DetectorError::ModelLoad {
                    reason: format!("model is missing feature '{}'", expected),
                })?;
            ordered.coefficients.push(self.coefficients[idx]);
            ordered.scaler_mean.push(self.scaler_mean[idx]);
            ordered.scaler_scale.push(self.scaler_scale[idx]);
        }

        if let Some(unknown) = names.iter().find(|n| !FEATURE_NAMES.contains(&n.as_str())) {
            return Err(DetectorError::ModelLoad {
                reason: format!("model uses unknown feature '{}'", unknown),
            });
        }

        Ok(ordered)
    }

    fn check_lengths(&self) -> Result<(), DetectorError> {
        for (label, len) in [
            ("coefficients", self.coefficients.len()),
            ("scaler_mean", self.scaler_mean.len()),
            ("scaler_scale", self.scaler_scale.len()),
        ] {
            if len != FEATURE_COUNT {
                return Err(DetectorError::ModelLoad {
                    reason: format!("{} has {} entries, expected {}", label, len, FEATURE_COUNT),
                });
            }
        }
        Ok(())
    }
}

/// Logistic regression classifier over the newest feature vector
pub struct ParametricLinearModel {
    /// Canonical parameters, or None when the configured ones are unusable
    params: Option<LinearModelParams>,
}

impl ParametricLinearModel {
    pub fn new(params: LinearModelParams) -> Self {
        Self {
            params: Self::validated(&params),
        }
    }

    fn validated(params: &LinearModelParams) -> Option<LinearModelParams> {
        match params.canonical() {
            Ok(canonical) => Some(canonical),
            Err(err) => {
                log_detector_error(&err, "ParametricLinearModel");
                None
            }
        }
    }

    /// Logistic probability of Ad for one feature vector
    pub fn probability(&self, features: &FeatureVector) -> Option<f32> {
        let params = self.params.as_ref()?;
        let values = features.sanitized();

        let linear = values
            .iter()
            .zip(&params.coefficients)
            .zip(params.scaler_mean.iter().zip(&params.scaler_scale))
            .fold(params.intercept, |acc, ((&value, &coef), (&mean, &scale))| {
                let normalized = if scale == 0.0 {
                    value
                } else {
                    (value - mean) / scale
                };
                acc + coef * normalized
            });

        let p = 1.0 / (1.0 + (-linear).exp());
        p.is_finite().then_some(p)
    }
}

impl Classifier for ParametricLinearModel {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::LinearModel
    }

    fn predict(&mut self, history: &[FeatureVector]) -> Prediction {
        let Some(latest) = history.last() else {
            return Prediction::program_fallback();
        };

        match self.probability(latest) {
            Some(p) if p > DECISION_THRESHOLD => Prediction::new(Category::Ad, p),
            Some(p) => Prediction::new(Category::Program, p),
            None => {
                let err = DetectorError::ClassifierFault {
                    reason: "linear model unavailable or produced a non-finite output".to_string(),
                };
                log_detector_error(&err, "ParametricLinearModel::predict");
                telemetry::hub().record_detector_error(&err);
                Prediction::program_fallback()
            }
        }
    }

    fn reconfigure(&mut self, config: &ClassifierConfig) {
        if let ClassifierParams::LogisticRegression(params) = &config.params {
            self.params = Self::validated(params);
        }
    }
}
