// Analysis module - window → features → classifier → smoothed category
//
// Pipeline per sampling tick:
// - AnalysisWindow: magnitudes + samples captured from the playback tap
// - FeatureExtractor: pure per-window features, previous window threaded in
// - Classifier: linear model or rule heuristic behind one trait
// - DecisionSmoother: bounded history and the published category

pub mod classifier;
pub mod features;
pub mod smoother;
pub mod window;

pub use classifier::{build_classifier, Category, Classifier, ClassifierKind, Prediction};
pub use features::{FeatureExtractor, FeatureVector};
pub use smoother::{DecisionSmoother, SmootherOutcome, SmootherState};
pub use window::{AnalysisWindow, WindowBuilder};
