// Ad Volume Reducer Core - acoustic ad detection and volume actuation
// Window analysis, smoothed classification, and cross-context coordination

// Module declarations
pub mod actuator;
pub mod analysis;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod telemetry;

// Re-exports for convenience
pub use actuator::{MemorySink, PlaybackSink, VolumeActuator};
pub use analysis::{
    AnalysisWindow, Category, Classifier, ClassifierKind, DecisionSmoother, FeatureExtractor,
    FeatureVector, Prediction, WindowBuilder,
};
pub use config::AppConfig;
pub use coordinator::Coordinator;
pub use detector::{run_detector, AudioTap, Detector, DetectorState, ReplayTap};
pub use observer::{Observer, ObserverView};
pub use protocol::{
    ContextId, DetectorStatus, Endpoint, Envelope, Message, SettingsPatch, SettingsRecord,
};
