//! Settings of record and partial updates.
//!
//! The coordinator owns the single `SettingsRecord`; detectors only ever hold
//! the latest copy broadcast to them.

use serde::{Deserialize, Serialize};

use crate::analysis::classifier::{Category, HeuristicParams, LinearModelParams};

pub const MIN_SENSITIVITY: u8 = 10;
pub const MAX_SENSITIVITY: u8 = 100;
pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 100.0;

/// Classifier variant plus its parameters, tagged like the model exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierParams {
    LogisticRegression(LinearModelParams),
    SimpleRules(HeuristicParams),
}

impl Default for ClassifierParams {
    fn default() -> Self {
        ClassifierParams::SimpleRules(HeuristicParams::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Detection aggressiveness in percent, clamped to [10, 100]
    pub sensitivity: u8,
    pub params: ClassifierParams,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sensitivity: 50,
            params: ClassifierParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSettings {
    /// Volume during program content, [0, 100]
    pub original_volume: f32,
    /// Volume during ads, [0, 100]
    pub reduced_volume: f32,
    /// When false, classification runs but the sink is never touched
    pub auto_adjust: bool,
    /// Ramp between volumes instead of jumping
    pub fade_transitions: bool,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            original_volume: 100.0,
            reduced_volume: 30.0,
            auto_adjust: true,
            fade_transitions: true,
        }
    }
}

impl VolumeSettings {
    pub fn volume_for(&self, category: Category) -> f32 {
        match category {
            Category::Program => self.original_volume,
            Category::Ad => self.reduced_volume,
        }
    }
}

/// Authoritative settings plus the enabled flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub enabled: bool,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub volume: VolumeSettings,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            enabled: true,
            classifier: ClassifierConfig::default(),
            volume: VolumeSettings::default(),
        }
    }
}

impl SettingsRecord {
    /// Clamp every bounded field into its range
    pub fn normalized(mut self) -> Self {
        self.classifier.sensitivity = self
            .classifier
            .sensitivity
            .clamp(MIN_SENSITIVITY, MAX_SENSITIVITY);
        self.volume.original_volume = clamp_volume(self.volume.original_volume);
        self.volume.reduced_volume = clamp_volume(self.volume.reduced_volume);
        self
    }

    /// Merge a partial update, last write wins per field
    ///
    /// Returns true when anything changed.
    pub fn apply_patch(&mut self, patch: &SettingsPatch) -> bool {
        let before = self.clone();

        if let Some(sensitivity) = patch.sensitivity {
            self.classifier.sensitivity = sensitivity;
        }
        if let Some(params) = &patch.classifier {
            self.classifier.params = params.clone();
        }
        if let Some(volume) = patch.original_volume {
            self.volume.original_volume = volume;
        }
        if let Some(volume) = patch.reduced_volume {
            self.volume.reduced_volume = volume;
        }
        if let Some(auto_adjust) = patch.auto_adjust {
            self.volume.auto_adjust = auto_adjust;
        }
        if let Some(fade) = patch.fade_transitions {
            self.volume.fade_transitions = fade;
        }

        *self = std::mem::take(self).normalized();
        *self != before
    }
}

/// Clamp a volume into [0, 100]; NaN maps to 0
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return MIN_VOLUME;
    }
    volume.clamp(MIN_VOLUME, MAX_VOLUME)
}

/// Partial settings update sent by observers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<ClassifierParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_adjust: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_transitions: Option<bool>,
}
