use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::layout::NormalizedPlacement;
use crate::DomainError;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_PEAK: f32 = 0.95;
/// Finest fallback grid accepted, matching a common MIDI resolution.
pub const MAX_FALLBACK_DIVISIONS: u32 = 960;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizeConfig {
    pub target_sample_rate: u32,
    /// Peak amplitude after scaling.
    pub peak: f32,
    pub placement: NormalizedPlacement,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_SAMPLE_RATE,
            peak: DEFAULT_PEAK,
            placement: NormalizedPlacement::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeparationConfig {
    pub enabled: bool,
    pub models: Vec<String>,
    pub command: String,
}

impl SeparationConfig {
    pub fn default_models() -> Vec<String> {
        vec!["htdemucs".to_string(), "htdemucs_6s".to_string()]
    }
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            models: Self::default_models(),
            command: "demucs".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub command: String,
    pub save_model_outputs: bool,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            command: "basic-pitch".to_string(),
            save_model_outputs: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotationConfig {
    pub musescore_cmd: String,
    pub emit_pdf: bool,
    /// Quantization grid of the fallback converter, in divisions per quarter note.
    pub fallback_divisions: u32,
}

impl Default for NotationConfig {
    fn default() -> Self {
        Self {
            musescore_cmd: "mscore".to_string(),
            emit_pdf: true,
            fallback_divisions: 4,
        }
    }
}

/// Immutable settings for one pipeline run, handed to every stage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_root: PathBuf,
    pub parallel_stems: bool,
    pub normalize: NormalizeConfig,
    pub separation: SeparationConfig,
    pub transcription: TranscriptionConfig,
    pub notation: NotationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("build"),
            parallel_stems: false,
            normalize: NormalizeConfig::default(),
            separation: SeparationConfig::default(),
            transcription: TranscriptionConfig::default(),
            notation: NotationConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, DomainError> {
        serde_yaml::from_str(source).map_err(|err| DomainError::Serialization(err.to_string()))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, DomainError> {
        let source = std::fs::read_to_string(path).map_err(|source| DomainError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&source)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.normalize.target_sample_rate == 0 {
            return Err(DomainError::validation(
                "target sample rate must be positive",
            ));
        }
        if !(self.normalize.peak > 0.0 && self.normalize.peak <= 1.0) {
            return Err(DomainError::validation("peak must be within (0, 1]"));
        }
        if self.separation.enabled && self.separation.models.is_empty() {
            return Err(DomainError::validation(
                "stem separation requires at least one model",
            ));
        }
        if self.separation.models.iter().any(|m| m.trim().is_empty()) {
            return Err(DomainError::validation("model names cannot be blank"));
        }
        for (label, command) in [
            ("separation", &self.separation.command),
            ("transcription", &self.transcription.command),
            ("notation", &self.notation.musescore_cmd),
        ] {
            if command.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "{label} command cannot be empty"
                )));
            }
        }
        if !(1..=MAX_FALLBACK_DIVISIONS).contains(&self.notation.fallback_divisions) {
            return Err(DomainError::validation(format!(
                "fallback divisions must be between 1 and {MAX_FALLBACK_DIVISIONS}"
            )));
        }
        Ok(())
    }
}
