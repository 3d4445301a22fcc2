pub mod assets;
pub mod config;
pub mod error;
pub mod events;
pub mod layout;
pub mod tool;

pub use crate::assets::{
    AudioAsset, NotationArtifact, PipelineResult, RawModelOutput, StemId, StemSet, TrackName,
    TrackSlot, TranscriptionResult, XmlSource,
};
pub use crate::config::{
    NormalizeConfig, NotationConfig, PipelineConfig, SeparationConfig, TranscriptionConfig,
    MAX_FALLBACK_DIVISIONS,
};
pub use crate::error::DomainError;
pub use crate::events::{
    PipelineEvent, PipelineObserver, RecordingObserver, Stage, StageContext, TracingObserver,
};
pub use crate::layout::{base_name, NormalizedPlacement, OutputLayout};
pub use crate::tool::{CancelToken, ToolCommand, ToolError, ToolRun};
