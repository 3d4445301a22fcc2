//! Audio file in; normalized audio, optional fused stems, MIDI, MusicXML and
//! PDF out.

pub mod error;
pub mod pipeline;

pub use crate::error::PipelineError;
pub use crate::pipeline::{run_pipeline, Backends, Pipeline};
