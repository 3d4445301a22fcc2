use std::path::PathBuf;

use stave_audio::AudioError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("separation requires at least one model")]
    NoModels,
    #[error("model `{model}` failed: {reason}")]
    ModelInvocation { model: String, reason: String },
    #[error("model `{model}` produced shape {found:?}, expected {expected:?} (channels, samples)")]
    ShapeMismatch {
        model: String,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("model `{model}` produced {found} Hz audio, expected {expected} Hz")]
    SampleRateMismatch {
        model: String,
        expected: u32,
        found: u32,
    },
    #[error("prepare directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Audio(#[from] AudioError),
}
