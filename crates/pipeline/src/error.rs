use std::path::PathBuf;

use stave_audio::AudioError;
use stave_domain::DomainError;
use stave_notation::NotationError;
use stave_separation::SeparationError;
use stave_transcriber::TranscriberError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] DomainError),
    #[error("normalization failed: {0}")]
    Audio(#[from] AudioError),
    #[error("stem separation failed: {0}")]
    Separation(#[from] SeparationError),
    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriberError),
    #[error("notation export failed: {0}")]
    Notation(#[from] NotationError),
    #[error("cannot prepare output {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run cancelled")]
    Cancelled,
}
