use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriberError {
    #[error("transcription of {audio:?} produced no MIDI in {dir:?}")]
    OutputMissing { audio: PathBuf, dir: PathBuf },
    #[error("transcription service `{command}` failed: {reason}")]
    Service { command: String, reason: String },
    #[error("file operation on {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TranscriberError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
