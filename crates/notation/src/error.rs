use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotationError {
    #[error("cannot parse MIDI {path:?}: {reason}")]
    MidiParse { path: PathBuf, reason: String },
    #[error("failed to write MusicXML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("file operation on {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("notation export was cancelled")]
    Cancelled,
}

impl NotationError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
