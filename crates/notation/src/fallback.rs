use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::musicxml::write_score;
use crate::score::{quantize, MidiNotes};
use crate::NotationError;

/// Built-in MIDI to MusicXML conversion used when the external tool fails.
#[derive(Clone, Copy, Debug)]
pub struct FallbackConverter {
    divisions: u32,
}

impl FallbackConverter {
    pub fn new(divisions: u32) -> Self {
        Self {
            divisions: divisions.max(1),
        }
    }

    #[instrument(skip(self))]
    pub fn convert_file(
        &self,
        midi: &Path,
        musicxml: &Path,
        title: &str,
    ) -> Result<PathBuf, NotationError> {
        let bytes = std::fs::read(midi).map_err(NotationError::io(midi))?;
        let xml = midi_to_musicxml(&bytes, title, self.divisions).map_err(|err| match err {
            NotationError::MidiParse { reason, .. } => NotationError::MidiParse {
                path: midi.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        if let Some(parent) = musicxml.parent() {
            std::fs::create_dir_all(parent).map_err(NotationError::io(parent))?;
        }
        std::fs::write(musicxml, xml).map_err(NotationError::io(musicxml))?;
        Ok(musicxml.to_path_buf())
    }
}

pub fn midi_to_musicxml(bytes: &[u8], title: &str, divisions: u32) -> Result<String, NotationError> {
    let notes = MidiNotes::parse(bytes).map_err(|err| NotationError::MidiParse {
        path: PathBuf::new(),
        reason: err.to_string(),
    })?;
    debug!(
        notes = notes.note_count(),
        channels = notes.channels.len(),
        tempo = notes.tempo_bpm,
        "parsed MIDI for fallback"
    );
    let score = quantize(&notes, divisions);
    Ok(write_score(&score, title)?)
}
