use std::path::{Path, PathBuf};
use std::sync::Arc;

use stave_domain::{
    AudioAsset, OutputLayout, PipelineEvent, RawModelOutput, Stage, StageContext, TrackName,
    TranscriptionResult,
};
use tracing::{debug, instrument};

use crate::backend::TranscriptionBackend;
use crate::TranscriberError;

/// Extensions the transcription service may leave behind in a track directory.
pub const MANAGED_EXTENSIONS: [&str; 3] = ["mid", "csv", "npz"];

/// Transcribes one track at a time into `midi/<slot>/<hint>.mid`.
pub struct Transcriber {
    backend: Arc<dyn TranscriptionBackend>,
    layout: OutputLayout,
}

impl Transcriber {
    pub fn new(backend: Arc<dyn TranscriptionBackend>, layout: OutputLayout) -> Self {
        Self { backend, layout }
    }

    #[instrument(skip(self, audio, ctx), fields(audio = %audio.path.display(), track = %name))]
    pub fn transcribe(
        &self,
        audio: &AudioAsset,
        name: &TrackName,
        ctx: &StageContext,
    ) -> Result<TranscriptionResult, TranscriberError> {
        ctx.emit(PipelineEvent::StageStarted {
            stage: Stage::Transcribe,
            track: Some(name.hint.clone()),
        });

        let dir = self.layout.midi_dir(name.slot);
        std::fs::create_dir_all(&dir).map_err(TranscriberError::io(&dir))?;
        for stale in managed_files(&dir)? {
            std::fs::remove_file(&stale).map_err(TranscriberError::io(&stale))?;
            ctx.emit(PipelineEvent::StaleArtifactRemoved { path: stale });
        }

        self.backend.transcribe(&audio.path, &dir, ctx)?;

        let produced = managed_files(&dir)?;
        let expected = self
            .backend
            .expected_midi_name(&audio.path)
            .map(|file_name| dir.join(file_name));
        let midi_source = expected
            .filter(|path| produced.contains(path))
            .or_else(|| newest_with_extension(&produced, "mid"))
            .ok_or_else(|| TranscriberError::OutputMissing {
                audio: audio.path.clone(),
                dir: dir.clone(),
            })?;

        let midi = self.layout.midi_path(name);
        move_file(&midi_source, &midi)?;

        let raw_output = match newest_with_extension(&produced, "npz") {
            Some(source) => {
                let target = self.layout.raw_output_path(name);
                move_file(&source, &target)?;
                RawModelOutput::Saved(target)
            }
            None => RawModelOutput::placeholder(),
        };

        let keep = [midi.clone(), self.layout.raw_output_path(name)];
        for leftover in managed_files(&dir)? {
            if !keep.contains(&leftover) {
                debug!(path = %leftover.display(), "removing tool leftover");
                std::fs::remove_file(&leftover).map_err(TranscriberError::io(&leftover))?;
            }
        }

        ctx.emit(PipelineEvent::StageFinished {
            stage: Stage::Transcribe,
            track: Some(name.hint.clone()),
            output: Some(midi.clone()),
        });
        Ok(TranscriptionResult { midi, raw_output })
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|found| found.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn newest_with_extension(files: &[PathBuf], ext: &str) -> Option<PathBuf> {
    files
        .iter()
        .filter(|path| has_extension(path, ext))
        .max_by_key(|path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok())
        .cloned()
}

/// Files in `dir` carrying one of the managed extensions, sorted by name.
fn managed_files(dir: &Path) -> Result<Vec<PathBuf>, TranscriberError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(TranscriberError::io(dir))? {
        let path = entry.map_err(TranscriberError::io(dir))?.path();
        if path.is_file() && MANAGED_EXTENSIONS.iter().any(|ext| has_extension(&path, ext)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn move_file(from: &Path, to: &Path) -> Result<(), TranscriberError> {
    if from == to {
        return Ok(());
    }
    std::fs::rename(from, to).map_err(TranscriberError::io(from))
}
