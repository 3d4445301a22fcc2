use std::sync::Arc;

use stave_audio::write_wav;
use stave_domain::{
    AudioAsset, OutputLayout, PipelineEvent, Stage, StageContext, StemId, StemSet,
};
use tracing::{info, instrument};

use crate::backend::SeparationBackend;
use crate::fusion::fuse;
use crate::SeparationError;

/// Runs every requested model and writes the fused consensus stems.
pub struct StemSeparator {
    backend: Arc<dyn SeparationBackend>,
    layout: OutputLayout,
}

impl StemSeparator {
    pub fn new(backend: Arc<dyn SeparationBackend>, layout: OutputLayout) -> Self {
        Self { backend, layout }
    }

    /// Fails on the first model error; a partial ensemble is never fused.
    #[instrument(skip(self, audio, ctx), fields(audio = %audio.path.display()))]
    pub fn separate(
        &self,
        audio: &AudioAsset,
        base: &str,
        models: &[String],
        ctx: &StageContext,
    ) -> Result<StemSet, SeparationError> {
        if models.is_empty() {
            return Err(SeparationError::NoModels);
        }
        ctx.emit(PipelineEvent::StageStarted {
            stage: Stage::Separate,
            track: None,
        });

        let mut outputs = Vec::with_capacity(models.len());
        for model in models {
            let output = self.backend.separate(audio, model, ctx)?;
            info!(model = %model, stems = output.stem_count(), "model finished");
            outputs.push(output);
        }

        let fused = fuse(&outputs)?;
        ctx.emit(PipelineEvent::StemsFused {
            models: outputs.len(),
            max_stems: fused.stem_count(),
        });

        let ensemble_dir = self.layout.ensemble_dir();
        std::fs::create_dir_all(&ensemble_dir).map_err(|source| SeparationError::Io {
            path: ensemble_dir.clone(),
            source,
        })?;
        for id in self.layout.stem_ids_on_disk(base) {
            let stale = self.layout.fused_stem_path(base, id);
            if stale.is_file() {
                std::fs::remove_file(&stale).map_err(|source| SeparationError::Io {
                    path: stale.clone(),
                    source,
                })?;
                ctx.emit(PipelineEvent::StaleArtifactRemoved { path: stale });
            }
        }

        let channels = fused.channels() as u16;
        let mut stems = StemSet::new();
        for index in 0..fused.stem_count() {
            let id = StemId(index);
            let path = self.layout.fused_stem_path(base, id);
            write_wav(&path, &fused.interleaved(index), fused.sample_rate, channels)?;
            stems.insert(id, AudioAsset::new(path, fused.sample_rate, channels));
        }

        ctx.emit(PipelineEvent::StageFinished {
            stage: Stage::Separate,
            track: None,
            output: Some(ensemble_dir),
        });
        Ok(stems)
    }
}
