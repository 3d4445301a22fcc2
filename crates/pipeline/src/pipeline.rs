use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use stave_audio::Normalizer;
use stave_domain::{
    base_name, AudioAsset, CancelToken, NotationArtifact, OutputLayout, PipelineConfig,
    PipelineEvent, PipelineObserver, PipelineResult, StageContext, StemId, StemSet, TracingObserver, TrackName,
    TranscriptionResult,
};
use stave_notation::{MuseScoreCli, NotationExporter, NotationTool};
use stave_separation::{DemucsCli, SeparationBackend, StemSeparator};
use stave_transcriber::{BasicPitchCli, Transcriber, TranscriptionBackend};
use tracing::{info, instrument};

use crate::PipelineError;

/// The external services a run talks to.
#[derive(Clone)]
pub struct Backends {
    pub separation: Arc<dyn SeparationBackend>,
    pub transcription: Arc<dyn TranscriptionBackend>,
    pub notation: Arc<dyn NotationTool>,
}

impl Backends {
    /// Command line tools named by the configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            separation: Arc::new(DemucsCli::new(
                config.separation.command.clone(),
                OutputLayout::new(&config.output_root),
            )),
            transcription: Arc::new(BasicPitchCli::new(
                config.transcription.command.clone(),
                config.transcription.save_model_outputs,
            )),
            notation: Arc::new(MuseScoreCli::new(config.notation.musescore_cmd.clone())),
        }
    }
}

type TrackOutput = (TranscriptionResult, NotationArtifact);

pub struct Pipeline {
    config: PipelineConfig,
    layout: OutputLayout,
    normalizer: Normalizer,
    separator: StemSeparator,
    transcriber: Transcriber,
    exporter: NotationExporter,
    ctx: StageContext,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, backends: Backends) -> Result<Self, PipelineError> {
        config.validate()?;
        let layout = OutputLayout::new(&config.output_root);
        Ok(Self {
            normalizer: Normalizer::new(config.normalize.clone(), layout.clone()),
            separator: StemSeparator::new(backends.separation, layout.clone()),
            transcriber: Transcriber::new(backends.transcription, layout.clone()),
            exporter: NotationExporter::new(
                backends.notation,
                layout.clone(),
                config.notation.fallback_divisions,
            ),
            ctx: StageContext::new(Arc::new(TracingObserver), CancelToken::new()),
            layout,
            config,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.ctx = StageContext::new(observer, self.ctx.cancel_token().clone());
        self
    }

    /// Token that stops the run and kills any tool still running.
    pub fn cancel_token(&self) -> CancelToken {
        self.ctx.cancel_token().clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage to completion. Nothing is returned for a partial run.
    #[instrument(skip(self), fields(output_root = %self.layout.root().display()))]
    pub fn run(&self, audio: &Path) -> Result<PipelineResult, PipelineError> {
        self.run_stages(audio).map_err(|err| {
            if self.ctx.cancel_token().is_cancelled() {
                PipelineError::Cancelled
            } else {
                err
            }
        })
    }

    fn run_stages(&self, audio: &Path) -> Result<PipelineResult, PipelineError> {
        let root = self.layout.root();
        std::fs::create_dir_all(root).map_err(|source| PipelineError::OutputDir {
            path: root.to_path_buf(),
            source,
        })?;

        self.checkpoint()?;
        let normalized = self.normalizer.normalize(audio, &self.ctx)?;
        let base = base_name(audio);

        let mut stems = StemSet::new();
        let mut stems_midi = BTreeMap::new();
        let mut stems_notation = BTreeMap::new();
        if self.config.separation.enabled {
            self.checkpoint()?;
            stems = self.separator.separate(
                &normalized,
                &base,
                &self.config.separation.models,
                &self.ctx,
            )?;
        }
        self.remove_stale_stems(&base, &stems)?;
        for (id, (midi, notation)) in self.process_stems(&stems, &base)? {
            stems_midi.insert(id, midi);
            stems_notation.insert(id, notation);
        }

        let (main_midi, main_notation) = self.process_track(&normalized, &TrackName::main(&base))?;

        info!(
            stems = stems.len(),
            musicxml = %main_notation.musicxml.display(),
            pdf = main_notation.pdf.is_some(),
            "pipeline finished"
        );
        Ok(PipelineResult {
            raw_audio: audio.to_path_buf(),
            normalized,
            stems,
            main_midi,
            main_notation,
            stems_midi,
            stems_notation,
        })
    }

    fn process_stems(
        &self,
        stems: &StemSet,
        base: &str,
    ) -> Result<Vec<(StemId, TrackOutput)>, PipelineError> {
        let work: Vec<(StemId, &AudioAsset)> = stems.iter().collect();
        let run_one = |(id, asset): &(StemId, &AudioAsset)| {
            self.process_track(asset, &TrackName::stem(base, *id))
                .map(|output| (*id, output))
        };
        if self.config.parallel_stems {
            work.par_iter().map(run_one).collect()
        } else {
            work.iter().map(run_one).collect()
        }
    }

    fn process_track(&self, audio: &AudioAsset, name: &TrackName) -> Result<TrackOutput, PipelineError> {
        self.checkpoint()?;
        let midi = self.transcriber.transcribe(audio, name, &self.ctx)?;
        self.checkpoint()?;
        let notation =
            self.exporter
                .export(&midi.midi, name, self.config.notation.emit_pdf, &self.ctx)?;
        Ok((midi, notation))
    }

    /// Deletes artifacts of stem ordinals this run does not produce.
    fn remove_stale_stems(&self, base: &str, stems: &StemSet) -> Result<(), PipelineError> {
        for id in self.layout.stem_ids_on_disk(base) {
            if stems.get(id).is_some() {
                continue;
            }
            for stale in self.layout.stem_artifacts(base, id) {
                if !stale.is_file() {
                    continue;
                }
                std::fs::remove_file(&stale).map_err(|source| PipelineError::OutputDir {
                    path: stale.clone(),
                    source,
                })?;
                self.ctx
                    .emit(PipelineEvent::StaleArtifactRemoved { path: stale });
            }
            // kept when another input still has files there
            for kind in ["midi", "xml", "pdf"] {
                std::fs::remove_dir(self.layout.root().join(kind).join(id.to_string())).ok();
            }
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.ctx.cancel_token().is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs the whole pipeline with the command line tools named in `config`.
pub fn run_pipeline(audio: &Path, config: &PipelineConfig) -> Result<PipelineResult, PipelineError> {
    Pipeline::new(config.clone(), Backends::from_config(config))?.run(audio)
}
