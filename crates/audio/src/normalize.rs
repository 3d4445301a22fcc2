use std::path::Path;

use stave_domain::{
    AudioAsset, NormalizeConfig, OutputLayout, PipelineEvent, Stage, StageContext,
};
use tracing::{debug, instrument};

use crate::dsp::{downmix_to_mono, normalize_buffer};
use crate::io::{write_wav, AudioDecoder};
use crate::resample::resample_mono;
use crate::AudioError;

/// Produces the canonical mono working file every later stage reads.
pub struct Normalizer {
    config: NormalizeConfig,
    layout: OutputLayout,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig, layout: OutputLayout) -> Self {
        Self { config, layout }
    }

    #[instrument(skip(self, ctx), fields(input = %input.display()))]
    pub fn normalize(&self, input: &Path, ctx: &StageContext) -> Result<AudioAsset, AudioError> {
        ctx.emit(PipelineEvent::StageStarted {
            stage: Stage::Normalize,
            track: None,
        });

        let decoded = AudioDecoder::open(input)?;
        if decoded.samples.is_empty() {
            return Err(AudioError::Empty {
                path: input.to_path_buf(),
            });
        }
        let mono = downmix_to_mono(&decoded.samples, decoded.channels);
        let mut samples = resample_mono(&mono, decoded.sample_rate, self.config.target_sample_rate)?;
        if samples.is_empty() {
            return Err(AudioError::Empty {
                path: input.to_path_buf(),
            });
        }
        let peak = normalize_buffer(&mut samples, self.config.peak);
        debug!(
            source_rate = decoded.sample_rate,
            source_channels = decoded.channels,
            peak = peak.absolute(),
            "normalized signal"
        );

        let output = self.layout.normalized_path(input, self.config.placement);
        write_wav(&output, &samples, self.config.target_sample_rate, 1)?;

        ctx.emit(PipelineEvent::StageFinished {
            stage: Stage::Normalize,
            track: None,
            output: Some(output.clone()),
        });
        Ok(AudioAsset::new(output, self.config.target_sample_rate, 1))
    }
}
