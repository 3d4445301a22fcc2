use std::path::{Path, PathBuf};

use ndarray::Array2;
use stave_audio::{AudioDecoder, DecodedAudio};
use stave_domain::{AudioAsset, OutputLayout, StageContext, ToolCommand, ToolError};
use tracing::{debug, instrument};

use crate::fusion::{stack_stems, ModelStems};
use crate::SeparationError;

/// A source separation service invoked once per model.
pub trait SeparationBackend: Send + Sync {
    fn separate(
        &self,
        audio: &AudioAsset,
        model: &str,
        ctx: &StageContext,
    ) -> Result<ModelStems, SeparationError>;
}

/// Runs the Demucs command line tool and loads the stems it writes.
///
/// Demucs writes `<out>/<model>/<track>/<source>.wav`; sources are loaded in
/// file name order so a model's stem order is stable across runs.
pub struct DemucsCli {
    command: String,
    layout: OutputLayout,
}

impl DemucsCli {
    pub fn new(command: impl Into<String>, layout: OutputLayout) -> Self {
        Self {
            command: command.into(),
            layout,
        }
    }

    fn track_dir(&self, audio: &AudioAsset, model: &str) -> PathBuf {
        self.layout
            .model_dir(model)
            .join(model)
            .join(audio.file_stem())
    }
}

impl SeparationBackend for DemucsCli {
    #[instrument(skip(self, audio, ctx), fields(audio = %audio.path.display()))]
    fn separate(
        &self,
        audio: &AudioAsset,
        model: &str,
        ctx: &StageContext,
    ) -> Result<ModelStems, SeparationError> {
        let invocation_err = |reason: String| SeparationError::ModelInvocation {
            model: model.to_string(),
            reason,
        };
        let model_out = self.layout.model_dir(model);
        std::fs::create_dir_all(&model_out).map_err(|source| SeparationError::Io {
            path: model_out.clone(),
            source,
        })?;
        let track_dir = self.track_dir(audio, model);
        if track_dir.exists() {
            std::fs::remove_dir_all(&track_dir).map_err(|source| SeparationError::Io {
                path: track_dir.clone(),
                source,
            })?;
        }

        let command = ToolCommand::parse(&self.command)
            .arg("-n")
            .arg(model)
            .arg("-o")
            .arg(&model_out)
            .arg(&audio.path);
        let run = command.run(ctx).map_err(|err| match err {
            ToolError::Cancelled { .. } => invocation_err("cancelled".to_string()),
            other => invocation_err(other.to_string()),
        })?;
        if !run.success() {
            return Err(invocation_err(run.failure_reason()));
        }

        let sources = list_wavs(&track_dir).map_err(|source| {
            invocation_err(format!("no stems at {}: {source}", track_dir.display()))
        })?;
        if sources.is_empty() {
            return Err(invocation_err(format!(
                "no stems written to {}",
                track_dir.display()
            )));
        }
        debug!(model, count = sources.len(), "loading stems");

        let decoded = sources
            .iter()
            .map(AudioDecoder::open)
            .collect::<Result<Vec<_>, _>>()?;
        load_model_stems(model, &decoded)
    }
}

fn list_wavs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut wavs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false)
        })
        .collect();
    wavs.sort();
    Ok(wavs)
}

/// Converts decoded stem files of one model into a stem tensor.
pub fn load_model_stems(model: &str, decoded: &[DecodedAudio]) -> Result<ModelStems, SeparationError> {
    let first = decoded.first().ok_or_else(|| SeparationError::ModelInvocation {
        model: model.to_string(),
        reason: "no stems produced".to_string(),
    })?;
    let expected = (first.channels.max(1) as usize, first.frames());
    let mut planar = Vec::with_capacity(decoded.len());
    for stem in decoded {
        let shape = (stem.channels.max(1) as usize, stem.frames());
        if shape != expected {
            return Err(SeparationError::ShapeMismatch {
                model: model.to_string(),
                expected,
                found: shape,
            });
        }
        if stem.sample_rate != first.sample_rate {
            return Err(SeparationError::SampleRateMismatch {
                model: model.to_string(),
                expected: first.sample_rate,
                found: stem.sample_rate,
            });
        }
        let (channels, frames) = shape;
        planar.push(Array2::from_shape_fn((channels, frames), |(c, n)| {
            stem.samples[n * channels + c]
        }));
    }
    let stems = stack_stems(&planar).ok_or_else(|| SeparationError::ShapeMismatch {
        model: model.to_string(),
        expected,
        found: expected,
    })?;
    Ok(ModelStems::new(model, first.sample_rate, stems))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(channels: u16, frames: usize, value: f32) -> DecodedAudio {
        DecodedAudio {
            sample_rate: 44_100,
            channels,
            samples: vec![value; frames * channels as usize],
        }
    }

    #[test]
    fn decoded_stems_become_tensor() {
        let mut left_heavy = decoded(2, 3, 0.0);
        left_heavy.samples = vec![1.0, 0.0, 2.0, 0.0, 3.0, 0.0];
        let stems = load_model_stems("m", &[left_heavy, decoded(2, 3, 0.5)]).unwrap();
        assert_eq!(stems.stems.dim(), (2, 2, 3));
        assert_eq!(stems.stems[[0, 0, 2]], 3.0);
        assert_eq!(stems.stems[[0, 1, 2]], 0.0);
        assert_eq!(stems.stems[[1, 1, 0]], 0.5);
    }

    #[test]
    fn uneven_stem_lengths_are_rejected() {
        let err = load_model_stems("m", &[decoded(2, 3, 0.0), decoded(2, 4, 0.0)]).unwrap_err();
        assert!(matches!(err, SeparationError::ShapeMismatch { .. }));
    }

    #[test]
    fn missing_binary_is_model_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DemucsCli::new("stave-no-such-demucs", OutputLayout::new(dir.path()));
        let audio = AudioAsset::new(dir.path().join("song.norm.wav"), 44_100, 1);
        let err = backend
            .separate(&audio, "htdemucs", &StageContext::default())
            .unwrap_err();
        assert!(
            matches!(err, SeparationError::ModelInvocation { ref model, .. } if model == "htdemucs")
        );
    }

    #[cfg(unix)]
    #[test]
    fn reads_stems_written_by_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&fixture, spec).unwrap();
        for i in 0..32 {
            writer.write_sample(i as f32 / 64.0).unwrap();
            writer.write_sample(0.0f32).unwrap();
        }
        writer.finalize().unwrap();

        let script = dir.path().join("fake-demucs.sh");
        std::fs::write(
            &script,
            format!(
                "model=$2; out=$4; name=$(basename \"$5\" .wav)\n\
                 mkdir -p \"$out/$model/$name\"\n\
                 for s in vocals bass drums other; do cp {} \"$out/$model/$name/$s.wav\"; done\n",
                fixture.display()
            ),
        )
        .unwrap();

        let root = dir.path().join("build");
        let backend = DemucsCli::new(format!("sh {}", script.display()), OutputLayout::new(&root));
        let audio = AudioAsset::new(dir.path().join("song.norm.wav"), 44_100, 1);
        let stems = backend
            .separate(&audio, "htdemucs", &StageContext::default())
            .unwrap();
        assert_eq!(stems.stem_count(), 4);
        assert_eq!(stems.frame_shape(), (2, 32));
        assert_eq!(stems.stems[[3, 0, 4]], 4.0 / 64.0);
        assert!(root.join("stems/htdemucs/htdemucs/song.norm/bass.wav").exists());
    }
}
