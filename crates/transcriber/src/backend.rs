use std::path::Path;

use stave_domain::{StageContext, ToolCommand};
use tracing::instrument;

use crate::TranscriberError;

/// A note transcription service. Writes its outputs into `out_dir` under
/// names of its own choosing.
pub trait TranscriptionBackend: Send + Sync {
    fn transcribe(
        &self,
        audio: &Path,
        out_dir: &Path,
        ctx: &StageContext,
    ) -> Result<(), TranscriberError>;

    /// File name the service is expected to give the MIDI for `audio`, if known.
    fn expected_midi_name(&self, _audio: &Path) -> Option<String> {
        None
    }
}

/// Runs the `basic-pitch` command line tool.
pub struct BasicPitchCli {
    command: String,
    save_model_outputs: bool,
}

impl BasicPitchCli {
    pub const MIDI_SUFFIX: &'static str = "_basic_pitch.mid";

    pub fn new(command: impl Into<String>, save_model_outputs: bool) -> Self {
        Self {
            command: command.into(),
            save_model_outputs,
        }
    }
}

impl TranscriptionBackend for BasicPitchCli {
    #[instrument(skip(self, ctx))]
    fn transcribe(
        &self,
        audio: &Path,
        out_dir: &Path,
        ctx: &StageContext,
    ) -> Result<(), TranscriberError> {
        let mut command = ToolCommand::parse(&self.command).arg("--save-midi");
        if self.save_model_outputs {
            command = command.arg("--save-model-outputs");
        }
        let command = command.arg(out_dir).arg(audio);
        let service_err = |reason: String| TranscriberError::Service {
            command: command.to_string(),
            reason,
        };

        let run = command.run(ctx).map_err(|err| service_err(err.to_string()))?;
        if !run.success() {
            return Err(service_err(run.failure_reason()));
        }
        Ok(())
    }

    fn expected_midi_name(&self, audio: &Path) -> Option<String> {
        let stem = audio.file_stem()?.to_string_lossy();
        Some(format!("{stem}{}", Self::MIDI_SUFFIX))
    }
}
