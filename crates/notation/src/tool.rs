use std::path::{Path, PathBuf};

use stave_domain::{StageContext, ToolCommand};
use tracing::instrument;

/// Result of one external conversion attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    ToolSucceeded(PathBuf),
    ToolFailed(String),
}

impl ToolOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ToolOutcome::ToolSucceeded(_))
    }
}

/// An external notation program converting between formats by file extension.
pub trait NotationTool: Send + Sync {
    fn convert(&self, input: &Path, output: &Path, ctx: &StageContext) -> ToolOutcome;
}

/// MuseScore's command line: `mscore -o <output> <input>`.
pub struct MuseScoreCli {
    command: String,
}

impl MuseScoreCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl NotationTool for MuseScoreCli {
    #[instrument(skip(self, ctx))]
    fn convert(&self, input: &Path, output: &Path, ctx: &StageContext) -> ToolOutcome {
        let command = ToolCommand::parse(&self.command)
            .arg("-o")
            .arg(output)
            .arg(input);
        match command.run(ctx) {
            Err(err) => ToolOutcome::ToolFailed(err.to_string()),
            Ok(run) if !run.success() => ToolOutcome::ToolFailed(run.failure_reason()),
            // MuseScore can exit 0 without writing anything
            Ok(_) if !output.is_file() => {
                ToolOutcome::ToolFailed(format!("no output written to {}", output.display()))
            }
            Ok(_) => ToolOutcome::ToolSucceeded(output.to_path_buf()),
        }
    }
}
