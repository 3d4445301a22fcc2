use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::tool::CancelToken;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Stage {
    Normalize,
    Separate,
    Transcribe,
    ExportMusicXml,
    ExportPdf,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Normalize => "normalize",
            Stage::Separate => "separate",
            Stage::Transcribe => "transcribe",
            Stage::ExportMusicXml => "musicxml",
            Stage::ExportPdf => "pdf",
        };
        f.write_str(label)
    }
}

/// Progress reported by the stages while a run is in flight.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum PipelineEvent {
    StageStarted {
        stage: Stage,
        track: Option<String>,
    },
    StageFinished {
        stage: Stage,
        track: Option<String>,
        output: Option<PathBuf>,
    },
    ToolInvoked {
        command: String,
    },
    StaleArtifactRemoved {
        path: PathBuf,
    },
    FallbackUsed {
        stage: Stage,
        track: String,
        reason: String,
    },
    PdfOmitted {
        track: String,
        reason: String,
    },
    StemsFused {
        models: usize,
        max_stems: usize,
    },
}

pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Default observer: every event becomes a structured log record.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { stage, track } => {
                info!(%stage, track = track.as_deref().unwrap_or("-"), "stage started");
            }
            PipelineEvent::StageFinished {
                stage,
                track,
                output,
            } => {
                info!(
                    %stage,
                    track = track.as_deref().unwrap_or("-"),
                    output = ?output,
                    "stage finished"
                );
            }
            PipelineEvent::ToolInvoked { command } => info!(%command, "running tool"),
            PipelineEvent::StaleArtifactRemoved { path } => {
                debug!(path = %path.display(), "removed stale artifact");
            }
            PipelineEvent::FallbackUsed {
                stage,
                track,
                reason,
            } => warn!(%stage, %track, %reason, "tool failed, using fallback"),
            PipelineEvent::PdfOmitted { track, reason } => {
                warn!(%track, %reason, "pdf export failed, continuing without pdf");
            }
            PipelineEvent::StemsFused { models, max_stems } => {
                info!(models, max_stems, "fused stem ensemble");
            }
        }
    }
}

/// Keeps every event in memory; handy for tests and summaries.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Shared per-run handles every stage receives.
#[derive(Clone)]
pub struct StageContext {
    observer: Arc<dyn PipelineObserver>,
    cancel: CancelToken,
}

impl StageContext {
    pub fn new(observer: Arc<dyn PipelineObserver>, cancel: CancelToken) -> Self {
        Self { observer, cancel }
    }

    pub fn emit(&self, event: PipelineEvent) {
        self.observer.on_event(&event);
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Default for StageContext {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver), CancelToken::new())
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_observer_keeps_order() {
        let observer = Arc::new(RecordingObserver::default());
        let ctx = StageContext::new(observer.clone(), CancelToken::new());
        ctx.emit(PipelineEvent::StageStarted {
            stage: Stage::Normalize,
            track: None,
        });
        ctx.emit(PipelineEvent::StageFinished {
            stage: Stage::Normalize,
            track: None,
            output: Some(PathBuf::from("song.norm.wav")),
        });
        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            PipelineEvent::StageStarted {
                stage: Stage::Normalize,
                ..
            }
        ));
    }

    #[test]
    fn stage_labels() {
        assert_eq!(Stage::ExportMusicXml.to_string(), "musicxml");
        assert_eq!(Stage::Separate.to_string(), "separate");
    }
}
