use std::path::{Path, PathBuf};
use std::sync::Arc;

use stave_domain::{
    NotationArtifact, OutputLayout, PipelineEvent, Stage, StageContext, TrackName, XmlSource,
};
use tracing::{instrument, warn};

use crate::fallback::FallbackConverter;
use crate::tool::{NotationTool, ToolOutcome};
use crate::NotationError;

/// MIDI → MusicXML (tool, then fallback) → optional PDF (tool only).
pub struct NotationExporter {
    tool: Arc<dyn NotationTool>,
    fallback: FallbackConverter,
    layout: OutputLayout,
}

impl NotationExporter {
    pub fn new(tool: Arc<dyn NotationTool>, layout: OutputLayout, fallback_divisions: u32) -> Self {
        Self {
            tool,
            fallback: FallbackConverter::new(fallback_divisions),
            layout,
        }
    }

    #[instrument(skip(self, ctx), fields(track = %name))]
    pub fn export(
        &self,
        midi: &Path,
        name: &TrackName,
        emit_pdf: bool,
        ctx: &StageContext,
    ) -> Result<NotationArtifact, NotationError> {
        let musicxml = self.layout.musicxml_path(name);
        let pdf = self.layout.pdf_path(name);
        prepare_target(&musicxml, ctx)?;
        remove_stale(&pdf, ctx)?;

        ctx.emit(PipelineEvent::StageStarted {
            stage: Stage::ExportMusicXml,
            track: Some(name.hint.clone()),
        });
        let musicxml_source = match self.tool.convert(midi, &musicxml, ctx) {
            ToolOutcome::ToolSucceeded(_) => XmlSource::Tool,
            ToolOutcome::ToolFailed(_) if ctx.cancel_token().is_cancelled() => {
                return Err(NotationError::Cancelled);
            }
            ToolOutcome::ToolFailed(reason) => {
                warn!(%reason, "notation tool failed, converting MIDI directly");
                ctx.emit(PipelineEvent::FallbackUsed {
                    stage: Stage::ExportMusicXml,
                    track: name.hint.clone(),
                    reason,
                });
                // a tool may leave a partial file behind before failing
                remove_stale(&musicxml, ctx)?;
                self.fallback.convert_file(midi, &musicxml, &name.hint)?;
                XmlSource::Fallback
            }
        };
        ctx.emit(PipelineEvent::StageFinished {
            stage: Stage::ExportMusicXml,
            track: Some(name.hint.clone()),
            output: Some(musicxml.clone()),
        });

        let pdf = if emit_pdf {
            self.render_pdf(&musicxml, &pdf, name, ctx)?
        } else {
            None
        };

        Ok(NotationArtifact {
            name: name.clone(),
            musicxml,
            musicxml_source,
            pdf,
        })
    }

    fn render_pdf(
        &self,
        musicxml: &Path,
        pdf: &Path,
        name: &TrackName,
        ctx: &StageContext,
    ) -> Result<Option<PathBuf>, NotationError> {
        ctx.emit(PipelineEvent::StageStarted {
            stage: Stage::ExportPdf,
            track: Some(name.hint.clone()),
        });
        prepare_target(pdf, ctx)?;
        match self.tool.convert(musicxml, pdf, ctx) {
            ToolOutcome::ToolSucceeded(path) => {
                ctx.emit(PipelineEvent::StageFinished {
                    stage: Stage::ExportPdf,
                    track: Some(name.hint.clone()),
                    output: Some(path.clone()),
                });
                Ok(Some(path))
            }
            ToolOutcome::ToolFailed(_) if ctx.cancel_token().is_cancelled() => {
                Err(NotationError::Cancelled)
            }
            ToolOutcome::ToolFailed(reason) => {
                remove_stale(pdf, ctx)?;
                ctx.emit(PipelineEvent::PdfOmitted {
                    track: name.hint.clone(),
                    reason,
                });
                Ok(None)
            }
        }
    }
}

/// Creates the parent directory and removes any earlier output at `path`.
fn prepare_target(path: &Path, ctx: &StageContext) -> Result<(), NotationError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(NotationError::io(parent))?;
    }
    remove_stale(path, ctx)
}

fn remove_stale(path: &Path, ctx: &StageContext) -> Result<(), NotationError> {
    if path.is_file() {
        std::fs::remove_file(path).map_err(NotationError::io(path))?;
        ctx.emit(PipelineEvent::StaleArtifactRemoved {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use midly::num::{u15, u28, u4, u7};
    use midly::{Format, Header, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
    use stave_domain::{RecordingObserver, StemId};

    /// Succeeds for the extensions listed in `works_for`, recording every call.
    struct ScriptedTool {
        works_for: Vec<&'static str>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTool {
        fn new(works_for: Vec<&'static str>) -> Self {
            Self {
                works_for,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl NotationTool for ScriptedTool {
        fn convert(&self, input: &Path, output: &Path, _ctx: &StageContext) -> ToolOutcome {
            let ext = output
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.calls
                .lock()
                .unwrap()
                .push((input.display().to_string(), ext.clone()));
            if self.works_for.iter().any(|works| *works == ext) {
                std::fs::write(output, format!("converted {ext}")).unwrap();
                ToolOutcome::ToolSucceeded(output.to_path_buf())
            } else {
                ToolOutcome::ToolFailed(format!("cannot write {ext}"))
            }
        }
    }

    fn write_midi(path: &Path) {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))));
        let on = TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(62),
                vel: u7::new(80),
            },
        };
        let off = TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(62),
                vel: u7::new(0),
            },
        };
        smf.tracks.push(vec![
            TrackEvent {
                delta: u28::new(0),
                kind: on,
            },
            TrackEvent {
                delta: u28::new(960),
                kind: off,
            },
        ]);
        smf.save(path).unwrap();
    }

    fn setup(tool: ScriptedTool) -> (tempfile::TempDir, Arc<ScriptedTool>, NotationExporter) {
        let dir = tempfile::tempdir().unwrap();
        let tool = Arc::new(tool);
        let exporter = NotationExporter::new(tool.clone(), OutputLayout::new(dir.path()), 4);
        (dir, tool, exporter)
    }

    #[test]
    fn tool_path_produces_xml_and_pdf() {
        let (dir, tool, exporter) = setup(ScriptedTool::new(vec!["musicxml", "pdf"]));
        let midi = dir.path().join("song.mid");
        write_midi(&midi);

        let artifact = exporter
            .export(&midi, &TrackName::main("song"), true, &StageContext::default())
            .unwrap();
        assert_eq!(artifact.musicxml, dir.path().join("score/song.musicxml"));
        assert_eq!(artifact.musicxml_source, XmlSource::Tool);
        assert_eq!(artifact.pdf, Some(dir.path().join("score/song.pdf")));

        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0.ends_with("song.musicxml"));
    }

    #[test]
    fn failing_tool_falls_back_and_omits_pdf() {
        let (dir, _tool, exporter) = setup(ScriptedTool::new(vec![]));
        let midi = dir.path().join("song.mid");
        write_midi(&midi);
        let observer = Arc::new(RecordingObserver::default());
        let ctx = StageContext::new(observer.clone(), Default::default());

        let artifact = exporter
            .export(&midi, &TrackName::main("song"), true, &ctx)
            .unwrap();
        assert_eq!(artifact.musicxml_source, XmlSource::Fallback);
        assert_eq!(artifact.pdf, None);
        let xml = std::fs::read_to_string(&artifact.musicxml).unwrap();
        assert!(xml.contains("<step>D</step>"));
        assert!(!dir.path().join("score/song.pdf").exists());

        let events = observer.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::FallbackUsed { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::PdfOmitted { .. })));
    }

    #[test]
    fn pdf_step_skipped_when_not_requested() {
        let (dir, tool, exporter) = setup(ScriptedTool::new(vec!["musicxml", "pdf"]));
        let midi = dir.path().join("song.mid");
        write_midi(&midi);

        let artifact = exporter
            .export(&midi, &TrackName::main("song"), false, &StageContext::default())
            .unwrap();
        assert_eq!(artifact.pdf, None);
        assert_eq!(tool.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn stale_pdf_is_not_reported_after_failure() {
        let (dir, _tool, exporter) = setup(ScriptedTool::new(vec!["musicxml"]));
        let midi = dir.path().join("song.mid");
        write_midi(&midi);
        let name = TrackName::stem("song", StemId(3));
        let stale = dir.path().join("pdf/stem3/song_stem3.pdf");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        let artifact = exporter
            .export(&midi, &name, true, &StageContext::default())
            .unwrap();
        assert_eq!(
            artifact.musicxml,
            dir.path().join("xml/stem3/song_stem3.musicxml")
        );
        assert_eq!(artifact.pdf, None);
        assert!(!stale.exists());
    }

    #[test]
    fn cancelled_run_does_not_fall_back() {
        let (dir, _tool, exporter) = setup(ScriptedTool::new(vec![]));
        let midi = dir.path().join("song.mid");
        write_midi(&midi);
        let ctx = StageContext::default();
        ctx.cancel_token().cancel();

        let err = exporter
            .export(&midi, &TrackName::main("song"), true, &ctx)
            .unwrap_err();
        assert!(matches!(err, NotationError::Cancelled));
        assert!(!dir.path().join("score/song.musicxml").exists());
    }
}
