use std::path::{Path, PathBuf};
use std::sync::Arc;

use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use ndarray::Array3;
use stave_domain::{
    AudioAsset, PipelineConfig, PipelineEvent, RecordingObserver, StageContext, StemId,
    XmlSource,
};
use stave_notation::{NotationTool, ToolOutcome};
use stave_pipeline::{Backends, Pipeline, PipelineError};
use stave_separation::{ModelStems, SeparationBackend, SeparationError};
use stave_transcriber::{TranscriberError, TranscriptionBackend};

struct FakeDemucs;

impl SeparationBackend for FakeDemucs {
    fn separate(
        &self,
        audio: &AudioAsset,
        model: &str,
        _ctx: &StageContext,
    ) -> Result<ModelStems, SeparationError> {
        let count = match model {
            "m4" => 4,
            "m6" => 6,
            other => {
                return Err(SeparationError::ModelInvocation {
                    model: other.to_string(),
                    reason: "unknown model".to_string(),
                })
            }
        };
        Ok(ModelStems::new(
            model,
            audio.sample_rate,
            Array3::from_elem((count, 1, 256), 0.25),
        ))
    }
}

/// Writes a two-note MIDI under the name basic-pitch would use.
struct FakeBasicPitch;

impl TranscriptionBackend for FakeBasicPitch {
    fn transcribe(
        &self,
        audio: &Path,
        out_dir: &Path,
        _ctx: &StageContext,
    ) -> Result<(), TranscriberError> {
        let stem = audio.file_stem().unwrap().to_string_lossy().into_owned();
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))));
        let mut track = Vec::new();
        for (delta, key, on) in [(0, 60, true), (480, 60, false), (0, 67, true), (480, 67, false)] {
            let (key, vel) = (u7::new(key), u7::new(if on { 100 } else { 0 }));
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: if on {
                        MidiMessage::NoteOn { key, vel }
                    } else {
                        MidiMessage::NoteOff { key, vel }
                    },
                },
            });
        }
        smf.tracks.push(track);
        smf.save(out_dir.join(format!("{stem}_basic_pitch.mid")))
            .unwrap();
        Ok(())
    }

    fn expected_midi_name(&self, audio: &Path) -> Option<String> {
        Some(format!("{}_basic_pitch.mid", audio.file_stem()?.to_string_lossy()))
    }
}

struct WritingTool;

impl NotationTool for WritingTool {
    fn convert(&self, input: &Path, output: &Path, _ctx: &StageContext) -> ToolOutcome {
        std::fs::write(output, format!("from {}", input.display())).unwrap();
        ToolOutcome::ToolSucceeded(output.to_path_buf())
    }
}

struct BrokenTool;

impl NotationTool for BrokenTool {
    fn convert(&self, _input: &Path, _output: &Path, _ctx: &StageContext) -> ToolOutcome {
        ToolOutcome::ToolFailed("mscore: command not found".to_string())
    }
}

fn backends(notation: Arc<dyn NotationTool>) -> Backends {
    Backends {
        separation: Arc::new(FakeDemucs),
        transcription: Arc::new(FakeBasicPitch),
        notation,
    }
}

fn write_song(dir: &Path) -> PathBuf {
    write_wav_named(dir, "song.wav")
}

fn write_wav_named(dir: &Path, file_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for n in 0..4_800 {
        let sample = (n as f32 * 440.0 * std::f32::consts::TAU / 48_000.0).sin();
        let value = (sample * 0.5 * i16::MAX as f32) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        output_root: root.join("build"),
        ..PipelineConfig::default()
    }
}

#[test]
fn main_track_only_with_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path());
    let build = dir.path().join("build");

    let result = Pipeline::new(config(dir.path()), backends(Arc::new(WritingTool)))
        .unwrap()
        .run(&song)
        .unwrap();

    assert_eq!(result.raw_audio, song);
    assert_eq!(result.normalized.path, dir.path().join("song.norm.wav"));
    assert_eq!(result.normalized.channels, 1);
    assert_eq!(result.normalized.sample_rate, 44_100);
    assert_eq!(result.main_midi.midi, build.join("midi/main/song.mid"));
    assert!(result.main_midi.midi.is_file());
    assert_eq!(result.main_xml(), build.join("score/song.musicxml"));
    assert_eq!(result.main_pdf(), Some(build.join("score/song.pdf").as_path()));
    assert!(result.stems.is_empty());
    assert!(result.stems_midi.is_empty());
    assert!(result.stems_notation.is_empty());
}

#[test]
fn fused_stems_are_each_transcribed_and_exported() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path());
    let build = dir.path().join("build");
    let mut config = config(dir.path());
    config.separation.enabled = true;
    config.separation.models = vec!["m4".to_string(), "m6".to_string()];
    config.notation.emit_pdf = false;

    let observer = Arc::new(RecordingObserver::default());
    let result = Pipeline::new(config, backends(Arc::new(WritingTool)))
        .unwrap()
        .with_observer(observer.clone())
        .run(&song)
        .unwrap();

    assert_eq!(result.stems.len(), 6);
    assert_eq!(result.stems_midi.len(), 6);
    assert_eq!(result.stems_notation.len(), 6);
    for index in 0..6 {
        let id = StemId(index);
        let notation = &result.stems_notation[&id];
        assert_eq!(
            notation.musicxml,
            build.join(format!("xml/stem{index}/song_stem{index}.musicxml"))
        );
        assert!(notation.musicxml.is_file());
        assert_eq!(notation.pdf, None);
        assert_eq!(
            result.stems_midi[&id].midi,
            build.join(format!("midi/stem{index}/song_stem{index}.mid"))
        );
    }
    assert!(result.main_midi.midi.is_file());
    assert!(observer
        .events()
        .iter()
        .any(|e| matches!(e, PipelineEvent::StemsFused { models: 2, max_stems: 6 })));
}

#[test]
fn parallel_stems_match_sequential_layout() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path());
    let mut config = config(dir.path());
    config.separation.enabled = true;
    config.separation.models = vec!["m6".to_string()];
    config.parallel_stems = true;

    let result = Pipeline::new(config, backends(Arc::new(WritingTool)))
        .unwrap()
        .run(&song)
        .unwrap();
    assert_eq!(result.stems_notation.len(), 6);
    for (id, notation) in &result.stems_notation {
        assert_eq!(notation.name.hint, format!("song_{id}"));
        assert!(notation.pdf.as_ref().unwrap().is_file());
    }
}

#[test]
fn failing_notation_tool_uses_fallback_and_drops_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path());

    let observer = Arc::new(RecordingObserver::default());
    let result = Pipeline::new(config(dir.path()), backends(Arc::new(BrokenTool)))
        .unwrap()
        .with_observer(observer.clone())
        .run(&song)
        .unwrap();

    assert_eq!(result.main_notation.musicxml_source, XmlSource::Fallback);
    assert_eq!(result.main_pdf(), None);
    let xml = std::fs::read_to_string(result.main_xml()).unwrap();
    assert!(xml.contains("<work-title>song</work-title>"));
    assert!(xml.contains("<step>G</step>"));

    let events = observer.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::FallbackUsed { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::PdfOmitted { .. })));
}

#[test]
fn unknown_model_aborts_without_result() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path());
    let mut config = config(dir.path());
    config.separation.enabled = true;
    config.separation.models = vec!["m4".to_string(), "mystery".to_string()];

    let err = Pipeline::new(config, backends(Arc::new(WritingTool)))
        .unwrap()
        .run(&song)
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Separation(SeparationError::ModelInvocation { .. })
    ));
    assert!(!dir.path().join("build/midi").exists());
}

#[test]
fn rerun_overwrites_previous_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path());
    let pipeline = Pipeline::new(config(dir.path()), backends(Arc::new(WritingTool))).unwrap();

    let first = pipeline.run(&song).unwrap();
    let second = pipeline.run(&song).unwrap();
    assert_eq!(first, second);

    let midi_dir = dir.path().join("build/midi/main");
    let entries: Vec<_> = std::fs::read_dir(midi_dir).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn input_already_named_norm_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let take = write_wav_named(dir.path(), "take.norm.wav");
    let original = std::fs::read(&take).unwrap();
    let build = dir.path().join("build");

    let result = Pipeline::new(config(dir.path()), backends(Arc::new(WritingTool)))
        .unwrap()
        .run(&take)
        .unwrap();

    assert_eq!(result.normalized.path, dir.path().join("take.norm.norm.wav"));
    assert_eq!(std::fs::read(&take).unwrap(), original);
    assert_eq!(result.main_midi.midi, build.join("midi/main/take.mid"));
}

#[test]
fn rerun_with_fewer_stems_removes_extra_stem_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path());
    let build = dir.path().join("build");
    let mut config = config(dir.path());
    config.separation.enabled = true;

    config.separation.models = vec!["m6".to_string()];
    let first = Pipeline::new(config.clone(), backends(Arc::new(WritingTool)))
        .unwrap()
        .run(&song)
        .unwrap();
    assert_eq!(first.stems.len(), 6);
    assert!(build.join("xml/stem5/song_stem5.musicxml").is_file());

    config.separation.models = vec!["m4".to_string()];
    let second = Pipeline::new(config, backends(Arc::new(WritingTool)))
        .unwrap()
        .run(&song)
        .unwrap();
    assert_eq!(second.stems.len(), 4);

    let ensemble: Vec<_> = std::fs::read_dir(build.join("stems/ensemble"))
        .unwrap()
        .collect();
    assert_eq!(ensemble.len(), 4);
    for index in 4..6 {
        for kind in ["midi", "xml", "pdf"] {
            let dir = build.join(format!("{kind}/stem{index}"));
            assert!(!dir.exists(), "{} survived the rerun", dir.display());
        }
    }
    assert!(build.join("xml/stem3/song_stem3.musicxml").is_file());
}
