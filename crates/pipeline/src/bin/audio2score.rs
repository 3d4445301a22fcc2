use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stave_domain::{PipelineConfig, PipelineResult};
use stave_pipeline::{Backends, Pipeline};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Turn an audio recording into MIDI, MusicXML and PDF", long_about = None)]
struct Cli {
    /// Audio file to transcribe
    audio: PathBuf,
    /// YAML configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory receiving every artifact [default: build]
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Split the mix into stems and transcribe each of them
    #[arg(long)]
    stems: bool,
    /// Separation models fused into one stem set [default: htdemucs htdemucs_6s]
    #[arg(long, num_args = 1..)]
    models: Option<Vec<String>>,
    /// Notation tool used for MusicXML and PDF [default: mscore]
    #[arg(long)]
    musescore_cmd: Option<String>,
    /// Skip PDF rendering
    #[arg(long)]
    no_pdf: bool,
    /// Stem separation command [default: demucs]
    #[arg(long)]
    demucs_cmd: Option<String>,
    /// Note transcription command [default: basic-pitch]
    #[arg(long)]
    basic_pitch_cmd: Option<String>,
    /// Keep the transcription model's raw output next to each MIDI file
    #[arg(long)]
    save_model_outputs: bool,
    /// Transcribe and export stems in parallel
    #[arg(long)]
    parallel_stems: bool,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_yaml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = &self.output_dir {
            config.output_root = dir.clone();
        }
        if self.stems {
            config.separation.enabled = true;
        }
        if let Some(models) = &self.models {
            config.separation.models = models.clone();
        }
        if let Some(cmd) = &self.musescore_cmd {
            config.notation.musescore_cmd = cmd.clone();
        }
        if self.no_pdf {
            config.notation.emit_pdf = false;
        }
        if let Some(cmd) = &self.demucs_cmd {
            config.separation.command = cmd.clone();
        }
        if let Some(cmd) = &self.basic_pitch_cmd {
            config.transcription.command = cmd.clone();
        }
        if self.save_model_outputs {
            config.transcription.save_model_outputs = true;
        }
        if self.parallel_stems {
            config.parallel_stems = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config()?;
    let pipeline = Pipeline::new(config.clone(), Backends::from_config(&config))
        .context("invalid pipeline configuration")?;

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping running tools");
            cancel.cancel();
        }
    });

    let audio = cli.audio.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.run(&audio))
        .await
        .context("pipeline worker stopped unexpectedly")?
        .with_context(|| format!("failed to process {}", cli.audio.display()))?;

    println!("=== DONE ===");
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &PipelineResult) {
    println!("normalized: {}", result.normalized.path.display());
    println!("main midi:  {}", result.main_midi.midi.display());
    println!("main xml:   {}", result.main_xml().display());
    match result.main_pdf() {
        Some(pdf) => println!("main pdf:   {}", pdf.display()),
        None => println!("main pdf:   (none)"),
    }
    for (id, notation) in &result.stems_notation {
        let midi = result
            .stems_midi
            .get(id)
            .map(|t| t.midi.display().to_string())
            .unwrap_or_default();
        println!("{id}: {midi} -> {}", notation.musicxml.display());
    }
}
