use anyhow::{bail, Context, Result};
use automix_analyzer::analysis::load_config;
use automix_analyzer::decode::{decode_to_mono, is_audio_file};
use automix_analyzer::model::{AnalysisRequest, InboundMessage, OutboundMessage};
use automix_analyzer::{AnalysisWorker, AnalyzerConfig, AutoMixAnalyzer};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "automix-analyze")]
#[command(about = "Analyze tracks for automatic crossfading", long_about = None)]
struct Args {
    /// Audio files or directories to analyze
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Analyzer configuration (TOML)
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Skip BPM analysis
    #[arg(long)]
    no_bpm: bool,

    /// Minimum BPM for detection range
    #[arg(long)]
    min_bpm: Option<f64>,

    /// Maximum BPM for detection range
    #[arg(long)]
    max_bpm: Option<f64>,

    /// Loudness target for the gain adjustment (LUFS)
    #[arg(long, allow_hyphen_values = true)]
    target_lufs: Option<f64>,

    /// Linear RMS floor below which the track end counts as silence
    #[arg(long)]
    silence_threshold: Option<f64>,

    /// Number of analysis workers
    #[arg(short = 'w', long, default_value = "2")]
    workers: usize,

    /// Print one JSON object per track instead of a summary line
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Serialize)]
struct OutputLine<'a> {
    path: &'a Path,
    #[serde(flatten)]
    message: &'a OutboundMessage,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }

    let config = match &args.config {
        Some(path) => {
            let path = shellexpand::tilde(path);
            log::info!("Loading config from {}", path);
            load_config(Path::new(path.as_ref()))?
        }
        None => AnalyzerConfig::default(),
    };
    let config = apply_overrides(config, &args);
    config.validate().context("Invalid analyzer settings")?;

    let files = collect_inputs(&args.inputs);
    if files.is_empty() {
        log::warn!("No audio files found");
        return Ok(());
    }
    log::info!("Analyzing {} file(s) with {} worker(s)", files.len(), args.workers);

    let workers = (0..args.workers)
        .map(|i| {
            AnalysisWorker::spawn(
                format!("analysis-worker-{}", i),
                AutoMixAnalyzer::with_config(config.clone()),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let mut analyzed = 0usize;
    let mut failed = 0usize;
    let mut next_id = 0u64;

    // Decode one batch at a time so at most a few tracks are held in memory
    for batch in files.chunks(args.workers * 2) {
        let decoded: Vec<_> = batch
            .par_iter()
            .map(|path| (path, decode_to_mono(path)))
            .collect();

        let mut pending: Vec<Vec<&PathBuf>> = vec![Vec::new(); workers.len()];
        for (path, result) in decoded {
            let audio = match result {
                Ok(audio) => audio,
                Err(e) => {
                    log::warn!("Skipping {:?}: {:#}", path, e);
                    failed += 1;
                    continue;
                }
            };

            log::debug!(
                "Decoded {:?}: {:.1}s @ {} Hz",
                path,
                audio.duration(),
                audio.sample_rate
            );
            let slot = next_id as usize % workers.len();
            let request = AnalysisRequest::new(next_id, audio.samples, audio.sample_rate)
                .with_bpm(!args.no_bpm);
            next_id += 1;
            workers[slot]
                .submit(InboundMessage::Analyze(request))
                .with_context(|| format!("Failed to submit {:?}", path))?;
            pending[slot].push(path);
        }

        for (worker, paths) in workers.iter().zip(&pending) {
            for path in paths {
                let message = worker
                    .recv()
                    .with_context(|| format!("No response for {:?} from {}", path, worker.name()))?;
                if message.is_error() {
                    failed += 1;
                } else {
                    analyzed += 1;
                }
                print_message(path, &message, args.json)?;
            }
        }
    }

    for worker in workers {
        worker.shutdown();
    }

    log::info!("Done: {} analyzed, {} failed", analyzed, failed);
    Ok(())
}

/// Command-line flags take precedence over the config file
fn apply_overrides(mut config: AnalyzerConfig, args: &Args) -> AnalyzerConfig {
    if args.min_bpm.is_some() || args.max_bpm.is_some() {
        let min = args.min_bpm.unwrap_or(config.bpm.min_bpm);
        let max = args.max_bpm.unwrap_or(config.bpm.max_bpm);
        config = config.with_bpm_range(min, max);
        log::info!("BPM detection range: {}-{} BPM", min, max);
    }
    if let Some(target) = args.target_lufs {
        config = config.with_target_lufs(target);
        log::info!("Loudness target: {} LUFS", target);
    }
    if let Some(threshold) = args.silence_threshold {
        config = config.with_silence_threshold(threshold);
    }
    config
}

/// Expand directories into the audio files they contain, sorted per directory
fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        log::warn!("Cannot read directory entry: {}", e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            log::warn!("Input not found: {:?}", input);
        }
    }
    files
}

fn print_message(path: &Path, message: &OutboundMessage, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(&OutputLine { path, message })
            .context("Failed to serialize response")?;
        println!("{}", line);
        return Ok(());
    }

    match message {
        OutboundMessage::Result(response) => {
            let report = &response.report;
            let bpm = report
                .bpm
                .as_ref()
                .map(|b| format!("{:.1} BPM", b.bpm))
                .unwrap_or_else(|| "-- BPM".to_string());
            let outro = report
                .outro
                .as_ref()
                .map(|o| {
                    format!(
                        "{} ({:.2}), crossfade at {:.1}s",
                        o.outro_type, o.outro_confidence, o.suggested_crossfade_start
                    )
                })
                .unwrap_or_else(|| "no outro analysis".to_string());
            println!(
                "{}: {:.1}s, {:.1} LUFS (gain {:.2}), {}, {}",
                path.display(),
                response.duration,
                report.volume.estimated_lufs,
                report.volume.gain_adjustment,
                bpm,
                outro
            );
        }
        OutboundMessage::Error(error) => {
            println!("{}: error: {}", path.display(), error.error);
        }
    }
    Ok(())
}
