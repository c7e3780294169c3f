//! narrate - Convert EPUB files into a single narrated audio file

mod audio;
mod config;
mod epub;
mod error;
mod job;
mod pipeline;
mod synth;
mod text;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::NarratorConfig;
use error::{ConversionFailure, ConvertError, Stage};
use indicatif::{ProgressBar, ProgressStyle};
use job::{ConversionJob, OutputFormat};
use speech_engine::{BackendKind, create_engine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use synth::EngineHandle;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "narrate")]
#[command(about = "Convert EPUB files to narrated audio using text-to-speech", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the EPUB file
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (default: audio_output/output.<format>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Voice to narrate with (e.g. af_heart, bm_george)
    #[arg(short, long)]
    voice: Option<String>,

    /// Language code: 'a' American English, 'b' British English, ...
    #[arg(short, long = "lang")]
    language: Option<String>,

    /// Maximum characters per synthesis request
    #[arg(short, long)]
    chunk_size: Option<usize>,

    /// Output sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Only narrate the first N chunks (0 for all)
    #[arg(short, long)]
    max_chunks: Option<usize>,

    /// Output format: wav, mp3 or m4b (default: from the output extension)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Leave out chunks that keep failing instead of aborting
    #[arg(long)]
    skip_failed: bool,

    /// Concurrent synthesis requests
    #[arg(short, long)]
    workers: Option<usize>,

    /// Attempts per chunk before giving up
    #[arg(long)]
    retries: Option<u32>,

    /// Silence between chunks in milliseconds
    #[arg(long)]
    pause_ms: Option<u32>,

    /// Resample engine audio that arrives at a different rate
    #[arg(long)]
    resample: bool,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice
    SetVoice {
        /// Voice identifier
        voice: String,
    },
    /// Set default language code
    SetLanguage {
        /// Language code
        code: String,
    },
    /// Set default chunk size
    SetChunkSize {
        /// Characters per chunk
        size: usize,
    },
    /// Set speech engine backend
    SetBackend {
        /// http, command or kokoro
        backend: BackendKind,
    },
    /// Set base URL of the speech server
    SetBaseUrl {
        /// e.g. http://localhost:8880/v1
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

async fn run(args: Args) -> Result<ExitCode> {
    if let Some(Commands::Config { action }) = &args.command {
        handle_config_command(action)?;
        return Ok(ExitCode::SUCCESS);
    }

    let input = args.input.clone().ok_or_else(|| {
        anyhow::anyhow!("Input EPUB path is required. Run 'narrate --help' for usage.")
    })?;

    let config = NarratorConfig::load().context("Failed to load configuration")?;
    let job = build_job(&args, &config, input)?;

    if args.output.is_none() {
        if let Some(parent) = job.output.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    log::debug!("Job: {:?}", job);
    log::debug!("Engine: {:?}", config.engine);

    let engine = match create_engine(&config.engine) {
        Ok(engine) => engine,
        Err(e) => {
            report_failure(&ConversionFailure::new(
                Stage::Configure,
                ConvertError::Engine(e),
            ));
            return Ok(ExitCode::FAILURE);
        }
    };
    let handle = EngineHandle::new(engine, config.engine.max_concurrent);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling...");
            on_signal.cancel();
        }
    });

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let result = pipeline::convert(&job, &handle, &cancel, |progress| {
        pb.set_length(progress.total as u64);
        pb.set_position((progress.completed + progress.failed) as u64);
        if progress.failed > 0 {
            pb.set_message(format!("{} omitted", progress.failed));
        }
    })
    .await;

    match result {
        Ok(outcome) => {
            pb.finish_and_clear();
            let size_mb = std::fs::metadata(&outcome.output)
                .map(|m| m.len() as f64 / (1024.0 * 1024.0))
                .unwrap_or_default();
            eprintln!(
                "Output: {} ({}, {:.1} MB, {} chunks)",
                outcome.output.display(),
                format_duration(outcome.duration),
                size_mb,
                outcome.chunks
            );
            if !outcome.omitted.is_empty() {
                eprintln!("Omitted chunks: {:?}", outcome.omitted);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            pb.abandon();
            report_failure(&failure);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_failure(failure: &ConversionFailure) {
    eprintln!("error: {}", failure);
    if let Some(index) = failure.chunk_index() {
        eprintln!("failing chunk: {}", index);
    }
}

/// Merge CLI flags over the configuration file
fn build_job(args: &Args, config: &NarratorConfig, input: PathBuf) -> Result<ConversionJob> {
    let mut job = config.job_for(input)?;

    let format = args
        .format
        .or_else(|| args.output.as_deref().and_then(OutputFormat::from_path))
        .unwrap_or(job.format);
    job = job.with_format(format);

    job = match &args.output {
        Some(output) => job.with_output(output.clone()),
        None => job.with_output(
            config
                .output_dir
                .join(format!("output.{}", format.extension())),
        ),
    };

    if args.voice.is_some() || args.language.is_some() {
        let voice = args.voice.clone().unwrap_or_else(|| job.voice.clone());
        let language = args.language.clone().unwrap_or_else(|| job.language.clone());
        job = job.with_voice(voice, language);
    }
    if let Some(size) = args.chunk_size {
        job = job.with_chunk_size(size);
    }
    if let Some(rate) = args.sample_rate {
        job = job.with_sample_rate(rate);
    }
    if args.max_chunks.is_some() {
        job = job.with_max_chunks(args.max_chunks);
    }
    if args.skip_failed {
        job = job.with_strict(false);
    }
    if let Some(workers) = args.workers {
        job = job.with_workers(workers);
    }
    if let Some(retries) = args.retries {
        let delay = job.retry_delay;
        job = job.with_retries(retries, delay);
    }
    if let Some(pause) = args.pause_ms {
        job = job.with_pause_ms(pause);
    }
    if args.resample {
        job = job.with_resample(true);
    }

    Ok(job)
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = NarratorConfig::load()?;
            println!("Configuration file: {:?}", NarratorConfig::config_path()?);
            println!();
            println!("voice = \"{}\"", config.voice);
            println!(
                "language = \"{}\" ({})",
                config.language,
                speech_engine::voices::language_name(&config.language).unwrap_or("unknown")
            );
            println!("chunk_size = {}", config.chunk_size);
            println!("sample_rate = {}", config.sample_rate);
            println!("format = \"{}\"", config.format);
            println!("output_dir = \"{}\"", config.output_dir.display());
            println!("strict = {}", config.strict);
            println!("max_attempts = {}", config.max_attempts);
            println!("workers = {}", config.workers);
            println!("pause_ms = {}", config.pause_ms);
            println!();
            println!("[engine]");
            println!("backend = \"{}\"", config.engine.backend);
            match config.engine.backend {
                BackendKind::Http => {
                    println!("base_url = \"{}\"", config.engine.base_url);
                    println!("model = \"{}\"", config.engine.model);
                    let key = if config.engine.api_key().is_some() {
                        "(set)"
                    } else {
                        "(none)"
                    };
                    println!("api_key = {}", key);
                }
                BackendKind::Command => match &config.engine.command {
                    Some(command) => println!("command = \"{}\"", command.display()),
                    None => println!("command = (none)"),
                },
                BackendKind::Kokoro => {}
            }
        }
        ConfigAction::SetVoice { voice } => {
            let mut config = NarratorConfig::load()?;
            config.voice = voice.clone();
            config.save()?;
            println!("Default voice set to: {}", voice);
        }
        ConfigAction::SetLanguage { code } => {
            if speech_engine::voices::language_name(code).is_none() {
                anyhow::bail!("Unknown language code '{}'", code);
            }
            let mut config = NarratorConfig::load()?;
            config.language = code.clone();
            config.save()?;
            println!("Default language set to: {}", code);
        }
        ConfigAction::SetChunkSize { size } => {
            if *size == 0 {
                anyhow::bail!("Chunk size must be greater than 0");
            }
            let mut config = NarratorConfig::load()?;
            config.chunk_size = *size;
            config.save()?;
            println!("Default chunk size set to: {}", size);
        }
        ConfigAction::SetBackend { backend } => {
            let mut config = NarratorConfig::load()?;
            config.engine.backend = *backend;
            config.save()?;
            println!("Speech engine backend set to: {}", backend);
        }
        ConfigAction::SetBaseUrl { url } => {
            let mut config = NarratorConfig::load()?;
            config.engine.base_url = url.clone();
            config.save()?;
            println!("Speech server URL set to: {}", url);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = parse(&[
            "narrate", "-i", "book.epub", "-v", "bf_emma", "-l", "b", "-c", "500", "-m", "3",
            "--skip-failed",
        ]);
        let job = build_job(&args, &NarratorConfig::default(), "book.epub".into()).unwrap();
        assert_eq!(job.voice, "bf_emma");
        assert_eq!(job.language, "b");
        assert_eq!(job.chunk_size, 500);
        assert_eq!(job.max_chunks, Some(3));
        assert!(!job.strict);
        assert_eq!(job.output, PathBuf::from("audio_output/output.wav"));
    }

    #[test]
    fn test_format_inferred_from_output() {
        let args = parse(&["narrate", "-i", "book.epub", "-o", "out/book.m4b"]);
        let job = build_job(&args, &NarratorConfig::default(), "book.epub".into()).unwrap();
        assert_eq!(job.format, OutputFormat::M4b);
        assert_eq!(job.output, PathBuf::from("out/book.m4b"));
    }

    #[test]
    fn test_explicit_format_names_default_output() {
        let args = parse(&["narrate", "-i", "book.epub", "--format", "mp3"]);
        let job = build_job(&args, &NarratorConfig::default(), "book.epub".into()).unwrap();
        assert_eq!(job.format, OutputFormat::Mp3);
        assert_eq!(job.output, PathBuf::from("audio_output/output.mp3"));
    }

    #[test]
    fn test_config_subcommand_parses() {
        let args = parse(&["narrate", "config", "set-backend", "command"]);
        assert!(matches!(
            args.command,
            Some(Commands::Config {
                action: ConfigAction::SetBackend {
                    backend: BackendKind::Command
                }
            })
        ));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }
}
