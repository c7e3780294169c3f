//! End-to-end conversion: extract, chunk, synthesize, assemble

use crate::audio::{self, AssemblyOptions, BookMetadata};
use crate::epub;
use crate::error::{ConversionFailure, ConvertError, Stage};
use crate::job::ConversionJob;
use crate::synth::{
    AudioSegment, EngineHandle, EngineSession, Orchestrator, RetryPolicy, SynthesisOptions,
    SynthesisProgress,
};
use crate::text::{self, Chunk, TextUnit};
use speech_engine::EngineError;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A finished conversion
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub output: PathBuf,
    pub duration: Duration,
    /// Chunks sent to the engine
    pub chunks: usize,
    /// Chunks left out of the audio (non-strict mode only)
    pub omitted: Vec<usize>,
}

pub type ConversionResult = std::result::Result<ConversionOutcome, ConversionFailure>;

fn at(stage: Stage) -> impl FnOnce(ConvertError) -> ConversionFailure {
    move |error| ConversionFailure::new(stage, error)
}

fn checkpoint(cancel: &CancellationToken, stage: Stage) -> std::result::Result<(), ConversionFailure> {
    if cancel.is_cancelled() {
        log::info!("Conversion cancelled after {} stage", stage);
        return Err(ConversionFailure::new(stage, ConvertError::Cancelled));
    }
    Ok(())
}

/// Errors the engine raises while opening a session. A voice or language it
/// cannot serve is a configuration problem, not a synthesis failure.
fn session_error(err: EngineError) -> ConvertError {
    if err.is_unsupported() {
        ConvertError::InvalidConfig(err.to_string())
    } else {
        ConvertError::Engine(err)
    }
}

/// Run one job to completion against a shared engine
pub async fn convert(
    job: &ConversionJob,
    engine: &EngineHandle,
    cancel: &CancellationToken,
    on_progress: impl FnMut(SynthesisProgress),
) -> ConversionResult {
    job.validate().map_err(at(Stage::Configure))?;
    engine
        .validate(&job.voice, &job.language)
        .map_err(|e| ConvertError::InvalidConfig(e.to_string()))
        .map_err(at(Stage::Configure))?;
    checkpoint(cancel, Stage::Configure)?;

    log::info!(
        "Preparing the {} engine for voice {} ({})",
        engine.name(),
        job.voice,
        job.language
    );
    let session = engine
        .open_session(&job.voice, &job.language)
        .await
        .map_err(session_error)
        .map_err(at(Stage::Configure))?;

    let result = run_stages(job, engine, &session, cancel, on_progress).await;
    session.close().await;
    result
}

async fn run_stages(
    job: &ConversionJob,
    engine: &EngineHandle,
    session: &EngineSession,
    cancel: &CancellationToken,
    on_progress: impl FnMut(SynthesisProgress),
) -> ConversionResult {
    checkpoint(cancel, Stage::Configure)?;

    log::info!("Extracting text from {}", job.input.display());
    let document = epub::extract(&job.input).map_err(at(Stage::Extract))?;
    log::info!(
        "\"{}\" by {}: {} sections, ~{} words",
        document.title,
        document.author.as_deref().unwrap_or("Unknown"),
        document.units.len(),
        document.total_words()
    );
    checkpoint(cancel, Stage::Extract)?;

    let mut chunks = text::chunk(&document.units, job.chunk_size).map_err(at(Stage::Chunk))?;
    if let Some(max) = job.max_chunks {
        if chunks.len() > max {
            log::info!("Narrating only the first {} of {} chunks", max, chunks.len());
            chunks.truncate(max);
        }
    }
    if chunks.is_empty() {
        return Err(ConversionFailure::new(Stage::Chunk, ConvertError::DocumentEmpty));
    }
    log::info!(
        "Split text into {} chunks of at most {} characters",
        chunks.len(),
        job.chunk_size
    );
    checkpoint(cancel, Stage::Chunk)?;

    let options = SynthesisOptions {
        workers: job.workers,
        strict: job.strict,
        retry: RetryPolicy {
            max_attempts: job.max_attempts,
            delay: job.retry_delay,
        },
    };
    log::info!(
        "Synthesizing with the {} engine, voice {} ({} worker(s))",
        engine.name(),
        job.voice,
        job.workers
    );
    let report = Orchestrator::new(session, options, cancel.clone())
        .synthesize(&chunks, on_progress)
        .await
        .map_err(|error| {
            // The engine turning down the voice mid-run is still a configuration error
            let stage = match error {
                ConvertError::InvalidConfig(_) => Stage::Configure,
                _ => Stage::Synthesize,
            };
            ConversionFailure::new(stage, error)
        })?;
    if !report.omitted.is_empty() {
        log::warn!(
            "{} chunk(s) omitted from the output: {:?}",
            report.omitted.len(),
            report.omitted
        );
    }
    checkpoint(cancel, Stage::Synthesize)?;

    let metadata = BookMetadata {
        title: document.title.clone(),
        author: document.author.clone(),
        chapters: chapter_starts(&document.units, &chunks, &report.segments),
    };
    let options = AssemblyOptions {
        pause_ms: job.pause_ms,
        resample: job.resample,
        format: job.format,
        metadata: Some(metadata),
    };
    let output = job.output.clone();
    let sample_rate = job.sample_rate;
    let segments = report.segments;

    let assembled = tokio::task::spawn_blocking(move || {
        audio::assemble(&segments, sample_rate, &output, &options)
    })
    .await
    .map_err(|e| {
        ConvertError::output_write(&job.output, std::io::Error::other(e.to_string()))
    })
    .and_then(|result| result)
    .map_err(at(Stage::Assemble))?;
    log::debug!(
        "Assembled {} samples at {} Hz",
        assembled.sample_count,
        sample_rate
    );

    Ok(ConversionOutcome {
        output: assembled.path,
        duration: assembled.duration,
        chunks: chunks.len(),
        omitted: report.omitted,
    })
}

/// First segment position of each unit that has audio
fn chapter_starts(
    units: &[TextUnit],
    chunks: &[Chunk],
    segments: &[AudioSegment],
) -> Vec<(String, usize)> {
    let mut starts = Vec::new();
    let mut current = None;

    for (position, segment) in segments.iter().enumerate() {
        let Some(unit) = chunks.get(segment.index).map(|c| c.unit_index) else {
            continue;
        };
        if current == Some(unit) {
            continue;
        }
        current = Some(unit);

        let title = units
            .get(unit)
            .and_then(|u| u.title.clone())
            .unwrap_or_else(|| format!("Chapter {}", unit + 1));
        starts.push((title, position));
    }

    starts
}
