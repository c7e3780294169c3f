//! Conversion job description

use crate::error::{ConvertError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OUTPUT_DIR: &str = "audio_output";
pub const DEFAULT_VOICE: &str = "af_heart";
pub const DEFAULT_LANGUAGE: &str = "a";
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;
pub const DEFAULT_PAUSE_MS: u32 = 500;

/// Container written by the assembler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Wav,
    Mp3,
    M4b,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4b => "m4b",
        }
    }

    /// Infer the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(OutputFormat::Wav),
            "mp3" => Ok(OutputFormat::Mp3),
            "m4b" | "m4a" => Ok(OutputFormat::M4b),
            other => Err(format!(
                "unknown output format '{}' (expected wav, mp3 or m4b)",
                other
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Default output location for a format: `audio_output/output.<ext>`
pub fn default_output_path(format: OutputFormat) -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR).join(format!("output.{}", format.extension()))
}

/// Everything one document-to-audio conversion needs to know
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub voice: String,
    pub language: String,
    /// Maximum characters per chunk
    pub chunk_size: usize,
    pub sample_rate: u32,
    /// Abort on the first chunk that cannot be synthesized
    pub strict: bool,
    /// Total attempts per chunk, including the first
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number
    pub retry_delay: Duration,
    /// Concurrent synthesis requests
    pub workers: usize,
    /// Silence inserted between consecutive segments
    pub pause_ms: u32,
    /// Only narrate the first N chunks
    pub max_chunks: Option<usize>,
    /// Resample mismatched segments instead of failing
    pub resample: bool,
    pub format: OutputFormat,
}

impl ConversionJob {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: default_output_path(OutputFormat::default()),
            voice: DEFAULT_VOICE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            strict: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            workers: 1,
            pause_ms: DEFAULT_PAUSE_MS,
            max_chunks: None,
            resample: false,
            format: OutputFormat::default(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>, language: impl Into<String>) -> Self {
        self.voice = voice.into();
        self.language = language.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_retries(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_pause_ms(mut self, pause_ms: u32) -> Self {
        self.pause_ms = pause_ms;
        self
    }

    pub fn with_max_chunks(mut self, max_chunks: Option<usize>) -> Self {
        self.max_chunks = max_chunks.filter(|&n| n > 0);
        self
    }

    pub fn with_resample(mut self, resample: bool) -> Self {
        self.resample = resample;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Check the numeric options before any work starts
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConvertError::InvalidConfig(
                "chunk size must be greater than 0".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(ConvertError::InvalidConfig(
                "sample rate must be greater than 0".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConvertError::InvalidConfig(
                "at least one synthesis attempt is required".into(),
            ));
        }
        if self.workers == 0 {
            return Err(ConvertError::InvalidConfig(
                "worker count must be greater than 0".into(),
            ));
        }
        if self.voice.trim().is_empty() {
            return Err(ConvertError::InvalidConfig("voice must not be empty".into()));
        }
        if self.output.file_name().is_none() {
            return Err(ConvertError::InvalidConfig(format!(
                "output path {} does not name a file",
                self.output.display()
            )));
        }
        Ok(())
    }
}
