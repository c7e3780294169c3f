//! narrator configuration management

use crate::job::{
    ConversionJob, DEFAULT_CHUNK_SIZE, DEFAULT_LANGUAGE, DEFAULT_MAX_ATTEMPTS, DEFAULT_OUTPUT_DIR,
    DEFAULT_PAUSE_MS, DEFAULT_RETRY_DELAY_MS, DEFAULT_SAMPLE_RATE, DEFAULT_VOICE, OutputFormat,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use speech_engine::EngineConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarratorConfig {
    /// Default voice identifier
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Default language code
    #[serde(default = "default_language")]
    pub language: String,

    /// Maximum characters per synthesis request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Output sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Abort when a chunk cannot be synthesized
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Attempts per chunk before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Concurrent synthesis requests per job
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Silence between chunks in milliseconds
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u32,

    /// Resample engine output that arrives at another rate
    #[serde(default)]
    pub resample: bool,

    /// Output format used when the output path doesn't name one
    #[serde(default = "default_format")]
    pub format: String,

    /// Directory for output when no path is given
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Speech engine backend
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_strict() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_workers() -> usize {
    1
}

fn default_pause_ms() -> u32 {
    DEFAULT_PAUSE_MS
}

fn default_format() -> String {
    OutputFormat::default().to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            language: default_language(),
            chunk_size: default_chunk_size(),
            sample_rate: default_sample_rate(),
            strict: default_strict(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            workers: default_workers(),
            pause_ms: default_pause_ms(),
            resample: false,
            format: default_format(),
            output_dir: default_output_dir(),
            engine: EngineConfig::default(),
        }
    }
}

impl NarratorConfig {
    /// Get the config file path: ~/.config/cli-programs/narrator.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home
            .join(".config")
            .join("cli-programs")
            .join("narrator.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: NarratorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        self.format.parse().map_err(anyhow::Error::msg)
    }

    /// A job for `input` carrying this configuration's defaults
    pub fn job_for(&self, input: impl Into<PathBuf>) -> Result<ConversionJob> {
        let format = self.output_format()?;
        Ok(ConversionJob::new(input)
            .with_output(
                self.output_dir
                    .join(format!("output.{}", format.extension())),
            )
            .with_voice(self.voice.clone(), self.language.clone())
            .with_chunk_size(self.chunk_size)
            .with_sample_rate(self.sample_rate)
            .with_strict(self.strict)
            .with_retries(
                self.max_attempts,
                Duration::from_millis(self.retry_delay_ms),
            )
            .with_workers(self.workers)
            .with_pause_ms(self.pause_ms)
            .with_resample(self.resample)
            .with_format(format))
    }
}
