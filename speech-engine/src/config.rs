use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::EngineError;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "NARRATOR_TTS_API_KEY";

/// Supported engine backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// OpenAI-compatible `/audio/speech` endpoint
    #[default]
    Http,
    /// External program: text on stdin, WAV on stdout
    Command,
    /// Kokoro pipeline embedded through Python
    Kokoro,
}

impl FromStr for BackendKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" | "openai" => Ok(Self::Http),
            "command" | "cmd" | "process" => Ok(Self::Command),
            "kokoro" => Ok(Self::Kokoro),
            _ => Err(EngineError::Config(format!("Unknown engine backend: {}", s))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Http => "http",
            Self::Command => "command",
            Self::Kokoro => "kokoro",
        };
        f.write_str(name)
    }
}

/// Engine configuration, stored under `[engine]` in the narrator config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the speech server (http backend)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent to the speech server (http backend)
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (optional, can use NARRATOR_TTS_API_KEY instead)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Program to run (command backend); looked up in PATH when not absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<PathBuf>,

    /// Arguments for the program; `{voice}`, `{language}` and `{speed}` are substituted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent requests the engine accepts across all jobs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_base_url() -> String {
    "http://localhost:8880/v1".to_string()
}

fn default_model() -> String {
    "kokoro".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            command: None,
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl EngineConfig {
    /// API key from config, falling back to the environment
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
