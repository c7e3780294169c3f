//! Subprocess speech engine
//!
//! Runs a configured program once per request. The text is written to the
//! program's stdin and a WAV stream is read back from its stdout.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::EngineConfig;
use crate::engine::{SynthesisEngine, SynthesisRequest, Waveform};
use crate::error::{EngineError, Result};

/// Engine that shells out to an external synthesizer
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandEngine {
    /// Create a new command engine
    ///
    /// Returns an error if the program cannot be found.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let program = config.command.clone().ok_or_else(|| {
            EngineError::Config("command backend requires `command` to be set".into())
        })?;

        let program = if program.components().count() > 1 {
            if !program.exists() {
                return Err(EngineError::Unavailable(format!(
                    "synthesizer not found at {}",
                    program.display()
                )));
            }
            program
        } else {
            which::which(&program).map_err(|_| {
                EngineError::Unavailable(format!(
                    "synthesizer '{}' not found in PATH",
                    program.display()
                ))
            })?
        };

        Ok(Self {
            program,
            args: config.args.clone(),
            timeout: config.timeout(),
        })
    }

    /// Arguments with request placeholders filled in
    fn expand_args(&self, request: &SynthesisRequest) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{voice}", &request.voice)
                    .replace("{language}", &request.language)
                    .replace("{speed}", &request.speed.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl SynthesisEngine for CommandEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform> {
        let mut child = Command::new(&self.program)
            .args(self.expand_args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Synthesis(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let text = request.text.clone().into_bytes();
            tokio::spawn(async move {
                // A synthesizer that exits early closes the pipe; its exit status reports why.
                let _ = stdin.write_all(&text).await;
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                EngineError::Synthesis(format!(
                    "{} timed out after {}s",
                    self.program.display(),
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Synthesis(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        Waveform::from_wav_bytes(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
