//! Mock speech engine for testing
//!
//! Produces a deterministic waveform for every text and can be scripted to
//! fail, fail fatally, reject the voice, or stall for requests whose text
//! contains a marker. Whole voices can also be rejected when preparing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::engine::{SynthesisEngine, SynthesisRequest, Waveform};
use crate::error::{EngineError, Result};

/// Sample rate used unless overridden
pub const MOCK_SAMPLE_RATE: u32 = 24_000;

/// Samples rendered per input character
const SAMPLES_PER_CHAR: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Transient,
    Fatal,
    VoiceRejected,
}

#[derive(Debug, Clone, Copy)]
struct FailureRule {
    /// Number of calls that fail before the marker succeeds
    times: usize,
    kind: FailureKind,
}

/// A mock engine for exercising retry, ordering and failure handling
pub struct MockEngine {
    sample_rate: u32,
    failures: Vec<(String, FailureRule)>,
    delays: Vec<(String, Duration)>,
    /// Voices the engine refuses to load
    rejected_voices: Vec<String>,
    /// Total synthesize() calls
    call_count: AtomicUsize,
    /// Calls per request text
    calls_by_text: Mutex<HashMap<String, usize>>,
    /// Texts in the order their synthesis finished successfully
    completions: Mutex<Vec<String>>,
    prepare_count: AtomicUsize,
    release_count: AtomicUsize,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create an engine that always succeeds
    pub fn new() -> Self {
        Self {
            sample_rate: MOCK_SAMPLE_RATE,
            failures: Vec::new(),
            delays: Vec::new(),
            rejected_voices: Vec::new(),
            call_count: AtomicUsize::new(0),
            calls_by_text: Mutex::new(HashMap::new()),
            completions: Mutex::new(Vec::new()),
            prepare_count: AtomicUsize::new(0),
            release_count: AtomicUsize::new(0),
        }
    }

    /// Report audio at a different sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    fn with_rule(mut self, marker: &str, times: usize, kind: FailureKind) -> Self {
        self.failures
            .push((marker.to_string(), FailureRule { times, kind }));
        self
    }

    /// Fail `times` calls for texts containing `marker`, then succeed
    pub fn fails_then_succeeds(self, marker: &str, times: usize) -> Self {
        self.with_rule(marker, times, FailureKind::Transient)
    }

    /// Always fail (retryably) for texts containing `marker`
    pub fn always_fails(self, marker: &str) -> Self {
        self.fails_then_succeeds(marker, usize::MAX)
    }

    /// Always fail with a non-retryable error for texts containing `marker`
    pub fn fails_fatally(self, marker: &str) -> Self {
        self.with_rule(marker, usize::MAX, FailureKind::Fatal)
    }

    /// Report the request's voice as unsupported for texts containing `marker`
    pub fn rejects_voice_for(self, marker: &str) -> Self {
        self.with_rule(marker, usize::MAX, FailureKind::VoiceRejected)
    }

    /// Refuse `voice` in `prepare` and `synthesize`, though it passes `validate`
    pub fn rejects_voice(mut self, voice: &str) -> Self {
        self.rejected_voices.push(voice.to_string());
        self
    }

    /// Delay responses for texts containing `marker`
    pub fn with_delay(mut self, marker: &str, delay: Duration) -> Self {
        self.delays.push((marker.to_string(), delay));
        self
    }

    /// Get the number of times synthesize() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of calls made for texts containing `marker`
    pub fn calls_for(&self, marker: &str) -> usize {
        self.calls_by_text
            .lock()
            .unwrap()
            .iter()
            .filter(|(text, _)| text.contains(marker))
            .map(|(_, count)| count)
            .sum()
    }

    /// Texts in the order their synthesis completed
    pub fn completion_order(&self) -> Vec<String> {
        self.completions.lock().unwrap().clone()
    }

    pub fn prepare_count(&self) -> usize {
        self.prepare_count.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    /// The samples this engine produces for `text`.
    ///
    /// Every text maps to a constant level derived from its bytes, so
    /// segments from different chunks are distinguishable after assembly.
    pub fn render(text: &str) -> Vec<f32> {
        let hash = text
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
                (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
            });
        let level = (hash % 1000) as f32 / 1000.0 - 0.5;
        vec![level; text.chars().count() * SAMPLES_PER_CHAR]
    }

    fn voice_rejection(&self, voice: &str, language: &str) -> Option<EngineError> {
        self.rejected_voices
            .iter()
            .any(|v| v == voice)
            .then(|| EngineError::UnsupportedVoice {
                voice: voice.to_string(),
                language: language.to_string(),
            })
    }

    fn failure_for(&self, request: &SynthesisRequest, call_num: usize) -> Option<EngineError> {
        let (marker, rule) = self
            .failures
            .iter()
            .find(|(marker, _)| request.text.contains(marker.as_str()))?;

        if call_num >= rule.times {
            return None;
        }

        Some(match rule.kind {
            FailureKind::Transient => EngineError::Synthesis(format!(
                "mock failure {} for '{}'",
                call_num + 1,
                marker
            )),
            FailureKind::Fatal => {
                EngineError::Config(format!("mock fatal failure for '{}'", marker))
            }
            FailureKind::VoiceRejected => EngineError::UnsupportedVoice {
                voice: request.voice.clone(),
                language: request.language.clone(),
            },
        })
    }
}

#[async_trait]
impl SynthesisEngine for MockEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let call_num = {
            let mut calls = self.calls_by_text.lock().unwrap();
            let count = calls.entry(request.text.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };

        if let Some((_, delay)) = self
            .delays
            .iter()
            .find(|(marker, _)| request.text.contains(marker.as_str()))
        {
            tokio::time::sleep(*delay).await;
        }

        if let Some(error) = self
            .voice_rejection(&request.voice, &request.language)
            .or_else(|| self.failure_for(request, call_num))
        {
            return Err(error);
        }

        self.completions.lock().unwrap().push(request.text.clone());
        Ok(Waveform::new(Self::render(&request.text), self.sample_rate))
    }

    async fn prepare(&self, voice: &str, language: &str) -> Result<()> {
        self.prepare_count.fetch_add(1, Ordering::SeqCst);
        match self.voice_rejection(voice, language) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn release(&self) {
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
