//! Per-chunk synthesis with retries, bounded concurrency and cancellation

mod handle;

pub use handle::{EngineHandle, EngineSession};

use crate::error::{ConvertError, Result};
use crate::text::Chunk;
use futures_util::{StreamExt, stream};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Audio for exactly one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub index: usize,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn duration(&self) -> Duration {
        crate::audio::assembler::samples_duration(self.samples.len(), self.sample_rate)
    }
}

/// How often and how patiently a failing chunk is retried
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt`; grows linearly
    fn backoff(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SynthesisOptions {
    pub workers: usize,
    pub strict: bool,
    pub retry: RetryPolicy,
}

/// Segments in chunk order, plus chunks left out in non-strict mode
#[derive(Debug, Default)]
pub struct SynthesisReport {
    pub segments: Vec<AudioSegment>,
    pub omitted: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Drives chunks through an engine session
pub struct Orchestrator<'a> {
    session: &'a EngineSession,
    options: SynthesisOptions,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        session: &'a EngineSession,
        options: SynthesisOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            options,
            cancel,
        }
    }

    /// Synthesize every chunk; segments come back sorted by chunk index
    pub async fn synthesize(
        &self,
        chunks: &[Chunk],
        mut on_progress: impl FnMut(SynthesisProgress),
    ) -> Result<SynthesisReport> {
        let total = chunks.len();
        let mut segments = BTreeMap::new();
        let mut omitted = Vec::new();

        if self.cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let mut results = std::pin::pin!(
            stream::iter(chunks)
                .map(|chunk| self.synthesize_chunk(chunk))
                .buffer_unordered(self.options.workers.max(1))
        );

        loop {
            // Dropping `results` abandons in-flight requests
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ConvertError::Cancelled),
                next = results.next() => next,
            };
            let Some(outcome) = next else {
                break;
            };

            match outcome {
                Ok(segment) => {
                    segments.insert(segment.index, segment);
                }
                Err(err @ ConvertError::SynthesisEngine { .. }) if !self.options.strict => {
                    log::warn!("Omitting chunk from output: {}", err);
                    if let Some(index) = err.chunk_index() {
                        omitted.push(index);
                    }
                }
                Err(err) => return Err(err),
            }

            on_progress(SynthesisProgress {
                completed: segments.len(),
                failed: omitted.len(),
                total,
            });
        }

        omitted.sort_unstable();
        Ok(SynthesisReport {
            segments: segments.into_values().collect(),
            omitted,
        })
    }

    async fn synthesize_chunk(&self, chunk: &Chunk) -> Result<AudioSegment> {
        let policy = self.options.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            log::debug!(
                "Synthesizing chunk {} ({} chars), attempt {}",
                chunk.index,
                chunk.char_len(),
                attempt
            );

            match self.session.synthesize(&chunk.text).await {
                Ok(wave) => {
                    let segment = AudioSegment {
                        index: chunk.index,
                        samples: wave.samples,
                        sample_rate: wave.sample_rate,
                    };
                    log::debug!(
                        "Chunk {} done: {:.2}s of audio",
                        chunk.index,
                        segment.duration().as_secs_f64()
                    );
                    return Ok(segment);
                }
                Err(err) if err.is_unsupported() => {
                    return Err(ConvertError::InvalidConfig(format!(
                        "engine refused chunk {}: {}",
                        chunk.index, err
                    )));
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = policy.backoff(attempt);
                    log::warn!(
                        "Chunk {} attempt {}/{} failed: {}; retrying in {:?}",
                        chunk.index,
                        attempt,
                        max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(ConvertError::SynthesisEngine {
                        index: chunk.index,
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speech_engine::{EngineError, MockEngine};
    use std::sync::Arc;

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                index,
                text: text.to_string(),
                unit_index: 0,
            })
            .collect()
    }

    fn options(workers: usize, strict: bool) -> SynthesisOptions {
        SynthesisOptions {
            workers,
            strict,
            retry: RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(1),
            },
        }
    }

    async fn run(
        engine: Arc<MockEngine>,
        input: &[Chunk],
        options: SynthesisOptions,
    ) -> Result<SynthesisReport> {
        let handle = EngineHandle::new(engine, options.workers);
        let session = handle.open_session("af_heart", "a").await.unwrap();
        let result = Orchestrator::new(&session, options, CancellationToken::new())
            .synthesize(input, |_| {})
            .await;
        session.close().await;
        result
    }

    #[tokio::test]
    async fn test_segments_follow_chunk_order_not_completion_order() {
        let engine = Arc::new(
            MockEngine::new()
                .with_delay("zero", Duration::from_millis(40))
                .with_delay("one", Duration::from_millis(80)),
        );
        let input = chunks(&["Chunk zero.", "Chunk one.", "Chunk two."]);

        let report = run(engine.clone(), &input, options(3, true)).await.unwrap();

        assert_eq!(
            engine.completion_order(),
            vec!["Chunk two.", "Chunk zero.", "Chunk one."]
        );
        let indices: Vec<_> = report.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        for (segment, chunk) in report.segments.iter().zip(&input) {
            assert_eq!(segment.samples, MockEngine::render(&chunk.text));
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let engine = Arc::new(MockEngine::new().fails_then_succeeds("one", 2));
        let input = chunks(&["zero", "one", "two"]);

        let report = run(engine.clone(), &input, options(1, true)).await.unwrap();

        assert_eq!(report.segments.len(), 3);
        assert!(report.omitted.is_empty());
        assert_eq!(engine.calls_for("one"), 3);
    }

    #[tokio::test]
    async fn test_strict_stops_at_terminal_failure() {
        let engine = Arc::new(MockEngine::new().always_fails("one"));
        let input = chunks(&["zero", "one", "two"]);

        let err = run(engine.clone(), &input, options(1, true))
            .await
            .unwrap_err();

        match err {
            ConvertError::SynthesisEngine {
                index,
                attempts,
                source,
            } => {
                assert_eq!(index, 1);
                assert_eq!(attempts, 3);
                assert!(matches!(source, EngineError::Synthesis(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.calls_for("two"), 0);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let engine = Arc::new(MockEngine::new().fails_fatally("one"));
        let input = chunks(&["zero", "one"]);

        let err = run(engine.clone(), &input, options(1, true))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConvertError::SynthesisEngine { attempts: 1, .. }
        ));
        assert_eq!(engine.calls_for("one"), 1);
    }

    #[tokio::test]
    async fn test_non_strict_omits_failed_chunk() {
        let engine = Arc::new(MockEngine::new().always_fails("one"));
        let input = chunks(&["zero", "one", "two"]);

        let report = run(engine, &input, options(2, false)).await.unwrap();

        let indices: Vec<_> = report.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(report.omitted, vec![1]);
    }

    #[tokio::test]
    async fn test_refused_voice_is_fatal_when_lenient() {
        let engine = Arc::new(MockEngine::new().rejects_voice_for("two"));
        let input = chunks(&["zero", "one", "two"]);

        let err = run(engine.clone(), &input, options(1, false))
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::InvalidConfig(_)));
        assert_eq!(engine.calls_for("two"), 1);
    }

    #[tokio::test]
    async fn test_progress_reported_per_chunk() {
        let engine = Arc::new(MockEngine::new().always_fails("one"));
        let handle = EngineHandle::new(engine, 1);
        let session = handle.open_session("af_heart", "a").await.unwrap();
        let input = chunks(&["zero", "one", "two"]);

        let mut seen = Vec::new();
        Orchestrator::new(&session, options(1, false), CancellationToken::new())
            .synthesize(&input, |p| seen.push(p))
            .await
            .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen.last().copied(),
            Some(SynthesisProgress {
                completed: 2,
                failed: 1,
                total: 3
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let engine = Arc::new(MockEngine::new());
        let handle = EngineHandle::new(engine.clone(), 1);
        let session = handle.open_session("af_heart", "a").await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = Orchestrator::new(&session, options(1, true), cancel)
            .synthesize(&chunks(&["zero"]), |_| {})
            .await;

        assert!(matches!(result, Err(ConvertError::Cancelled)));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight_work() {
        let engine = Arc::new(MockEngine::new().with_delay("slow", Duration::from_secs(30)));
        let handle = EngineHandle::new(engine.clone(), 2);
        let session = handle.open_session("af_heart", "a").await.unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let input = chunks(&["slow zero", "slow one", "slow two"]);
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Orchestrator::new(&session, options(2, true), cancel).synthesize(&input, |_| {}),
        )
        .await
        .expect("cancellation should interrupt synthesis");

        assert!(matches!(result, Err(ConvertError::Cancelled)));
        assert!(engine.completion_order().is_empty());
        assert_eq!(engine.calls_for("slow two"), 0);
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(250),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
    }
}
