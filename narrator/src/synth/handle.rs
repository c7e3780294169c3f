//! Shared access to a speech engine

use speech_engine::{EngineError, SynthesisEngine, SynthesisRequest, Waveform};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Process-wide handle to one engine instance.
///
/// Cloning is cheap; all clones share the same permit pool, which bounds the
/// number of requests in flight across every job using the engine. The
/// engine is released only when the last open session closes.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn SynthesisEngine>,
    permits: Arc<Semaphore>,
    open_sessions: Arc<Mutex<usize>>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn SynthesisEngine>, max_concurrent: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            open_sessions: Arc::new(Mutex::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.engine.name()
    }

    /// Check a voice/language pair without loading anything
    pub fn validate(&self, voice: &str, language: &str) -> speech_engine::Result<()> {
        self.engine.validate(voice, language)
    }

    /// Prepare the engine for one job's voice and language
    pub async fn open_session(
        &self,
        voice: &str,
        language: &str,
    ) -> speech_engine::Result<EngineSession> {
        // Held across prepare so a concurrent close cannot release underneath it
        let mut open = self.open_sessions.lock().await;
        log::debug!("Preparing {} engine for voice {}", self.engine.name(), voice);
        if let Err(err) = self.engine.prepare(voice, language).await {
            if *open == 0 {
                self.engine.release().await;
            }
            return Err(err);
        }
        *open += 1;

        Ok(EngineSession {
            handle: self.clone(),
            voice: voice.to_string(),
            language: language.to_string(),
        })
    }
}

/// A job's scoped use of the engine, between `open_session` and `close`
pub struct EngineSession {
    handle: EngineHandle,
    voice: String,
    language: String,
}

impl EngineSession {
    /// Synthesize one text, waiting for an engine permit first
    pub async fn synthesize(&self, text: &str) -> speech_engine::Result<Waveform> {
        let _permit = self
            .handle
            .permits
            .acquire()
            .await
            .map_err(|_| EngineError::Unavailable("engine handle closed".into()))?;

        let request = SynthesisRequest::new(text, self.voice.as_str(), self.language.as_str());
        self.handle.engine.synthesize(&request).await
    }

    /// End this session; the engine is released once no session remains
    pub async fn close(self) {
        let mut open = self.handle.open_sessions.lock().await;
        *open = open.saturating_sub(1);
        if *open == 0 {
            log::debug!("Releasing {} engine", self.handle.engine.name());
            self.handle.engine.release().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speech_engine::MockEngine;

    #[tokio::test]
    async fn test_session_prepares_and_releases() {
        let engine = Arc::new(MockEngine::new());
        let handle = EngineHandle::new(engine.clone(), 1);

        let session = handle.open_session("af_heart", "a").await.unwrap();
        assert_eq!(engine.prepare_count(), 1);

        let wave = session.synthesize("Hello.").await.unwrap();
        assert_eq!(wave.samples, MockEngine::render("Hello."));

        session.close().await;
        assert_eq!(engine.release_count(), 1);
    }

    #[tokio::test]
    async fn test_release_waits_for_last_session() {
        let engine = Arc::new(MockEngine::new());
        let handle = EngineHandle::new(engine.clone(), 2);

        let first = handle.open_session("af_heart", "a").await.unwrap();
        let second = handle.clone().open_session("bf_emma", "b").await.unwrap();
        assert_eq!(engine.prepare_count(), 2);

        first.close().await;
        assert_eq!(engine.release_count(), 0);
        assert!(second.synthesize("Still here.").await.is_ok());

        second.close().await;
        assert_eq!(engine.release_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_prepare_opens_no_session() {
        let engine = Arc::new(MockEngine::new().rejects_voice("af_nosuchvoice"));
        let handle = EngineHandle::new(engine.clone(), 1);

        let err = handle.open_session("af_nosuchvoice", "a").await.err().unwrap();
        assert!(err.is_unsupported());
        assert_eq!(engine.release_count(), 1);

        let session = handle.open_session("af_heart", "a").await.unwrap();
        session.close().await;
        assert_eq!(engine.release_count(), 2);
    }

    #[test]
    fn test_validate_delegates_to_engine() {
        let handle = EngineHandle::new(Arc::new(MockEngine::new()), 1);
        assert!(handle.validate("af_heart", "a").is_ok());
        assert!(handle.validate("bf_emma", "a").is_err());
    }

    #[tokio::test]
    async fn test_permits_are_shared_between_clones() {
        let handle = EngineHandle::new(Arc::new(MockEngine::new()), 2);
        let other = handle.clone();
        let held = handle.permits.clone().acquire_many_owned(2).await.unwrap();
        assert_eq!(other.permits.available_permits(), 0);
        drop(held);
        assert_eq!(other.permits.available_permits(), 2);
    }
}
