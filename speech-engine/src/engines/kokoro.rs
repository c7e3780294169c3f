//! Embedded Kokoro engine using PyO3.
//!
//! Drives `kokoro.KPipeline` inside the process. One pipeline is loaded per
//! language code and reused until the engine is released.

use async_trait::async_trait;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::engine::{SynthesisEngine, SynthesisRequest, Waveform};
use crate::error::{EngineError, Result};

/// Kokoro always renders at 24 kHz.
pub const KOKORO_SAMPLE_RATE: u32 = 24_000;

type PipelineCache = Arc<Mutex<HashMap<String, Py<PyAny>>>>;

pub struct KokoroEngine {
    pipelines: PipelineCache,
}

fn py_err(err: PyErr) -> EngineError {
    EngineError::Synthesis(format!("Python error: {}", err))
}

fn poisoned<T>(_: T) -> EngineError {
    EngineError::Synthesis("Kokoro pipeline cache poisoned".into())
}

impl KokoroEngine {
    pub fn new(_config: &EngineConfig) -> Result<Self> {
        pyo3::prepare_freethreaded_python();

        Python::with_gil(|py| py.import("kokoro").map(|_| ())).map_err(|e| {
            EngineError::Unavailable(format!(
                "Python package 'kokoro' is not importable: {}",
                e
            ))
        })?;

        Ok(Self {
            pipelines: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Load (or fetch the cached) pipeline for a language code.
    fn pipeline(cache: &PipelineCache, py: Python<'_>, language: &str) -> Result<Py<PyAny>> {
        if let Some(pipeline) = cache.lock().map_err(poisoned)?.get(language) {
            return Ok(pipeline.clone_ref(py));
        }

        log::info!("Loading Kokoro pipeline for language '{}'", language);
        let kokoro = py.import("kokoro").map_err(py_err)?;
        let kwargs = PyDict::new(py);
        kwargs.set_item("lang_code", language).map_err(py_err)?;
        let pipeline = kokoro
            .getattr("KPipeline")
            .and_then(|class| class.call((), Some(&kwargs)))
            .map_err(|e| EngineError::Unavailable(format!("Failed to load KPipeline: {}", e)))?
            .unbind();

        // The cache lock is never held across Python calls
        cache
            .lock()
            .map_err(poisoned)?
            .insert(language.to_string(), pipeline.clone_ref(py));
        Ok(pipeline)
    }

    fn synthesize_sync(cache: &PipelineCache, request: &SynthesisRequest) -> Result<Waveform> {
        Python::with_gil(|py| {
            let pipeline = Self::pipeline(cache, py, &request.language)?;
            let pipeline = pipeline.bind(py);

            let kwargs = PyDict::new(py);
            kwargs.set_item("voice", &request.voice).map_err(py_err)?;
            kwargs.set_item("speed", request.speed).map_err(py_err)?;

            let generator = pipeline
                .call((request.text.as_str(),), Some(&kwargs))
                .map_err(py_err)?;

            // Each yielded result carries (graphemes, phonemes, audio)
            let mut samples = Vec::new();
            for result in generator.try_iter().map_err(py_err)? {
                let result = result.map_err(py_err)?;
                let audio = match result.getattr("audio") {
                    Ok(audio) => audio,
                    Err(_) => result.get_item(2).map_err(py_err)?,
                };
                if audio.is_none() {
                    continue;
                }
                let audio = match audio.call_method0("cpu") {
                    Ok(cpu) => cpu,
                    Err(_) => audio,
                };
                let part: Vec<f32> = audio
                    .call_method0("tolist")
                    .and_then(|list| list.extract())
                    .map_err(|e| EngineError::InvalidAudio(format!("{}", e)))?;
                samples.extend(part);
            }

            if samples.is_empty() {
                return Err(EngineError::InvalidAudio(
                    "Kokoro produced no audio".into(),
                ));
            }
            Ok(Waveform::new(samples, KOKORO_SAMPLE_RATE))
        })
    }
}

#[async_trait]
impl SynthesisEngine for KokoroEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform> {
        let cache = Arc::clone(&self.pipelines);
        let request = request.clone();
        tokio::task::spawn_blocking(move || Self::synthesize_sync(&cache, &request))
            .await
            .map_err(|e| EngineError::Synthesis(format!("Kokoro task failed: {}", e)))?
    }

    async fn prepare(&self, voice: &str, language: &str) -> Result<()> {
        let cache = Arc::clone(&self.pipelines);
        let voice = voice.to_string();
        let language = language.to_string();
        tokio::task::spawn_blocking(move || {
            Python::with_gil(|py| {
                let pipeline = Self::pipeline(&cache, py, &language)?;
                // Fails when the voice pack cannot be found or downloaded
                pipeline
                    .bind(py)
                    .call_method1("load_voice", (voice.as_str(),))
                    .map(|_| ())
                    .map_err(|e| {
                        log::debug!("Kokoro could not load voice {}: {}", voice, e);
                        EngineError::UnsupportedVoice {
                            voice: voice.clone(),
                            language: language.clone(),
                        }
                    })
            })
        })
        .await
        .map_err(|e| EngineError::Synthesis(format!("Kokoro task failed: {}", e)))?
    }

    async fn release(&self) {
        let cache = Arc::clone(&self.pipelines);
        let released = tokio::task::spawn_blocking(move || {
            Python::with_gil(|py| {
                if let Ok(mut cache) = cache.lock() {
                    cache.clear();
                }
                if let Err(e) = py.import("gc").and_then(|gc| gc.call_method0("collect")) {
                    log::debug!("gc.collect failed: {}", e);
                }
            })
        })
        .await;
        if let Err(e) = released {
            log::warn!("Releasing Kokoro pipelines failed: {}", e);
        }
    }

    fn name(&self) -> &'static str {
        "Kokoro"
    }
}
