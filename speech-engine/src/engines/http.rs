//! OpenAI-compatible speech engine
//!
//! Talks to servers implementing `POST /audio/speech`, such as
//! Kokoro-FastAPI. Audio is requested as WAV and decoded in-process.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::engine::{SynthesisEngine, SynthesisRequest, Waveform};
use crate::error::{EngineError, Result};

/// Engine backed by an OpenAI-compatible speech endpoint
pub struct HttpEngine {
    model: String,
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            client,
        })
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
    speed: f32,
    lang_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Extract a readable message from an error body
fn error_message(body: &str) -> String {
    if let Ok(response) = serde_json::from_str::<ErrorResponse>(body) {
        return response.error.message;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail") {
            return match detail.as_str() {
                Some(s) => s.to_string(),
                None => detail.to_string(),
            };
        }
    }
    body.trim().to_string()
}

#[async_trait]
impl SynthesisEngine for HttpEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform> {
        let body = SpeechRequest {
            model: &self.model,
            input: &request.text,
            voice: &request.voice,
            response_format: "wav",
            speed: request.speed,
            lang_code: &request.language,
        };

        let mut builder = self.client.post(self.speech_url()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| EngineError::Request {
            message: format!("Request failed: {}", e),
            status_code: None,
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Request {
                message: error_message(&error_text),
                status_code: Some(status.as_u16()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| EngineError::Request {
            message: format!("Failed to read response body: {}", e),
            status_code: None,
        })?;

        Waveform::from_wav_bytes(&bytes)
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}
