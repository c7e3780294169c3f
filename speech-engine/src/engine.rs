use async_trait::async_trait;
use std::io::Cursor;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::voices;

/// Request to synthesize one span of text
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub language: String,
    pub speed: f32,
}

impl SynthesisRequest {
    pub fn new(
        text: impl Into<String>,
        voice: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            language: language.into(),
            speed: 1.0,
        }
    }
}

/// Mono PCM audio produced by an engine
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples in the range [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback length of the waveform
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Decode a WAV file held in memory.
    ///
    /// Integer and float encodings are accepted; multi-channel audio is
    /// downmixed to mono by averaging each frame.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| EngineError::InvalidAudio(format!("not a WAV stream: {}", e)))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| EngineError::InvalidAudio(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| EngineError::InvalidAudio(e.to_string()))?
            }
        };

        let channels = spec.channels.max(1) as usize;
        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        Ok(Self::new(samples, spec.sample_rate))
    }

    /// Encode as a 16-bit mono WAV file in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buffer, spec)
                .map_err(|e| EngineError::InvalidAudio(e.to_string()))?;
            for &sample in &self.samples {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(value)
                    .map_err(|e| EngineError::InvalidAudio(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| EngineError::InvalidAudio(e.to_string()))?;
        }

        Ok(buffer.into_inner())
    }
}

/// Trait for speech synthesis engines
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Synthesize one request into a waveform
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform>;

    /// Check that a voice/language pair can be served before any work starts
    fn validate(&self, voice: &str, language: &str) -> Result<()> {
        voices::validate(voice, language)
    }

    /// Load or warm up whatever the engine needs for this voice and language
    async fn prepare(&self, _voice: &str, _language: &str) -> Result<()> {
        Ok(())
    }

    /// Release resources acquired by `prepare`
    async fn release(&self) {}

    /// Engine name for display
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let wave = Waveform::new(vec![0.0; 12_000], 24_000);
        assert_eq!(wave.duration(), Duration::from_millis(500));
        assert_eq!(Waveform::new(vec![0.0; 10], 0).duration(), Duration::ZERO);
    }

    #[test]
    fn test_wav_bytes_preserve_rate_and_length() {
        let wave = Waveform::new(vec![0.0, 0.5, -0.5, 0.25], 22_050);
        let decoded = Waveform::from_wav_bytes(&wave.to_wav_bytes().unwrap()).unwrap();
        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.samples.len(), 4);
        assert!((decoded.samples[1] - 0.5).abs() < 0.001);
        assert!((decoded.samples[2] + 0.5).abs() < 0.001);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buffer, spec).unwrap();
            for (left, right) in [(0.2f32, 0.4f32), (-1.0, 1.0)] {
                writer.write_sample(left).unwrap();
                writer.write_sample(right).unwrap();
            }
            writer.finalize().unwrap();
        }

        let wave = Waveform::from_wav_bytes(&buffer.into_inner()).unwrap();
        assert_eq!(wave.samples.len(), 2);
        assert!((wave.samples[0] - 0.3).abs() < 1e-6);
        assert!(wave.samples[1].abs() < 1e-6);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = Waveform::from_wav_bytes(b"definitely not audio").unwrap_err();
        assert!(matches!(err, EngineError::InvalidAudio(_)));
    }
}
