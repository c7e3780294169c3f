//! Speech synthesis engines for the narrator workspace
//!
//! Provides a unified interface over several synthesis backends:
//! - OpenAI-compatible speech servers (Kokoro-FastAPI and similar)
//! - Any command that reads text on stdin and writes WAV to stdout
//! - Kokoro embedded through Python (feature `kokoro`)
//! - A scriptable mock engine for tests

pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod voices;

pub use config::{BackendKind, EngineConfig};
pub use engine::{SynthesisEngine, SynthesisRequest, Waveform};
pub use engines::{CommandEngine, HttpEngine, MockEngine, create_engine};
pub use error::{EngineError, Result};
