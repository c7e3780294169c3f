//! Error types for the conversion pipeline

use speech_engine::EngineError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the individual pipeline components
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Not a readable EPUB document: {0}")]
    DocumentFormat(String),

    #[error("Document contains no narratable text")]
    DocumentEmpty,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Chunk {index} failed after {attempts} attempt(s): {source}")]
    SynthesisEngine {
        index: usize,
        attempts: u32,
        #[source]
        source: EngineError,
    },

    #[error("Chunk {index} was synthesized at {actual} Hz, expected {expected} Hz")]
    SampleRateMismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },

    #[error("Cannot write {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Speech engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Conversion cancelled")]
    Cancelled,
}

impl ConvertError {
    /// Index of the chunk this error concerns, if any
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            ConvertError::SynthesisEngine { index, .. }
            | ConvertError::SampleRateMismatch { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn output_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::OutputWrite {
            path: path.into(),
            source,
        }
    }
}

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configure,
    Extract,
    Chunk,
    Synthesize,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configure => "configure",
            Stage::Extract => "extract",
            Stage::Chunk => "chunk",
            Stage::Synthesize => "synthesize",
            Stage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}

/// A failed conversion, tagged with the stage that failed
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct ConversionFailure {
    pub stage: Stage,
    #[source]
    pub error: ConvertError,
}

impl ConversionFailure {
    pub fn new(stage: Stage, error: ConvertError) -> Self {
        Self { stage, error }
    }

    pub fn chunk_index(&self) -> Option<usize> {
        self.error.chunk_index()
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_names_stage() {
        let failure = ConversionFailure::new(
            Stage::Synthesize,
            ConvertError::SynthesisEngine {
                index: 7,
                attempts: 3,
                source: EngineError::Synthesis("model crashed".into()),
            },
        );
        assert_eq!(
            failure.to_string(),
            "synthesize stage failed: Chunk 7 failed after 3 attempt(s): Synthesis failed: model crashed"
        );
        assert_eq!(failure.chunk_index(), Some(7));
    }

    #[test]
    fn test_chunk_index_absent_for_document_errors() {
        assert_eq!(ConvertError::DocumentEmpty.chunk_index(), None);
        let failure = ConversionFailure::new(Stage::Extract, ConvertError::DocumentEmpty);
        assert_eq!(failure.chunk_index(), None);
        assert_eq!(
            failure.to_string(),
            "extract stage failed: Document contains no narratable text"
        );
    }

    #[test]
    fn test_rate_mismatch_carries_index() {
        let err = ConvertError::SampleRateMismatch {
            index: 2,
            expected: 24_000,
            actual: 22_050,
        };
        assert_eq!(err.chunk_index(), Some(2));
        assert!(err.to_string().contains("22050 Hz"));
    }
}
