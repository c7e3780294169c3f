//! Text processing: cleanup of extracted prose and chunking for synthesis.

pub mod chunker;
mod cleaner;

pub use chunker::chunk;
pub use cleaner::clean_text;

/// Plain text of one readable section of the document, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub index: usize,
    /// Heading found in the section, used for chapter markers
    pub title: Option<String>,
    pub text: String,
}

impl TextUnit {
    pub fn new(index: usize, title: Option<String>, text: impl Into<String>) -> Self {
        Self {
            index,
            title,
            text: text.into(),
        }
    }
}

/// A bounded span of text sent to the engine in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// Unit the chunk starts in
    pub unit_index: usize,
}

impl Chunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
