//! Audio assembly: joining segments and writing the output file.

pub mod assembler;
mod metadata;

pub use assembler::{AssemblyOptions, assemble};
pub use metadata::BookMetadata;
