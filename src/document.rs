//! Contract text preparation: segmentation and chunking.

pub mod chunker;
pub mod segmenter;
pub mod sentences;

pub use chunker::{build_chunks, Chunk, ChunkingConfig, OverlapEcho};
pub use segmenter::{segment, Paragraph, SegmenterConfig};
