//! # Context Code Chunker
//!
//! Language-aware, offset-exact chunking of container files that may mix
//! several languages (Markdown with fenced code, Vue/Svelte/Astro components,
//! JSX/TSX templates).
//!
//! ## Architecture
//!
//! ```text
//! File text + extension
//!     │
//!     ├──> Segment Discovery (per container format)
//!     │    ├─> Markdown/MDX: frontmatter, fences, inline code, prose gaps
//!     │    ├─> Vue / Svelte / Astro: tag scanner → embedded blocks
//!     │    ├─> JSX/TSX: tree-sitter JSX ranges, merged
//!     │    └─> Default: whole file
//!     │
//!     ├──> Chunk Assembly (per segment)
//!     │    ├─> StructuralChunker on segment-local text
//!     │    ├─> Offsets + line numbers → container coordinates
//!     │    └─> Global (start, end) ordering
//!     │
//!     └──> Chunk[] with segment back-references
//! ```
//!
//! ## Example
//!
//! ```rust
//! use context_code_chunker::{
//!     build_line_index, chunk_segments, discover_segments, AssemblyRequest, AstChunker,
//!     DiscoverRequest, FileMode, SegmentsConfig, TreeSitterPass,
//! };
//!
//! let text = "# Guide\n\n```tsx\nconst View = () => <div />;\n```\n";
//! let config = SegmentsConfig::default();
//! let segments = discover_segments(&DiscoverRequest::new(text, ".md", "guide.md", &config)).unwrap();
//!
//! let line_index = build_line_index(text);
//! let pass = TreeSitterPass::enabled();
//! let request = AssemblyRequest {
//!     text,
//!     ext: ".md",
//!     rel_path: "guide.md",
//!     mode: FileMode::Code,
//!     segments: &segments,
//!     line_index: &line_index,
//!     tree_sitter: &pass,
//! };
//! let chunks = chunk_segments(&request, &AstChunker::default(), &mut tree_sitter::Parser::new()).unwrap();
//! assert_eq!(chunks[0].language_id(), Some("tsx"));
//! ```

mod assembly;
mod ast_analyzer;
mod chunker;
mod config;
mod error;
mod language;
mod line_index;
mod segments;
mod strategy;
mod types;

pub use assembly::{
    chunk_segment, chunk_segments, resolve_segment_ext, resolve_segment_token_mode,
    should_index_segment, sort_chunks, AssemblyRequest,
};
pub use chunker::{
    AstChunker, ChunkRequest, GrammarSource, PassLimits, StructuralChunker, TreeSitterPass,
};
pub use config::{ChunkerConfig, ChunkingStrategy, OverlapStrategy, SegmentsConfig};
pub use error::{ChunkerError, Result, SegmentError};
pub use language::{language_ext, resolve_tree_sitter_language, Language, TREE_SITTER_LANGUAGE_IDS};
pub use line_index::{build_line_index, line_count, offset_to_line};
pub use segments::{
    assign_segment_ids, detect_frontmatter, discover_segments, finalize_segments, segment_id,
    Container, DiscoverRequest, Frontmatter,
};
pub use strategy::HeuristicChunker;
pub use types::{
    Chunk, ChunkMeta, ChunkType, EmbeddingContext, FileMode, LocalChunk, MetaMap, Segment,
    SegmentRef, SegmentType, TokenMode,
};
