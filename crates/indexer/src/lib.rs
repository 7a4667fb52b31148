//! # Context Indexer
//!
//! File-level orchestration on top of `context-code-chunker`: grammar
//! scheduling, chunk caching and the skip/defer taxonomy.
//!
//! ## Pipeline
//!
//! ```text
//! File text + path
//!     │
//!     ├──> Defer pre-check (grammars missing from the batch?)
//!     │      └─> Deferred { missing_languages }
//!     │
//!     ├──> Language / caps / relations checks
//!     │      └─> Skipped { reason, stage }
//!     │
//!     ├──> Segment discovery (+ comment and frontmatter extras)
//!     │
//!     ├──> Grammar scheduler
//!     │    ├─> per-language passes over one shared parser
//!     │    ├─> chunk cache (LRU + persistent shards)
//!     │    └─> crash isolation → degraded fallback
//!     │
//!     └──> Sanitized, ordered chunks
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_indexer::{FileInput, FileOutcome, FileProcessor, LanguageOptions, SchedulerState};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> context_indexer::Result<()> {
//!     let state = Arc::new(SchedulerState::new());
//!     let processor = FileProcessor::new(LanguageOptions::default(), state)?;
//!
//!     let text = std::fs::read_to_string("docs/guide.md")?;
//!     match processor.process_file(&FileInput::new("docs/guide.md", &text)).await? {
//!         FileOutcome::Processed(file) => println!("{} chunks", file.chunks.len()),
//!         FileOutcome::Skipped(skip) => println!("skipped: {}", skip.message),
//!         FileOutcome::Deferred { missing_languages } => println!("waiting on {missing_languages:?}"),
//!     }
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod error;
mod file_processor;
mod scheduler;

pub use cache::{
    build_chunk_cache_key, resolve_chunk_cache_key, AdaptiveSignature, CacheMetrics,
    CacheSignature, ChunkCacheKeyInput, ChunkCacheStore, MemoryChunkCache, PersistentChunkCache,
    CHUNK_CACHE_NAMESPACE, CHUNK_CACHE_SCHEMA_VERSION, DEFAULT_CHUNK_CACHE_MAX_ENTRIES,
};
pub use config::{
    AdaptiveConfig, FileCap, FileCaps, LanguageOptions, LanguageTreeSitterOptions,
    TreeSitterConfig,
};
pub use error::{IndexerError, Result};
pub use file_processor::{
    sanitize_chunk_bounds, validate_chunk_bounds, CapSource, CommentExtractor, FileInput,
    FileOutcome, FileProcessor, FileSkip, ProcessedFile, RelationBuilder, RelationRequest,
    SkipReason, SkipStage,
};
pub use scheduler::{
    chunk_with_language_passes, chunk_with_scheduler, crash_signature, persist_crash_bundle,
    resolve_required_languages, segment_tree_sitter_language, segment_virtual_path,
    BuiltinGrammarLoader, CrashBundle, CrashEvent, CrashTracker, DeferralTracker, FileEntry,
    FileReadiness, GrammarEngine, GrammarLoader, GrammarTable, PassRequest, ScheduledChunkIndex,
    ScheduledChunkSource, SchedulerState, CRASH_BUNDLE_FILE, CRASH_BUNDLE_SCHEMA_VERSION,
};
