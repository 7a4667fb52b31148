//! Per-file orchestration: discovery, chunking and the skip/defer taxonomy.

use crate::config::{LanguageOptions, TreeSitterConfig};
use crate::scheduler::{
    chunk_with_language_passes, chunk_with_scheduler, resolve_required_languages, FileEntry,
    PassRequest, ScheduledChunkSource, SchedulerState,
};
use crate::{IndexerError, Result};
use context_code_chunker::{
    build_line_index, detect_frontmatter, discover_segments, line_count, AstChunker, Chunk,
    ChunkerError, Container, DiscoverRequest, EmbeddingContext, FileMode, Language, Segment,
    SegmentType, SegmentsConfig, StructuralChunker,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tree_sitter::{Parser, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    ParseError,
    UnsupportedLanguage,
    Oversize,
    RelationError,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "parse-error",
            Self::UnsupportedLanguage => "unsupported-language",
            Self::Oversize => "oversize",
            Self::RelationError => "relation-error",
        }
    }
}

/// Pipeline stage a skip was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipStage {
    Prepare,
    Language,
    Caps,
    Relations,
    Segments,
    Chunking,
    ChunkBounds,
}

impl SkipStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Language => "language",
            Self::Caps => "caps",
            Self::Relations => "relations",
            Self::Segments => "segments",
            Self::Chunking => "chunking",
            Self::ChunkBounds => "chunk-bounds",
        }
    }
}

/// File cap an oversize skip tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapSource {
    MaxLines,
    MaxBytes,
}

/// Machine-readable reason a file produced no chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSkip {
    pub reason: SkipReason,
    pub stage: SkipStage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_source: Option<CapSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<usize>,
}

impl FileSkip {
    pub fn new(reason: SkipReason, stage: SkipStage, message: impl Into<String>) -> Self {
        Self {
            reason,
            stage,
            message: message.into(),
            cap_source: None,
            lines: None,
            max_lines: None,
            bytes: None,
            max_bytes: None,
        }
    }

    fn oversize_lines(lines: usize, max_lines: usize) -> Self {
        Self {
            cap_source: Some(CapSource::MaxLines),
            lines: Some(lines),
            max_lines: Some(max_lines),
            ..Self::new(
                SkipReason::Oversize,
                SkipStage::Caps,
                format!("{lines} lines exceeds maxLines {max_lines}"),
            )
        }
    }

    fn oversize_bytes(bytes: usize, max_bytes: usize) -> Self {
        Self {
            cap_source: Some(CapSource::MaxBytes),
            bytes: Some(bytes),
            max_bytes: Some(max_bytes),
            ..Self::new(
                SkipReason::Oversize,
                SkipStage::Caps,
                format!("{bytes} bytes exceeds maxBytes {max_bytes}"),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
    pub chunks: Vec<Chunk>,
    pub file_relations: Option<serde_json::Value>,
    pub file_language_id: Option<String>,
    pub file_line_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Processed(ProcessedFile),
    Skipped(FileSkip),
    /// Grammars missing from the batch; retry once they are preloaded
    Deferred { missing_languages: Vec<String> },
}

impl FileOutcome {
    /// Chunks of a processed file; empty for skips and deferrals
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        match self {
            Self::Processed(file) => &file.chunks,
            _ => &[],
        }
    }

    #[must_use]
    pub const fn skip(&self) -> Option<&FileSkip> {
        match self {
            Self::Skipped(skip) => Some(skip),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}

/// One file to process
#[derive(Debug, Clone, Copy)]
pub struct FileInput<'a> {
    pub rel_path: &'a str,
    pub text: &'a str,
    pub mode: FileMode,
    /// Content hash, the default chunk cache base key
    pub file_hash: Option<&'a str>,
    /// Batch scheduler snapshot for this file
    pub entry: Option<&'a FileEntry>,
    /// Text was extracted from a document (PDF, DOCX, ...) rather than read as source
    pub document_extraction: bool,
}

impl<'a> FileInput<'a> {
    pub const fn new(rel_path: &'a str, text: &'a str) -> Self {
        Self {
            rel_path,
            text,
            mode: FileMode::Code,
            file_hash: None,
            entry: None,
            document_extraction: false,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn file_hash(mut self, file_hash: &'a str) -> Self {
        self.file_hash = Some(file_hash);
        self
    }

    #[must_use]
    pub const fn entry(mut self, entry: &'a FileEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    #[must_use]
    pub const fn document_extraction(mut self, document_extraction: bool) -> Self {
        self.document_extraction = document_extraction;
        self
    }

    /// Lowercased extension with its leading dot, or empty
    #[must_use]
    pub fn ext(&self) -> String {
        Path::new(self.rel_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default()
    }
}

pub struct RelationRequest<'a> {
    pub text: &'a str,
    pub rel_path: &'a str,
    pub language: Language,
}

/// Builds file-level relations (imports, calls, ...) for code files
pub trait RelationBuilder: Send + Sync {
    fn build_relations(&self, request: &RelationRequest<'_>) -> Result<serde_json::Value>;
}

/// Produces comment segments that discovery folds in as extra segments
pub trait CommentExtractor: Send + Sync {
    fn extract(&self, text: &str, rel_path: &str, language: Option<Language>) -> Vec<Segment>;
}

/// Drives discovery and chunking for one file at a time
pub struct FileProcessor {
    options: LanguageOptions,
    state: Arc<SchedulerState>,
    chunker: Arc<dyn StructuralChunker>,
    relations: Option<Arc<dyn RelationBuilder>>,
    comments: Option<Arc<dyn CommentExtractor>>,
    scheduled: Option<Arc<dyn ScheduledChunkSource>>,
}

impl FileProcessor {
    pub fn new(options: LanguageOptions, state: Arc<SchedulerState>) -> Result<Self> {
        options.validate().map_err(IndexerError::InvalidConfig)?;
        state.configure_cache(&options.tree_sitter);
        Ok(Self {
            options,
            state,
            chunker: Arc::new(AstChunker::default()),
            relations: None,
            comments: None,
            scheduled: None,
        })
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: Arc<dyn StructuralChunker>) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_relation_builder(mut self, builder: Arc<dyn RelationBuilder>) -> Self {
        self.relations = Some(builder);
        self
    }

    #[must_use]
    pub fn with_comment_extractor(mut self, extractor: Arc<dyn CommentExtractor>) -> Self {
        self.comments = Some(extractor);
        self
    }

    #[must_use]
    pub fn with_scheduled_source(mut self, source: Arc<dyn ScheduledChunkSource>) -> Self {
        self.scheduled = Some(source);
        self
    }

    #[must_use]
    pub const fn options(&self) -> &LanguageOptions {
        &self.options
    }

    #[must_use]
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Per-entry overrides applied to the configured tree-sitter options
    fn effective_tree_sitter(&self, entry: &FileEntry) -> TreeSitterConfig {
        let mut config = self.options.tree_sitter.clone();
        if entry.tree_sitter_disabled {
            config.enabled = false;
        }
        let allowed = entry
            .allowed_languages
            .as_ref()
            .filter(|allowed| !allowed.is_empty());
        if let Some(allowed) = allowed {
            if !config.language_passes {
                config.allowed_languages = Some(allowed.clone());
            }
        }
        config
    }

    /// Parse failures become skips unless they are fatal or skipping is off
    fn fail(&self, stage: SkipStage, err: IndexerError) -> Result<FileOutcome> {
        if err.is_fatal() || !self.options.skip_on_parse_error {
            return Err(err);
        }
        log::warn!("Skipping file after {} failure: {err}", stage.as_str());
        Ok(FileOutcome::Skipped(FileSkip::new(
            SkipReason::ParseError,
            stage,
            err.to_string(),
        )))
    }

    pub async fn process_file(&self, input: &FileInput<'_>) -> Result<FileOutcome> {
        let text = input.text;
        let rel_path = input.rel_path;
        let mode = input.mode;
        let ext = input.ext();
        let no_entry = FileEntry::default();
        let entry = input.entry.unwrap_or(&no_entry);

        let config = self.effective_tree_sitter(entry);
        let tree_sitter_enabled = config.enabled && mode == FileMode::Code;
        let language_passes = tree_sitter_enabled && config.language_passes;
        let segments_config = if mode == FileMode::ExtractedProse && !input.document_extraction {
            SegmentsConfig::only_extras()
        } else {
            self.options.segments.clone()
        };
        let language = Language::from_path(rel_path);
        let language_id = language.map(Language::as_str);

        let may_defer = !language_passes
            && tree_sitter_enabled
            && config.defer_missing
            && config.defer_missing_max > 0
            && !entry.tree_sitter_disabled
            && entry.deferrals < config.defer_missing_max;
        if may_defer {
            let request = DiscoverRequest::new(text, &ext, rel_path, &segments_config)
                .mode(mode)
                .language_id(language_id);
            let hint = match discover_segments(&request) {
                Ok(segments) => segments,
                Err(e) => return self.fail(SkipStage::Segments, e.into()),
            };
            let missing: Vec<String> = resolve_required_languages(&hint, language_id, &ext, &config)
                .into_iter()
                .filter(|lang| !entry.batch_languages.contains(lang))
                .collect();
            if !missing.is_empty() {
                log::debug!("{rel_path}: deferring until {missing:?} are loaded");
                return Ok(FileOutcome::Deferred {
                    missing_languages: missing,
                });
            }
        }

        let allow_unknown = mode != FileMode::Code || input.document_extraction;
        if language.is_none() && self.options.skip_unknown_languages && !allow_unknown {
            return Ok(FileOutcome::Skipped(FileSkip::new(
                SkipReason::UnsupportedLanguage,
                SkipStage::Language,
                format!("no language registered for extension {ext:?}"),
            )));
        }

        let tree = match prepare_tree(language, text, tree_sitter_enabled, &config) {
            Ok(tree) => tree,
            Err(e) => return self.fail(SkipStage::Prepare, e),
        };

        let line_index = build_line_index(text);
        let lines = line_count(&line_index);
        let cap = self.options.file_caps.resolve(&ext, language_id);
        if let Some(max_lines) = cap.max_lines.filter(|max| lines > *max) {
            return Ok(FileOutcome::Skipped(FileSkip::oversize_lines(lines, max_lines)));
        }
        if let Some(max_bytes) = cap.max_bytes.filter(|max| text.len() > *max) {
            return Ok(FileOutcome::Skipped(FileSkip::oversize_bytes(text.len(), max_bytes)));
        }

        let mut file_relations = None;
        if let (Some(builder), Some(lang), FileMode::Code) = (&self.relations, language, mode) {
            let request = RelationRequest {
                text,
                rel_path,
                language: lang,
            };
            match builder.build_relations(&request) {
                Ok(relations) => file_relations = Some(relations),
                Err(e) => {
                    return Ok(FileOutcome::Skipped(FileSkip::new(
                        SkipReason::RelationError,
                        SkipStage::Relations,
                        e.to_string(),
                    )))
                }
            }
        }

        let extras = self.extra_segments(text, rel_path, &ext, mode, language);
        let request = DiscoverRequest::new(text, &ext, rel_path, &segments_config)
            .mode(mode)
            .language_id(language_id)
            .extra_segments(&extras)
            .tree(tree.as_ref());
        let segments = match discover_segments(&request) {
            Ok(segments) => segments,
            Err(e) => return self.fail(SkipStage::Segments, e.into()),
        };

        let chunk_config = if tree_sitter_enabled {
            config.clone()
        } else {
            config.without_grammar()
        };
        let pass_request = PassRequest {
            text,
            ext: &ext,
            rel_path,
            mode,
            segments: &segments,
            line_index: &line_index,
            language_id,
            config: &chunk_config,
            cache_key: config.cache_key.as_deref().or(input.file_hash),
        };
        let chunked = match (&self.scheduled, tree_sitter_enabled) {
            (Some(source), true) => {
                chunk_with_scheduler(&self.state, self.chunker.as_ref(), source.as_ref(), &pass_request)
                    .await
            }
            _ => chunk_with_language_passes(&self.state, self.chunker.as_ref(), &pass_request).await,
        };
        let mut chunks = match chunked {
            Ok(chunks) => chunks,
            Err(e) => return self.fail(SkipStage::Chunking, e),
        };

        sanitize_chunk_bounds(&mut chunks, text.len());
        if let Err(issue) = validate_chunk_bounds(&chunks, text.len()) {
            return self.fail(SkipStage::ChunkBounds, IndexerError::Other(issue));
        }

        Ok(FileOutcome::Processed(ProcessedFile {
            chunks,
            file_relations,
            file_language_id: language_id.map(str::to_string),
            file_line_count: lines,
        }))
    }

    /// Comment segments plus, for extracted Markdown prose, the frontmatter body
    fn extra_segments(
        &self,
        text: &str,
        rel_path: &str,
        ext: &str,
        mode: FileMode,
        language: Option<Language>,
    ) -> Vec<Segment> {
        let mut extras = self
            .comments
            .as_ref()
            .map(|extractor| extractor.extract(text, rel_path, language))
            .unwrap_or_default();
        if mode == FileMode::ExtractedProse && Container::from_ext(ext) == Container::Markdown {
            if let Some(frontmatter) = detect_frontmatter(text) {
                extras.push(
                    Segment::new(
                        SegmentType::Prose,
                        Some("markdown"),
                        frontmatter.content_start,
                        frontmatter.content_end,
                        EmbeddingContext::Prose,
                    )
                    .with_meta("frontmatter", true),
                );
            }
        }
        extras
    }
}

/// Pre-parse JSX/TSX containers so discovery can reuse the tree
fn prepare_tree(
    language: Option<Language>,
    text: &str,
    tree_sitter_enabled: bool,
    config: &TreeSitterConfig,
) -> Result<Option<Tree>> {
    let Some(lang) = language.filter(|lang| matches!(lang, Language::Jsx | Language::Tsx)) else {
        return Ok(None);
    };
    if !tree_sitter_enabled || !config.is_language_enabled(lang.as_str()) {
        return Ok(None);
    }
    let mut parser = Parser::new();
    parser
        .set_language(&lang.tree_sitter_language()?)
        .map_err(|e| ChunkerError::tree_sitter(format!("Failed to set language: {e}")))?;
    Ok(parser.parse(text, None))
}

/// Clamp offsets into `[0, text_len]` with `start <= end`
pub fn sanitize_chunk_bounds(chunks: &mut [Chunk], text_len: usize) {
    for chunk in chunks {
        let start = chunk.start.min(text_len);
        let end = chunk.end.min(text_len).max(start);
        chunk.start = start;
        chunk.end = end;
    }
}

/// Bounds and ordering check; returns the first problem found
pub fn validate_chunk_bounds(chunks: &[Chunk], text_len: usize) -> std::result::Result<(), String> {
    let mut last_start = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.start > chunk.end || chunk.end > text_len {
            return Err(format!("chunk {i} out of bounds"));
        }
        if chunk.start < last_start {
            return Err(format!("chunk {i} out of order"));
        }
        last_start = chunk.start;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(start: usize, end: usize) -> Chunk {
        Chunk {
            start,
            end,
            name: None,
            kind: None,
            meta: Default::default(),
            segment: None,
        }
    }

    #[test]
    fn sanitize_clamps_into_text() {
        let mut chunks = vec![chunk(0, 4), chunk(8, 20), chunk(30, 40)];
        sanitize_chunk_bounds(&mut chunks, 10);
        let bounds: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(bounds, vec![(0, 4), (8, 10), (10, 10)]);
        assert!(validate_chunk_bounds(&chunks, 10).is_ok());
    }

    #[test]
    fn validate_reports_order_and_bounds() {
        assert_eq!(
            validate_chunk_bounds(&[chunk(5, 6), chunk(1, 2)], 10),
            Err("chunk 1 out of order".to_string())
        );
        assert_eq!(
            validate_chunk_bounds(&[chunk(0, 11)], 10),
            Err("chunk 0 out of bounds".to_string())
        );
    }

    #[test]
    fn input_extension() {
        assert_eq!(FileInput::new("src/App.TSX", "").ext(), ".tsx");
        assert_eq!(FileInput::new("Makefile", "").ext(), "");
    }

    #[test]
    fn skip_serializes_kebab_case() {
        let skip = FileSkip::oversize_lines(600, 500);
        let json = serde_json::to_value(&skip).unwrap();
        assert_eq!(json["reason"], "oversize");
        assert_eq!(json["stage"], "caps");
        assert_eq!(json["capSource"], "maxLines");
        assert_eq!(json["lines"], 600);
        assert_eq!(json["maxLines"], 500);
        assert_eq!(
            serde_json::to_value(SkipStage::ChunkBounds).unwrap(),
            "chunk-bounds"
        );
    }
}
