//! Segment-local chunks to container coordinates

use crate::chunker::{ChunkRequest, StructuralChunker, TreeSitterPass};
use crate::error::{ChunkerError, Result};
use crate::language::language_ext;
use crate::line_index::offset_to_line;
use crate::types::{Chunk, ChunkMeta, EmbeddingContext, FileMode, LocalChunk, Segment, SegmentType, TokenMode};
use tree_sitter::Parser;

/// Inputs for assembling one file's chunks
#[derive(Debug, Clone, Copy)]
pub struct AssemblyRequest<'a> {
    pub text: &'a str,
    /// Container extension
    pub ext: &'a str,
    pub rel_path: &'a str,
    pub mode: FileMode,
    pub segments: &'a [Segment],
    pub line_index: &'a [usize],
    pub tree_sitter: &'a TreeSitterPass,
}

/// Token mode a segment is indexed under
#[must_use]
pub fn resolve_segment_token_mode(segment: &Segment) -> TokenMode {
    let meta_prose = segment.meta_str("tokenMode") == Some("prose");
    if meta_prose
        || segment.embedding_context == EmbeddingContext::Prose
        || matches!(segment.segment_type, SegmentType::Prose | SegmentType::Comment)
    {
        TokenMode::Prose
    } else {
        TokenMode::Code
    }
}

/// Embedded segments are always indexed; others only when their mode matches the file's
#[must_use]
pub fn should_index_segment(segment: &Segment, segment_mode: TokenMode, file_mode: FileMode) -> bool {
    segment.segment_type == SegmentType::Embedded || segment_mode == file_mode.token_mode()
}

/// Extension a segment's text is routed through
#[must_use]
pub fn resolve_segment_ext<'a>(segment: &'a Segment, container_ext: &'a str) -> &'a str {
    segment
        .ext
        .as_deref()
        .or_else(|| segment.language_id.as_deref().and_then(language_ext))
        .unwrap_or(container_ext)
}

/// Chunk one segment and translate the result into container coordinates
pub fn chunk_segment(
    request: &AssemblyRequest<'_>,
    segment: &Segment,
    chunker: &dyn StructuralChunker,
    parser: &mut Parser,
) -> Result<Option<Vec<Chunk>>> {
    let local_text = request
        .text
        .get(segment.start..segment.end)
        .ok_or(ChunkerError::InvalidSegment {
            start: segment.start,
            end: segment.end,
            len: request.text.len(),
        })?;

    let token_mode = resolve_segment_token_mode(segment);
    if !should_index_segment(segment, token_mode, request.mode) {
        return Ok(None);
    }

    let local = chunker.chunk(
        &ChunkRequest {
            text: local_text,
            ext: resolve_segment_ext(segment, request.ext),
            rel_path: request.rel_path,
            mode: token_mode,
            language_id: segment.language_id.as_deref(),
            tree_sitter: request.tree_sitter,
        },
        parser,
    )?;

    let base_line = offset_to_line(request.line_index, segment.start);
    Ok(Some(
        local
            .into_iter()
            .map(|chunk| remap_chunk(chunk, segment, base_line))
            .collect(),
    ))
}

/// Chunk every indexable segment; the result is sorted by `(start, end)`
pub fn chunk_segments(
    request: &AssemblyRequest<'_>,
    chunker: &dyn StructuralChunker,
    parser: &mut Parser,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for segment in request.segments {
        if let Some(mut seg_chunks) = chunk_segment(request, segment, chunker, parser)? {
            chunks.append(&mut seg_chunks);
        }
    }
    if chunks.len() > 1 {
        sort_chunks(&mut chunks);
    }
    Ok(chunks)
}

/// Sort chunks by `(start, end)`
pub fn sort_chunks(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
}

fn remap_chunk(chunk: LocalChunk, segment: &Segment, base_line: usize) -> Chunk {
    let rebase = |line: usize| base_line + line.saturating_sub(1);
    Chunk {
        start: chunk.start + segment.start,
        end: chunk.end + segment.start,
        name: chunk.name,
        kind: chunk.kind,
        meta: ChunkMeta {
            start_line: chunk.meta.start_line.map(rebase),
            end_line: chunk.meta.end_line.map(rebase),
            extra: chunk.meta.extra,
        },
        segment: Some(segment.to_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_index::build_line_index;
    use pretty_assertions::assert_eq;

    /// Emits one chunk per non-empty line, offsets local to the segment
    struct LineChunker;

    impl StructuralChunker for LineChunker {
        fn chunk(&self, request: &ChunkRequest<'_>, _parser: &mut Parser) -> Result<Vec<LocalChunk>> {
            let mut out = Vec::new();
            let mut offset = 0;
            for (i, line) in request.text.split_inclusive('\n').enumerate() {
                if !line.trim().is_empty() {
                    let mut chunk = LocalChunk::new(offset, offset + line.len()).lines(i + 1, i + 1);
                    chunk.name = Some(request.ext.to_string());
                    out.push(chunk);
                }
                offset += line.len();
            }
            Ok(out)
        }
    }

    #[test]
    fn chunks_are_translated_and_rebased() {
        let text = "intro\n```python\nx = 1\ny = 2\n```\n";
        let body_start = text.find("x = 1").unwrap();
        let body_end = text.rfind("```").unwrap();
        let segments = vec![
            Segment::new(SegmentType::Prose, Some("markdown"), 0, 6, EmbeddingContext::Prose),
            Segment::new(SegmentType::Embedded, Some("python"), body_start, body_end, EmbeddingContext::Code),
        ];
        let line_index = build_line_index(text);
        let pass = TreeSitterPass::disabled();
        let request = AssemblyRequest {
            text,
            ext: ".md",
            rel_path: "a.md",
            mode: FileMode::Code,
            segments: &segments,
            line_index: &line_index,
            tree_sitter: &pass,
        };
        let chunks = chunk_segments(&request, &LineChunker, &mut Parser::new()).unwrap();

        let summary: Vec<_> = chunks
            .iter()
            .map(|c| (&text[c.start..c.end], c.meta.start_line, c.name.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("x = 1\n", Some(3), Some(".py")),
                ("y = 2\n", Some(4), Some(".py")),
            ]
        );
        assert_eq!(chunks[0].language_id(), Some("python"));
    }

    #[test]
    fn prose_segments_follow_file_mode() {
        let text = "hello\n";
        let segments = vec![Segment::new(SegmentType::Prose, Some("markdown"), 0, 6, EmbeddingContext::Prose)];
        let line_index = build_line_index(text);
        let pass = TreeSitterPass::disabled();
        let mut request = AssemblyRequest {
            text,
            ext: ".md",
            rel_path: "a.md",
            mode: FileMode::Prose,
            segments: &segments,
            line_index: &line_index,
            tree_sitter: &pass,
        };
        assert_eq!(chunk_segments(&request, &LineChunker, &mut Parser::new()).unwrap().len(), 1);
        request.mode = FileMode::Code;
        assert!(chunk_segments(&request, &LineChunker, &mut Parser::new()).unwrap().is_empty());
    }

    #[test]
    fn segment_ext_resolution_order() {
        let mut seg = Segment::new(SegmentType::Embedded, Some("tsx"), 0, 1, EmbeddingContext::Code);
        assert_eq!(resolve_segment_ext(&seg, ".md"), ".tsx");
        seg.ext = Some(".jsx".to_string());
        assert_eq!(resolve_segment_ext(&seg, ".md"), ".jsx");
        let unknown = Segment::new(SegmentType::Code, Some("mermaid"), 0, 1, EmbeddingContext::Code);
        assert_eq!(resolve_segment_ext(&unknown, ".md"), ".md");
    }

    #[test]
    fn segment_past_text_end_is_an_error() {
        let segments = vec![Segment::new(SegmentType::Code, None, 0, 50, EmbeddingContext::Code)];
        let line_index = build_line_index("x");
        let pass = TreeSitterPass::disabled();
        let request = AssemblyRequest {
            text: "x",
            ext: ".rs",
            rel_path: "a.rs",
            mode: FileMode::Code,
            segments: &segments,
            line_index: &line_index,
            tree_sitter: &pass,
        };
        let err = chunk_segments(&request, &LineChunker, &mut Parser::new()).unwrap_err();
        assert!(matches!(err, ChunkerError::InvalidSegment { end: 50, .. }));
    }

    #[test]
    fn token_modes() {
        let comment = Segment::new(SegmentType::Comment, None, 0, 1, EmbeddingContext::Code);
        assert_eq!(resolve_segment_token_mode(&comment), TokenMode::Prose);
        let tagged = Segment::new(SegmentType::Code, None, 0, 1, EmbeddingContext::Code)
            .with_meta("tokenMode", "prose");
        assert_eq!(resolve_segment_token_mode(&tagged), TokenMode::Prose);
        let code = Segment::new(SegmentType::Config, Some("json"), 0, 1, EmbeddingContext::Config);
        assert_eq!(resolve_segment_token_mode(&code), TokenMode::Code);
    }
}
