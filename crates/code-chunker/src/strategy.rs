use crate::chunker::{ChunkRequest, StructuralChunker};
use crate::config::{ChunkerConfig, OverlapStrategy};
use crate::error::Result;
use crate::line_index::build_line_index;
use crate::types::{ChunkType, LocalChunk, TokenMode};
use tree_sitter::Parser;

/// Line-window chunker used wherever no grammar applies
#[derive(Debug, Clone, Default)]
pub struct HeuristicChunker {
    config: ChunkerConfig,
}

impl HeuristicChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split `content` into windows of roughly `target_chunk_lines` lines.
    ///
    /// Windows holding only whitespace are dropped, and a trailing window
    /// shorter than `min_chunk_lines` is folded into its predecessor.
    pub fn chunk_by_lines(&self, content: &str, kind: ChunkType) -> Vec<LocalChunk> {
        let index = build_line_index(content);
        let line_total = if content.ends_with('\n') {
            index.len() - 1
        } else {
            index.len()
        };
        if content.is_empty() || line_total == 0 {
            return Vec::new();
        }

        let target = self.config.target_chunk_lines.clamp(1, self.config.max_chunk_lines.max(1));
        let overlap = match self.config.overlap {
            OverlapStrategy::FixedLines(n) if n < target => n,
            _ => 0,
        };
        let offset_of = |line: usize| index.get(line).copied().unwrap_or(content.len());

        let mut windows: Vec<(usize, usize)> = Vec::new();
        let mut start = 0;
        while start < line_total {
            let end = (start + target).min(line_total);
            windows.push((start, end));
            if end == line_total {
                break;
            }
            start = end - overlap;
        }

        if windows.len() > 1 {
            let (last_start, last_end) = windows[windows.len() - 1];
            if last_end - last_start < self.config.min_chunk_lines {
                windows.pop();
                if let Some(prev) = windows.last_mut() {
                    prev.1 = last_end;
                }
            }
        }

        windows
            .into_iter()
            .filter_map(|(first, last)| {
                let start = offset_of(first);
                let end = offset_of(last);
                let body = content.get(start..end)?;
                if body.trim().is_empty() {
                    return None;
                }
                Some(LocalChunk::new(start, end).kind(kind).lines(first + 1, last))
            })
            .collect()
    }
}

impl StructuralChunker for HeuristicChunker {
    fn chunk(&self, request: &ChunkRequest<'_>, _parser: &mut Parser) -> Result<Vec<LocalChunk>> {
        let kind = match request.mode {
            TokenMode::Prose => ChunkType::Section,
            TokenMode::Code => ChunkType::Other,
        };
        Ok(self.chunk_by_lines(request.text, kind))
    }
}
