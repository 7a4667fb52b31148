use super::passes::{
    assemble, grammar_pass, loaded_pass, segment_tree_sitter_language, segment_virtual_path,
    PassRequest,
};
use super::SchedulerState;
use crate::{IndexerError, Result};
use async_trait::async_trait;
use context_code_chunker::{
    resolve_segment_token_mode, should_index_segment, sort_chunks, Chunk, Segment,
    StructuralChunker, TokenMode,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tree_sitter::Parser;

/// Chunks produced ahead of time by a batch grammar pass, keyed by virtual path
#[async_trait]
pub trait ScheduledChunkSource: Send + Sync {
    async fn load_chunks(&self, virtual_path: &str) -> Result<Option<Vec<Chunk>>>;

    fn has_entry(&self, virtual_path: &str) -> bool;

    /// Languages the batch pass covered (`None` = unknown, assume all)
    fn scheduled_languages(&self) -> Option<BTreeSet<String>> {
        None
    }

    fn is_degraded(&self, _virtual_path: &str) -> bool {
        false
    }
}

/// In-memory scheduled chunks
#[derive(Debug, Clone, Default)]
pub struct ScheduledChunkIndex {
    entries: HashMap<String, Vec<Chunk>>,
    languages: BTreeSet<String>,
    degraded: HashSet<String>,
}

impl ScheduledChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, virtual_path: impl Into<String>, language_id: &str, chunks: Vec<Chunk>) {
        self.languages.insert(language_id.to_string());
        self.entries.insert(virtual_path.into(), chunks);
    }

    pub fn mark_degraded(&mut self, virtual_path: impl Into<String>) {
        self.degraded.insert(virtual_path.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Batch pass over one file: chunk every schedulable code segment in
    /// per-language grammar passes and record the results.
    ///
    /// Returns the number of recorded virtual paths.
    pub async fn schedule_file(
        &mut self,
        state: &SchedulerState,
        chunker: &dyn StructuralChunker,
        request: &PassRequest<'_>,
    ) -> Result<usize> {
        let config = request.config;
        if !config.enabled {
            return Ok(0);
        }
        let mut buckets: BTreeMap<&'static str, Vec<&Segment>> = BTreeMap::new();
        for segment in request.segments {
            let mode = resolve_segment_token_mode(segment);
            if mode != TokenMode::Code || !should_index_segment(segment, mode, request.mode) {
                continue;
            }
            let lang = segment_tree_sitter_language(segment, request.language_id, request.ext)
                .filter(|lang| config.is_language_enabled(lang.as_str()));
            if let Some(lang) = lang {
                buckets.entry(lang.as_str()).or_default().push(segment);
            }
        }

        let base = config.to_pass();
        let mut recorded = 0;
        let mut engine = state.lock_engine().await;
        for (lang, segments) in buckets {
            let grammar = engine
                .prepare(lang, state.loader(), config.max_loaded_languages)
                .await;
            let pass = grammar_pass(state, &base, lang, grammar);
            for segment in segments {
                let virtual_path =
                    segment_virtual_path(request.rel_path, segment, request.text.len(), request.ext);
                let chunks = assemble(
                    state,
                    chunker,
                    request,
                    std::slice::from_ref(segment),
                    &pass,
                    engine.parser_mut(),
                )?;
                if state.is_degraded(&virtual_path) {
                    self.mark_degraded(virtual_path);
                } else if !chunks.is_empty() {
                    self.record(virtual_path, lang, chunks);
                    recorded += 1;
                }
            }
        }
        Ok(recorded)
    }
}

#[async_trait]
impl ScheduledChunkSource for ScheduledChunkIndex {
    async fn load_chunks(&self, virtual_path: &str) -> Result<Option<Vec<Chunk>>> {
        Ok(self.entries.get(virtual_path).cloned())
    }

    fn has_entry(&self, virtual_path: &str) -> bool {
        self.entries.contains_key(virtual_path)
    }

    fn scheduled_languages(&self) -> Option<BTreeSet<String>> {
        (!self.languages.is_empty()).then(|| self.languages.clone())
    }

    fn is_degraded(&self, virtual_path: &str) -> bool {
        self.degraded.contains(virtual_path)
    }
}

/// Consume scheduled chunks for a file, chunking everything else directly.
///
/// A scheduled segment without chunks fails the file in strict mode and
/// otherwise falls back, warning once per language.
pub async fn chunk_with_scheduler(
    state: &SchedulerState,
    chunker: &dyn StructuralChunker,
    source: &dyn ScheduledChunkSource,
    request: &PassRequest<'_>,
) -> Result<Vec<Chunk>> {
    let config = request.config;
    let scheduled_languages = source.scheduled_languages();
    let container_degraded =
        source.is_degraded(request.rel_path) || state.is_degraded(request.rel_path);

    let mut chunks = Vec::new();
    let mut fallback: Vec<Segment> = Vec::new();
    let mut degraded: Vec<Segment> = Vec::new();
    let mut missing = 0usize;

    for segment in request.segments {
        let mode = resolve_segment_token_mode(segment);
        if !should_index_segment(segment, mode, request.mode) {
            continue;
        }
        if !config.enabled || mode != TokenMode::Code {
            fallback.push(segment.clone());
            continue;
        }
        let lang = segment_tree_sitter_language(segment, request.language_id, request.ext).filter(|lang| {
            config.is_language_enabled(lang.as_str())
                && scheduled_languages
                    .as_ref()
                    .map_or(true, |langs| langs.contains(lang.as_str()))
        });
        let Some(lang) = lang else {
            fallback.push(segment.clone());
            continue;
        };
        let language_id = lang.as_str();
        let segment_text = request.text.get(segment.start..segment.end).unwrap_or("");
        if config.exceeds_limits(language_id, segment_text) {
            fallback.push(segment.clone());
            continue;
        }

        let virtual_path =
            segment_virtual_path(request.rel_path, segment, request.text.len(), request.ext);
        if container_degraded || source.is_degraded(&virtual_path) || state.is_degraded(&virtual_path) {
            degraded.push(segment.clone());
            continue;
        }

        match source.load_chunks(&virtual_path).await? {
            Some(found) if !found.is_empty() => chunks.extend(found),
            _ => {
                let label = format!("{language_id}:{}-{}", segment.start, segment.end);
                if config.strict {
                    log::error!("Missing scheduled chunks for {}: {label}", request.rel_path);
                    return Err(IndexerError::MissingScheduledChunks {
                        path: request.rel_path.to_string(),
                        label,
                    });
                }
                if state.warn_once(&format!("scheduler-miss:{language_id}")) {
                    let detail = if source.has_entry(&virtual_path) {
                        "empty entry"
                    } else {
                        "no entry"
                    };
                    log::warn!(
                        "Scheduler has no {language_id} chunks ({detail} for {virtual_path}); using fallback chunking"
                    );
                }
                missing += 1;
                fallback.push(segment.clone());
            }
        }
    }

    if missing > 0 {
        log::debug!(
            "Scheduler missed {missing} segment(s) in {}; using fallback chunking",
            request.rel_path
        );
    }
    if !degraded.is_empty() {
        log::warn!(
            "Parser crash degraded {} segment(s) in {}; using fallback chunking",
            degraded.len(),
            request.rel_path
        );
    }

    let pass = loaded_pass(state, request, &fallback).await;
    let mut parser = Parser::new();
    chunks.extend(assemble(state, chunker, request, &fallback, &pass, &mut parser)?);
    chunks.extend(assemble(
        state,
        chunker,
        request,
        &degraded,
        &pass.without_grammar(),
        &mut parser,
    )?);

    if chunks.len() > 1 {
        sort_chunks(&mut chunks);
    }
    Ok(chunks)
}
