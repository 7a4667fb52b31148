use super::SchedulerState;
use crate::cache::resolve_chunk_cache_key;
use crate::config::TreeSitterConfig;
use crate::Result;
use context_code_chunker::{
    chunk_segment, resolve_segment_ext, resolve_segment_token_mode, resolve_tree_sitter_language,
    should_index_segment, sort_chunks, AssemblyRequest, Chunk, FileMode, Language, Segment,
    StructuralChunker, TreeSitterPass,
};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use tree_sitter::Parser;

/// One file's discovered segments plus everything needed to chunk them
#[derive(Debug, Clone, Copy)]
pub struct PassRequest<'a> {
    pub text: &'a str,
    /// Container extension
    pub ext: &'a str,
    pub rel_path: &'a str,
    pub mode: FileMode,
    pub segments: &'a [Segment],
    pub line_index: &'a [usize],
    /// Container language, used for segments without their own
    pub language_id: Option<&'a str>,
    pub config: &'a TreeSitterConfig,
    /// Base key for the chunk cache
    pub cache_key: Option<&'a str>,
}

/// Grammar-engine language for a segment, if any
#[must_use]
pub fn segment_tree_sitter_language(
    segment: &Segment,
    container_language: Option<&str>,
    container_ext: &str,
) -> Option<Language> {
    let raw = segment.language_id.as_deref().or(container_language);
    resolve_tree_sitter_language(raw, resolve_segment_ext(segment, container_ext))
}

/// `<container>#seg:<segmentId><ext>`, or the container itself for whole-file segments
#[must_use]
pub fn segment_virtual_path(
    rel_path: &str,
    segment: &Segment,
    text_len: usize,
    container_ext: &str,
) -> String {
    if segment.start == 0 && segment.end == text_len {
        return rel_path.to_string();
    }
    format!(
        "{rel_path}#seg:{}{}",
        segment.segment_id,
        resolve_segment_ext(segment, container_ext)
    )
}

/// Sorted distinct grammar-engine languages the segments need
#[must_use]
pub fn resolve_required_languages(
    segments: &[Segment],
    primary_language: Option<&str>,
    ext: &str,
    config: &TreeSitterConfig,
) -> Vec<String> {
    let required: BTreeSet<&'static str> = segments
        .iter()
        .filter_map(|segment| segment_tree_sitter_language(segment, primary_language, ext))
        .map(Language::as_str)
        .filter(|id| config.is_language_enabled(id))
        .collect();
    required.into_iter().map(str::to_string).collect()
}

/// Chunk a file, running one serialized grammar pass per language when it
/// mixes several.
///
/// Files needing at most one grammar and no heuristic fallback take the
/// single-pass path on a private parser without touching the shared engine.
pub async fn chunk_with_language_passes(
    state: &SchedulerState,
    chunker: &dyn StructuralChunker,
    request: &PassRequest<'_>,
) -> Result<Vec<Chunk>> {
    let config = request.config;
    if !config.enabled || !config.language_passes || request.segments.is_empty() {
        return single_pass(state, chunker, request).await;
    }

    let mut buckets: BTreeMap<&'static str, Vec<Segment>> = BTreeMap::new();
    let mut fallback = Vec::new();
    for segment in request.segments {
        let lang = segment_tree_sitter_language(segment, request.language_id, request.ext)
            .filter(|lang| config.is_language_enabled(lang.as_str()));
        match lang {
            Some(lang) => buckets.entry(lang.as_str()).or_default().push(segment.clone()),
            None => fallback.push(segment.clone()),
        }
    }
    if buckets.len() <= 1 && fallback.is_empty() {
        return single_pass(state, chunker, request).await;
    }

    let base = config.to_pass();
    let mut chunks = Vec::new();
    if !fallback.is_empty() {
        let pass = base.without_grammar();
        chunks.extend(assemble(state, chunker, request, &fallback, &pass, &mut Parser::new())?);
    }

    let mut engine = state.lock_engine().await;
    for (lang, segments) in &buckets {
        let grammar = engine
            .prepare(lang, state.loader(), config.max_loaded_languages)
            .await;
        let pass = grammar_pass(state, &base, lang, grammar);
        chunks.extend(assemble(state, chunker, request, segments, &pass, engine.parser_mut())?);
    }
    drop(engine);

    if chunks.len() > 1 {
        sort_chunks(&mut chunks);
    }
    Ok(chunks)
}

async fn single_pass(
    state: &SchedulerState,
    chunker: &dyn StructuralChunker,
    request: &PassRequest<'_>,
) -> Result<Vec<Chunk>> {
    let pass = loaded_pass(state, request, request.segments).await;
    assemble(state, chunker, request, request.segments, &pass, &mut Parser::new())
}

/// Pass carrying loader grammars for `segments`, built without the shared engine
pub(crate) async fn loaded_pass(
    state: &SchedulerState,
    request: &PassRequest<'_>,
    segments: &[Segment],
) -> TreeSitterPass {
    let config = request.config;
    let mut grammars = HashMap::new();
    if config.enabled {
        for lang in resolve_required_languages(segments, request.language_id, request.ext, config) {
            match state.loader().load(&lang).await {
                Ok(grammar) => {
                    grammars.insert(lang, grammar);
                }
                Err(e) => warn_unavailable(state, &lang, &e),
            }
        }
    }
    config.to_pass().with_grammars(grammars)
}

/// Single-language pass over a prepared grammar; no grammar means heuristic chunking
pub(crate) fn grammar_pass(
    state: &SchedulerState,
    base: &TreeSitterPass,
    language_id: &str,
    grammar: Option<tree_sitter::Language>,
) -> TreeSitterPass {
    match grammar {
        Some(grammar) => base.only(language_id, grammar),
        None => {
            warn_unavailable(state, language_id, &"preload failed");
            base.without_grammar()
        }
    }
}

fn warn_unavailable(state: &SchedulerState, language_id: &str, reason: &dyn std::fmt::Display) {
    if state.warn_once(&format!("grammar-unavailable:{language_id}")) {
        log::warn!("Tree-sitter grammar unavailable for {language_id} ({reason}); using heuristic chunking");
    }
}

/// Chunk `segments` under one pass; the result is sorted
pub(crate) fn assemble(
    state: &SchedulerState,
    chunker: &dyn StructuralChunker,
    request: &PassRequest<'_>,
    segments: &[Segment],
    pass: &TreeSitterPass,
    parser: &mut Parser,
) -> Result<Vec<Chunk>> {
    let assembly = AssemblyRequest {
        text: request.text,
        ext: request.ext,
        rel_path: request.rel_path,
        mode: request.mode,
        segments,
        line_index: request.line_index,
        tree_sitter: pass,
    };
    let mut chunks = Vec::new();
    for segment in segments {
        if let Some(mut seg_chunks) = chunk_one(state, chunker, request, &assembly, segment, parser)? {
            chunks.append(&mut seg_chunks);
        }
    }
    if chunks.len() > 1 {
        sort_chunks(&mut chunks);
    }
    Ok(chunks)
}

/// Chunk one segment with caching and crash isolation for grammar-parsed languages
fn chunk_one(
    state: &SchedulerState,
    chunker: &dyn StructuralChunker,
    request: &PassRequest<'_>,
    assembly: &AssemblyRequest<'_>,
    segment: &Segment,
    parser: &mut Parser,
) -> Result<Option<Vec<Chunk>>> {
    let lang = segment_tree_sitter_language(segment, request.language_id, request.ext)
        .filter(|lang| assembly.tree_sitter.allows(lang.as_str()));
    let Some(lang) = lang else {
        return Ok(chunk_segment(assembly, segment, chunker, parser)?);
    };
    if !should_index_segment(segment, resolve_segment_token_mode(segment), request.mode) {
        return Ok(None);
    }

    let language_id = lang.as_str();
    let virtual_path = segment_virtual_path(request.rel_path, segment, request.text.len(), request.ext);
    if state.is_degraded(&virtual_path) {
        return without_grammar(assembly, segment, chunker, parser);
    }

    let key = resolve_chunk_cache_key(
        request.config,
        language_id,
        request.cache_key,
        segment.start,
        segment.end,
    );
    if let Some(mut cached) = key.as_deref().and_then(|key| state.cache_load(key)) {
        // Keys are content-addressed; the back-reference belongs to this file's segment.
        let segment_ref = segment.to_ref();
        for chunk in &mut cached {
            chunk.segment = Some(segment_ref.clone());
        }
        return Ok(Some(cached));
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        chunk_segment(assembly, segment, chunker, parser)
    }));
    match outcome {
        Ok(result) => {
            let chunks = result?;
            if let (Some(key), Some(chunks)) = (key.as_deref(), chunks.as_deref()) {
                state.cache_store(key, chunks);
            }
            Ok(chunks)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            state.record_crash(language_id, &virtual_path, &message);
            *parser = Parser::new();
            without_grammar(assembly, segment, chunker, parser)
        }
    }
}

fn without_grammar(
    assembly: &AssemblyRequest<'_>,
    segment: &Segment,
    chunker: &dyn StructuralChunker,
    parser: &mut Parser,
) -> Result<Option<Vec<Chunk>>> {
    let pass = assembly.tree_sitter.without_grammar();
    let degraded = AssemblyRequest {
        tree_sitter: &pass,
        ..*assembly
    };
    Ok(chunk_segment(&degraded, segment, chunker, parser)?)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "parser panicked".to_string())
}
