use crate::ast_analyzer::AstAnalyzer;
use crate::config::{ChunkerConfig, ChunkingStrategy};
use crate::error::{ChunkerError, Result};
use crate::language::{resolve_tree_sitter_language, Language};
use crate::strategy::HeuristicChunker;
use crate::types::{ChunkType, LocalChunk, TokenMode};
use std::collections::HashMap;
use std::fmt;
use tree_sitter::Parser;

/// Size guardrails for one grammar-engine language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassLimits {
    pub max_bytes: Option<usize>,
    pub max_lines: Option<usize>,
}

/// Where a pass takes its grammars from
#[derive(Clone, Default)]
pub enum GrammarSource {
    /// Compiled-in grammar registry
    #[default]
    Registry,
    /// Only the grammars a loader produced; anything else uses line windows
    Loaded(HashMap<String, tree_sitter::Language>),
}

impl GrammarSource {
    /// Grammar for a language, or `None` when this source cannot provide it
    pub fn resolve(&self, lang: Language) -> Option<tree_sitter::Language> {
        match self {
            Self::Registry => lang.tree_sitter_language().ok(),
            Self::Loaded(grammars) => grammars.get(lang.as_str()).cloned(),
        }
    }
}

/// Grammar-engine constraints for one chunking call
#[derive(Clone, Default)]
pub struct TreeSitterPass {
    /// Grammar parsing is allowed at all
    pub enabled: bool,
    /// Restrict parsing to these languages (`None` = every covered language)
    pub allowed_languages: Option<Vec<String>>,
    /// Global limits, overridable per language
    pub limits: PassLimits,
    pub by_language: HashMap<String, PassLimits>,
    pub grammars: GrammarSource,
}

impl fmt::Debug for TreeSitterPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeSitterPass")
            .field("enabled", &self.enabled)
            .field("allowed_languages", &self.allowed_languages)
            .field("limits", &self.limits)
            .field("by_language", &self.by_language)
            .field(
                "grammars",
                &match &self.grammars {
                    GrammarSource::Registry => "registry".to_string(),
                    GrammarSource::Loaded(grammars) => format!("{} loaded", grammars.len()),
                },
            )
            .finish()
    }
}

impl TreeSitterPass {
    /// Pass that never touches a grammar
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Pass allowing every covered language
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Constrain this pass to exactly one language and its preloaded grammar
    #[must_use]
    pub fn only(&self, language_id: &str, grammar: tree_sitter::Language) -> Self {
        Self {
            enabled: self.enabled,
            allowed_languages: Some(vec![language_id.to_string()]),
            limits: self.limits,
            by_language: self.by_language.clone(),
            grammars: GrammarSource::Loaded(HashMap::from([(language_id.to_string(), grammar)])),
        }
    }

    /// Restrict parsing to grammars a loader already produced
    #[must_use]
    pub fn with_grammars(mut self, grammars: HashMap<String, tree_sitter::Language>) -> Self {
        self.grammars = GrammarSource::Loaded(grammars);
        self
    }

    /// Copy of this pass with grammar parsing switched off
    #[must_use]
    pub fn without_grammar(&self) -> Self {
        Self {
            enabled: false,
            grammars: GrammarSource::Loaded(HashMap::new()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn allows(&self, language_id: &str) -> bool {
        self.enabled
            && self
                .allowed_languages
                .as_ref()
                .map_or(true, |allowed| allowed.iter().any(|l| l == language_id))
    }

    /// Effective limits for a language (per-language override, else global)
    #[must_use]
    pub fn limits_for(&self, language_id: &str) -> PassLimits {
        let local = self.by_language.get(language_id).copied().unwrap_or_default();
        PassLimits {
            max_bytes: local.max_bytes.or(self.limits.max_bytes),
            max_lines: local.max_lines.or(self.limits.max_lines),
        }
    }
}

/// One call into a structural chunker, in segment-local coordinates
#[derive(Debug, Clone, Copy)]
pub struct ChunkRequest<'a> {
    /// Segment text
    pub text: &'a str,
    /// Extension the segment is routed through (leading dot)
    pub ext: &'a str,
    pub rel_path: &'a str,
    pub mode: TokenMode,
    pub language_id: Option<&'a str>,
    pub tree_sitter: &'a TreeSitterPass,
}

/// Per-language structural chunker invoked once per segment.
///
/// The parser is owned by the caller: a private instance on the single-pass
/// path, the scheduler's shared instance inside a grammar pass.
pub trait StructuralChunker: Send + Sync {
    fn chunk(&self, request: &ChunkRequest<'_>, parser: &mut Parser) -> Result<Vec<LocalChunk>>;
}

/// Declaration-level chunking via tree-sitter, line windows everywhere else
#[derive(Debug, Clone)]
pub struct AstChunker {
    config: ChunkerConfig,
    fallback: HeuristicChunker,
}

impl Default for AstChunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
            fallback: HeuristicChunker::default(),
        }
    }
}

impl AstChunker {
    /// Create a new chunker with configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self {
            fallback: HeuristicChunker::new(config.clone()),
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Language the grammar engine would parse this request with, if allowed
    fn grammar_language(&self, request: &ChunkRequest<'_>) -> Option<Language> {
        if self.config.strategy == ChunkingStrategy::LineCount || request.mode == TokenMode::Prose {
            return None;
        }
        let lang = resolve_tree_sitter_language(request.language_id, request.ext)?;
        if !request.tree_sitter.allows(lang.as_str()) {
            return None;
        }
        if let GrammarSource::Loaded(loaded) = &request.tree_sitter.grammars {
            if !loaded.contains_key(lang.as_str()) {
                return None;
            }
        }
        let limits = request.tree_sitter.limits_for(lang.as_str());
        if limits.max_bytes.is_some_and(|max| request.text.len() > max) {
            log::debug!(
                "{}: {} segment over maxBytes, using line windows",
                request.rel_path,
                lang.as_str()
            );
            return None;
        }
        if let Some(max) = limits.max_lines {
            if request.text.lines().count() > max {
                log::debug!(
                    "{}: {} segment over maxLines, using line windows",
                    request.rel_path,
                    lang.as_str()
                );
                return None;
            }
        }
        Some(lang)
    }

    fn chunk_with_ast(
        &self,
        request: &ChunkRequest<'_>,
        lang: Language,
        parser: &mut Parser,
    ) -> Result<Vec<LocalChunk>> {
        let grammar = request.tree_sitter.grammars.resolve(lang).ok_or_else(|| {
            ChunkerError::tree_sitter(format!("No grammar available for {}", lang.as_str()))
        })?;
        parser
            .set_language(&grammar)
            .map_err(|e| ChunkerError::tree_sitter(format!("Failed to set language: {e}")))?;
        let tree = parser
            .parse(request.text, None)
            .ok_or_else(|| ChunkerError::parse("Failed to parse source code"))?;
        Ok(AstAnalyzer::new(lang, request.text).chunk(tree.root_node()))
    }
}

impl StructuralChunker for AstChunker {
    fn chunk(&self, request: &ChunkRequest<'_>, parser: &mut Parser) -> Result<Vec<LocalChunk>> {
        if let Some(lang) = self.grammar_language(request) {
            match self.chunk_with_ast(request, lang, parser) {
                Ok(chunks) if !chunks.is_empty() => return Ok(chunks),
                Ok(_) => {}
                Err(e) => {
                    log::warn!("AST chunking failed for {}, falling back to line windows: {e}", request.rel_path);
                }
            }
        }
        let kind = match request.mode {
            TokenMode::Prose => ChunkType::Section,
            TokenMode::Code => ChunkType::Other,
        };
        Ok(self.fallback.chunk_by_lines(request.text, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request<'a>(text: &'a str, ext: &'a str, pass: &'a TreeSitterPass) -> ChunkRequest<'a> {
        ChunkRequest {
            text,
            ext,
            rel_path: "test",
            mode: TokenMode::Code,
            language_id: None,
            tree_sitter: pass,
        }
    }

    const RUST: &str = "fn a() {}\n\nfn b() {}\n";

    #[test]
    fn parses_when_grammar_allowed() {
        let pass = TreeSitterPass::enabled();
        let chunks = AstChunker::default()
            .chunk(&request(RUST, ".rs", &pass), &mut Parser::new())
            .unwrap();
        let names: Vec<_> = chunks.iter().map(|c| c.name.as_deref()).collect();
        assert_eq!(names, vec![Some("a"), Some("b")]);
    }

    #[test]
    fn disabled_pass_uses_line_windows() {
        let pass = TreeSitterPass::disabled();
        let chunks = AstChunker::default()
            .chunk(&request(RUST, ".rs", &pass), &mut Parser::new())
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind.as_deref(), Some("other"));
    }

    #[test]
    fn allowed_list_and_limits() {
        let python = Language::Python.tree_sitter_language().unwrap();
        let pass = TreeSitterPass::enabled().only("python", python);
        assert!(pass.allows("python"));
        assert!(!pass.allows("rust"));
        let chunks = AstChunker::default()
            .chunk(&request(RUST, ".rs", &pass), &mut Parser::new())
            .unwrap();
        assert!(chunks.iter().all(|c| c.name.is_none()));

        let mut limited = TreeSitterPass::enabled();
        limited.limits.max_bytes = Some(10_000);
        limited.by_language.insert(
            "rust".to_string(),
            PassLimits {
                max_bytes: Some(5),
                max_lines: None,
            },
        );
        assert_eq!(limited.limits_for("rust").max_bytes, Some(5));
        assert_eq!(limited.limits_for("python").max_bytes, Some(10_000));
        let chunks = AstChunker::default()
            .chunk(&request(RUST, ".rs", &limited), &mut Parser::new())
            .unwrap();
        assert!(chunks.iter().all(|c| c.name.is_none()));
    }

    #[test]
    fn loaded_grammars_gate_parsing() {
        let empty = TreeSitterPass::enabled().with_grammars(HashMap::new());
        let chunks = AstChunker::default()
            .chunk(&request(RUST, ".rs", &empty), &mut Parser::new())
            .unwrap();
        assert!(chunks.iter().all(|c| c.name.is_none()));

        let rust = Language::Rust.tree_sitter_language().unwrap();
        let loaded = TreeSitterPass::enabled().with_grammars(HashMap::from([("rust".to_string(), rust)]));
        let chunks = AstChunker::default()
            .chunk(&request(RUST, ".rs", &loaded), &mut Parser::new())
            .unwrap();
        let names: Vec<_> = chunks.iter().map(|c| c.name.as_deref()).collect();
        assert_eq!(names, vec![Some("a"), Some("b")]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ChunkerConfig {
            max_chunk_lines: 0,
            target_chunk_lines: 0,
            min_chunk_lines: 0,
            ..Default::default()
        };
        assert!(matches!(AstChunker::new(config), Err(ChunkerError::InvalidConfig(_))));
    }
}
