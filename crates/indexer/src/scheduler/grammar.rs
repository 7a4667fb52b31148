use crate::{IndexerError, Result};
use async_trait::async_trait;
use context_code_chunker::Language;
use tree_sitter::Parser;

/// Source of grammars for the engine
#[async_trait]
pub trait GrammarLoader: Send + Sync {
    async fn load(&self, language_id: &str) -> Result<tree_sitter::Language>;
}

/// Grammars compiled into the chunker crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinGrammarLoader;

#[async_trait]
impl GrammarLoader for BuiltinGrammarLoader {
    async fn load(&self, language_id: &str) -> Result<tree_sitter::Language> {
        let lang = Language::from_id(language_id)
            .filter(|lang| lang.supports_ast())
            .ok_or_else(|| IndexerError::GrammarUnavailable(language_id.to_string()))?;
        Ok(lang.tree_sitter_language()?)
    }
}

/// Loaded grammars, oldest first
#[derive(Default)]
pub struct GrammarTable {
    loaded: Vec<(String, tree_sitter::Language)>,
}

impl GrammarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grammar; reloading an id moves it to the newest position
    pub fn preload(&mut self, language_id: &str, grammar: tree_sitter::Language) {
        self.loaded.retain(|(id, _)| id != language_id);
        self.loaded.push((language_id.to_string(), grammar));
    }

    #[must_use]
    pub fn get(&self, language_id: &str) -> Option<&tree_sitter::Language> {
        self.loaded
            .iter()
            .find(|(id, _)| id == language_id)
            .map(|(_, grammar)| grammar)
    }

    #[must_use]
    pub fn is_loaded(&self, language_id: &str) -> bool {
        self.get(language_id).is_some()
    }

    #[must_use]
    pub fn loaded_languages(&self) -> Vec<String> {
        self.loaded.iter().map(|(id, _)| id.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    /// Evict grammars not in `keep`, oldest first, until at most `max` remain.
    ///
    /// With `only_if_exceeds` unset every grammar outside `keep` is evicted.
    /// Returns the evicted ids.
    pub fn prune(&mut self, keep: &[&str], max: usize, only_if_exceeds: bool) -> Vec<String> {
        if only_if_exceeds && self.loaded.len() <= max {
            return Vec::new();
        }
        let mut evicted = Vec::new();
        let mut i = 0;
        while i < self.loaded.len() {
            let over = self.loaded.len() > max;
            let kept = keep.contains(&self.loaded[i].0.as_str());
            if !kept && (over || !only_if_exceeds) {
                evicted.push(self.loaded.remove(i).0);
            } else {
                i += 1;
            }
        }
        evicted
    }
}

/// Grammar table plus the parser every grammar pass shares
pub struct GrammarEngine {
    table: GrammarTable,
    parser: Parser,
}

impl Default for GrammarEngine {
    fn default() -> Self {
        Self {
            table: GrammarTable::new(),
            parser: Parser::new(),
        }
    }
}

impl GrammarEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hard reset: the next pass starts from a fresh parser
    pub fn reset(&mut self) {
        self.parser = Parser::new();
    }

    #[must_use]
    pub const fn table(&self) -> &GrammarTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut GrammarTable {
        &mut self.table
    }

    pub fn parser_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }

    /// Reset, make room and load one language.
    ///
    /// Load failures are logged and yield `None`; the pass then runs on the
    /// heuristic chunker.
    pub async fn prepare(
        &mut self,
        language_id: &str,
        loader: &dyn GrammarLoader,
        max_loaded: usize,
    ) -> Option<tree_sitter::Language> {
        self.reset();
        let room = if self.table.is_loaded(language_id) {
            max_loaded
        } else {
            max_loaded.saturating_sub(1)
        };
        let evicted = self.table.prune(&[language_id], room, true);
        if !evicted.is_empty() {
            log::debug!("Evicted grammars {evicted:?} before loading {language_id}");
        }
        if !self.table.is_loaded(language_id) {
            match loader.load(language_id).await {
                Ok(grammar) => self.table.preload(language_id, grammar),
                Err(e) => {
                    log::debug!("Grammar preload failed for {language_id}: {e}");
                    return None;
                }
            }
        }
        self.table.get(language_id).cloned()
    }
}
