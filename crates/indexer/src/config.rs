use context_code_chunker::{
    GrammarSource, PassLimits, SegmentsConfig, TreeSitterPass, TREE_SITTER_LANGUAGE_IDS,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Per-language tree-sitter overrides; unset fields inherit the global value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LanguageTreeSitterOptions {
    pub enabled: Option<bool>,
    pub max_bytes: Option<usize>,
    pub max_lines: Option<usize>,
    pub max_parse_ms: Option<u64>,
    pub max_ast_nodes: Option<usize>,
    pub max_ast_stack: Option<usize>,
    pub max_chunk_nodes: Option<usize>,
}

/// Scaling thresholds for dense files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdaptiveConfig {
    pub enabled: bool,
    pub dense_threshold: Option<f64>,
    pub denser_threshold: Option<f64>,
    pub dense_scale: Option<f64>,
    pub denser_scale: Option<f64>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dense_threshold: None,
            denser_threshold: None,
            dense_scale: None,
            denser_scale: None,
        }
    }
}

/// Grammar engine configuration for one indexing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeSitterConfig {
    pub enabled: bool,

    /// Chunk multi-language files in serialized per-language passes
    pub language_passes: bool,

    /// Defer files whose grammars are not loaded for the current batch
    pub defer_missing: bool,
    pub defer_missing_max: usize,

    /// Restrict the grammar set (`None` = every covered language)
    pub allowed_languages: Option<Vec<String>>,

    /// Grammar table pressure cap
    pub max_loaded_languages: usize,

    pub max_bytes: Option<usize>,
    pub max_lines: Option<usize>,
    pub max_parse_ms: Option<u64>,
    pub max_ast_nodes: Option<usize>,
    pub max_ast_stack: Option<usize>,
    pub max_chunk_nodes: Option<usize>,
    pub by_language: BTreeMap<String, LanguageTreeSitterOptions>,

    pub adaptive: Option<AdaptiveConfig>,
    pub use_queries: Option<bool>,
    pub config_chunking: bool,

    pub chunk_cache: bool,
    pub chunk_cache_max_entries: usize,
    pub cache_persistent: bool,
    pub cache_persistent_dir: Option<PathBuf>,

    /// Base key for the chunk cache; the file hash is used when unset
    pub cache_key: Option<String>,

    /// Scheduler misses are fatal instead of falling back
    pub strict: bool,
}

impl Default for TreeSitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language_passes: true,
            defer_missing: true,
            defer_missing_max: 0,
            allowed_languages: None,
            max_loaded_languages: 4,
            max_bytes: None,
            max_lines: None,
            max_parse_ms: None,
            max_ast_nodes: None,
            max_ast_stack: None,
            max_chunk_nodes: None,
            by_language: BTreeMap::new(),
            adaptive: None,
            use_queries: None,
            config_chunking: false,
            chunk_cache: true,
            chunk_cache_max_entries: 64,
            cache_persistent: false,
            cache_persistent_dir: None,
            cache_key: None,
            strict: false,
        }
    }
}

impl TreeSitterConfig {
    /// Grammar engine switched off entirely
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Copy with the grammar engine switched off
    #[must_use]
    pub fn without_grammar(&self) -> Self {
        Self {
            enabled: false,
            ..self.clone()
        }
    }

    /// Copy constrained to exactly one language
    #[must_use]
    pub fn for_pass(&self, language_id: &str) -> Self {
        Self {
            allowed_languages: Some(vec![language_id.to_string()]),
            ..self.clone()
        }
    }

    /// Global switch, allowed list and per-language `enabled: false`
    #[must_use]
    pub fn is_language_enabled(&self, language_id: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(allowed) = &self.allowed_languages {
            if !allowed.iter().any(|l| l == language_id) {
                return false;
            }
        }
        self.by_language
            .get(language_id)
            .and_then(|opts| opts.enabled)
            .unwrap_or(true)
    }

    #[must_use]
    pub fn language_options(&self, language_id: &str) -> LanguageTreeSitterOptions {
        self.by_language.get(language_id).cloned().unwrap_or_default()
    }

    /// Effective size limits for a language
    #[must_use]
    pub fn limits_for(&self, language_id: &str) -> PassLimits {
        let local = self.by_language.get(language_id);
        PassLimits {
            max_bytes: local.and_then(|o| o.max_bytes).or(self.max_bytes),
            max_lines: local.and_then(|o| o.max_lines).or(self.max_lines),
        }
    }

    /// True when a segment of this language is too large for a grammar pass
    #[must_use]
    pub fn exceeds_limits(&self, language_id: &str, text: &str) -> bool {
        let limits = self.limits_for(language_id);
        limits.max_bytes.is_some_and(|max| text.len() > max)
            || limits.max_lines.is_some_and(|max| text.lines().count() > max)
    }

    /// Chunker-facing view of this configuration, without grammars attached
    #[must_use]
    pub fn to_pass(&self) -> TreeSitterPass {
        let has_disabled = self
            .by_language
            .values()
            .any(|opts| opts.enabled == Some(false));
        let allowed_languages = if has_disabled {
            Some(
                TREE_SITTER_LANGUAGE_IDS
                    .iter()
                    .filter(|id| self.is_language_enabled(id))
                    .map(|id| (*id).to_string())
                    .collect(),
            )
        } else {
            self.allowed_languages.clone()
        };
        TreeSitterPass {
            enabled: self.enabled,
            allowed_languages,
            limits: PassLimits {
                max_bytes: self.max_bytes,
                max_lines: self.max_lines,
            },
            by_language: self
                .by_language
                .keys()
                .map(|id| (id.clone(), self.limits_for(id)))
                .collect(),
            grammars: GrammarSource::Loaded(HashMap::new()),
        }
    }

    /// LRU capacity, never below one entry
    #[must_use]
    pub fn resolved_cache_entries(&self) -> usize {
        self.chunk_cache_max_entries.max(1)
    }

    /// Persistent cache root when the persistent tier is enabled
    #[must_use]
    pub fn persistent_cache_dir(&self) -> Option<&PathBuf> {
        if !self.cache_persistent {
            return None;
        }
        self.cache_persistent_dir
            .as_ref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_loaded_languages == 0 {
            return Err("max_loaded_languages must be > 0".to_string());
        }
        if self.cache_persistent && self.persistent_cache_dir().is_none() {
            return Err("cache_persistent requires cache_persistent_dir".to_string());
        }
        if let Some(adaptive) = &self.adaptive {
            let scales = [adaptive.dense_scale, adaptive.denser_scale];
            if scales.iter().flatten().any(|scale| *scale <= 0.0) {
                return Err("adaptive scales must be positive".to_string());
            }
        }
        for id in self.by_language.keys() {
            if !TREE_SITTER_LANGUAGE_IDS.contains(&id.as_str()) {
                return Err(format!("by_language: {id} has no tree-sitter grammar"));
            }
        }
        Ok(())
    }
}

/// Size cap for one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileCap {
    pub max_lines: Option<usize>,
    pub max_bytes: Option<usize>,
}

impl FileCap {
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            max_lines: self.max_lines.or(other.max_lines),
            max_bytes: self.max_bytes.or(other.max_bytes),
        }
    }
}

/// File caps by extension, then language, then the default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileCaps {
    pub default: FileCap,
    pub by_language: BTreeMap<String, FileCap>,
    /// Keys carry the leading dot
    pub by_ext: BTreeMap<String, FileCap>,
}

impl FileCaps {
    #[must_use]
    pub fn resolve(&self, ext: &str, language_id: Option<&str>) -> FileCap {
        let ext = ext.to_ascii_lowercase();
        let by_ext = self
            .by_ext
            .get(&ext)
            .or_else(|| self.by_ext.get(ext.trim_start_matches('.')))
            .copied()
            .unwrap_or_default();
        let by_language = language_id
            .and_then(|id| self.by_language.get(id))
            .copied()
            .unwrap_or_default();
        by_ext.or(by_language).or(self.default)
    }
}

/// Per-run options for the file processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LanguageOptions {
    /// Report parse failures as skips instead of errors
    pub skip_on_parse_error: bool,

    /// Skip code files with no registered language
    pub skip_unknown_languages: bool,

    pub tree_sitter: TreeSitterConfig,
    pub segments: SegmentsConfig,
    pub file_caps: FileCaps,
}

impl Default for LanguageOptions {
    fn default() -> Self {
        Self {
            skip_on_parse_error: true,
            skip_unknown_languages: false,
            tree_sitter: TreeSitterConfig::default(),
            segments: SegmentsConfig::default(),
            file_caps: FileCaps::default(),
        }
    }
}

impl LanguageOptions {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.tree_sitter.validate()?;
        self.segments.validate()
    }
}
