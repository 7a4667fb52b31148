use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque key/value bag carried by segments and chunks
pub type MetaMap = BTreeMap<String, serde_json::Value>;

/// Structural role of a segment inside its container file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    /// Source code in the container's (or a fence's) language
    Code,
    /// Natural-language text
    Prose,
    /// Structured configuration (frontmatter, json/yaml fences)
    Config,
    /// Comment extracted from code
    Comment,
    /// A block written in a different language than its container
    Embedded,
}

impl SegmentType {
    /// Get human-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Prose => "prose",
            Self::Config => "config",
            Self::Comment => "comment",
            Self::Embedded => "embedded",
        }
    }
}

/// Which indexing pass tokenizes a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingContext {
    Code,
    Prose,
    Config,
}

impl EmbeddingContext {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Prose => "prose",
            Self::Config => "config",
        }
    }
}

/// Indexing mode a file is processed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileMode {
    #[default]
    Code,
    Prose,
    /// Prose pulled out of code files (comments, frontmatter)
    ExtractedProse,
}

impl FileMode {
    /// Token mode used when tokenizing this file
    #[must_use]
    pub const fn token_mode(self) -> TokenMode {
        match self {
            Self::Code => TokenMode::Code,
            Self::Prose | Self::ExtractedProse => TokenMode::Prose,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Prose => "prose",
            Self::ExtractedProse => "extracted-prose",
        }
    }
}

/// Tokenizer flavour for a segment or file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMode {
    Code,
    Prose,
}

/// A half-open byte range `[start, end)` of a container file governed by one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Content-derived identifier, assigned when segments are finalized
    #[serde(default)]
    pub segment_id: String,

    #[serde(rename = "type")]
    pub segment_type: SegmentType,

    pub language_id: Option<String>,

    pub start: usize,

    pub end: usize,

    /// Back-reference to an enclosing segment (no ownership)
    #[serde(default)]
    pub parent_segment_id: Option<String>,

    pub embedding_context: EmbeddingContext,

    /// Extension declared by the segment itself, e.g. from a fence or `lang` attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: MetaMap,
}

impl Segment {
    /// Create a segment without an id; ids are assigned by finalization
    pub fn new(
        segment_type: SegmentType,
        language_id: Option<&str>,
        start: usize,
        end: usize,
        embedding_context: EmbeddingContext,
    ) -> Self {
        Self {
            segment_id: String::new(),
            segment_type,
            language_id: language_id.map(str::to_string),
            start,
            end,
            parent_segment_id: None,
            embedding_context,
            ext: None,
            meta: MetaMap::new(),
        }
    }

    /// Builder: attach a metadata entry
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Builder: set parent segment id
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_segment_id = Some(parent.into());
        self
    }

    /// Builder: set declared extension
    #[must_use]
    pub fn with_ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = Some(ext.into());
        self
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Read a string-valued metadata entry
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(serde_json::Value::as_str)
    }

    /// Trimmed back-reference attached to chunks
    #[must_use]
    pub fn to_ref(&self) -> SegmentRef {
        SegmentRef {
            segment_id: self.segment_id.clone(),
            segment_type: self.segment_type,
            language_id: self.language_id.clone(),
            start: self.start,
            end: self.end,
            parent_segment_id: self.parent_segment_id.clone(),
            embedding_context: self.embedding_context,
        }
    }
}

/// Segment fields downstream consumers need to recover a chunk's effective language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRef {
    pub segment_id: String,
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    pub language_id: Option<String>,
    pub start: usize,
    pub end: usize,
    pub parent_segment_id: Option<String>,
    pub embedding_context: EmbeddingContext,
}

/// Chunk metadata; line numbers are 1-based and inclusive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,

    #[serde(flatten)]
    pub extra: MetaMap,
}

impl ChunkMeta {
    #[must_use]
    pub fn with_lines(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line: Some(start_line),
            end_line: Some(end_line),
            extra: MetaMap::new(),
        }
    }
}

/// Chunk emitted by a structural chunker, in segment-local coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalChunk {
    pub start: usize,
    pub end: usize,
    pub name: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub meta: ChunkMeta,
}

impl LocalChunk {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            name: None,
            kind: None,
            meta: ChunkMeta::default(),
        }
    }

    /// Builder: set symbol name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: set structural kind
    #[must_use]
    pub fn kind(mut self, kind: ChunkType) -> Self {
        self.kind = Some(kind.as_str().to_string());
        self
    }

    /// Builder: set 1-based local line range
    #[must_use]
    pub const fn lines(mut self, start_line: usize, end_line: usize) -> Self {
        self.meta.start_line = Some(start_line);
        self.meta.end_line = Some(end_line);
        self
    }
}

/// Indexable unit in absolute container coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    pub name: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub meta: ChunkMeta,
    #[serde(default)]
    pub segment: Option<SegmentRef>,
}

impl Chunk {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Language the chunk was produced for, if its segment declared one
    #[must_use]
    pub fn language_id(&self) -> Option<&str> {
        self.segment.as_ref()?.language_id.as_deref()
    }
}

/// Structural classification used by the bundled chunkers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum ChunkType {
    /// Standalone function
    Function,
    /// Method inside a class
    Method,
    /// Class definition
    Class,
    /// Struct definition
    Struct,
    /// Enum definition
    Enum,
    /// Interface/Trait definition
    Interface,
    /// Module definition
    Module,
    /// Implementation block
    Impl,
    /// Type alias
    Type,
    /// Constant
    Const,
    /// Variable declaration
    Variable,
    /// Markup or prose section
    Section,
    /// Generic code block
    Other,
}

impl ChunkType {
    /// Get human-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Interface => "interface",
            Self::Module => "module",
            Self::Impl => "impl",
            Self::Type => "type",
            Self::Const => "const",
            Self::Variable => "variable",
            Self::Section => "section",
            Self::Other => "other",
        }
    }

    /// Check if this is a declaration type (vs usage)
    #[must_use]
    pub const fn is_declaration(self) -> bool {
        !matches!(self, Self::Section | Self::Other)
    }
}
