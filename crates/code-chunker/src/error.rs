use thiserror::Error;

/// Result type for chunker operations
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur during chunk assembly
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// Failed to parse the source code
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Unsupported language
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Segment range does not fit the container text
    #[error("Invalid segment range: start={start}, end={end}, text length={len}")]
    InvalidSegment { start: usize, end: usize, len: usize },

    /// Tree-sitter error
    #[error("Tree-sitter error: {0}")]
    TreeSitterError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ChunkerError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create an unsupported language error
    pub fn unsupported_language(lang: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(lang.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a tree-sitter error
    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitterError(msg.into())
    }
}

/// Errors raised by segment discovery.
///
/// Format handlers never surface these: a handler that cannot make sense of its
/// container falls through to the next rule. Only structural problems with the
/// final segment list propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// A segment ends past the end of the container text
    #[error("Segment out of bounds: start={start}, end={end}, text length={len}")]
    OutOfBounds { start: usize, end: usize, len: usize },

    /// A segment boundary splits a UTF-8 character
    #[error("Segment boundary {offset} is not a character boundary")]
    NotCharBoundary { offset: usize },
}
