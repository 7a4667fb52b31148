use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] context_code_chunker::ChunkerError),

    #[error("Segment error: {0}")]
    SegmentError(#[from] context_code_chunker::SegmentError),

    /// A strict scheduler consumer found no chunks for a scheduled segment
    #[error("Missing scheduled chunks for {path}: {label}")]
    MissingScheduledChunks { path: String, label: String },

    #[error("Grammar unavailable for {0}")]
    GrammarUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Errors that must reach the caller even when skips are allowed
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingScheduledChunks { .. })
    }
}
