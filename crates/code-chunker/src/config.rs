use serde::{Deserialize, Serialize};

/// Configuration for segment discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentsConfig {
    /// Extract inline code spans from Markdown prose
    pub inline_code_spans: bool,

    /// Minimum non-whitespace length for an inline span to qualify
    pub inline_code_min_chars: usize,

    /// Maximum number of inline spans per file
    pub inline_code_max_spans: usize,

    /// Total byte budget for extracted inline spans
    pub inline_code_max_bytes: usize,

    /// Also emit frontmatter as a prose segment
    pub frontmatter_prose: bool,

    /// Skip discovery and return only caller-supplied segments
    pub only_extras: bool,
}

impl Default for SegmentsConfig {
    fn default() -> Self {
        Self {
            inline_code_spans: false,
            inline_code_min_chars: 8,
            inline_code_max_spans: 200,
            inline_code_max_bytes: 64 * 1024,
            frontmatter_prose: false,
            only_extras: false,
        }
    }
}

impl SegmentsConfig {
    /// Replay mode: only caller-supplied segments are returned
    pub fn only_extras() -> Self {
        Self {
            only_extras: true,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.inline_code_spans && self.inline_code_min_chars == 0 {
            return Err("inline_code_min_chars must be > 0 when inline spans are enabled".to_string());
        }
        Ok(())
    }
}

/// Configuration for the bundled structural chunker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkerConfig {
    /// Chunking strategy to use
    pub strategy: ChunkingStrategy,

    /// Overlap strategy for line windows
    pub overlap: OverlapStrategy,

    /// Target chunk size in lines (soft limit)
    pub target_chunk_lines: usize,

    /// Maximum chunk size in lines (hard limit for line windows)
    pub max_chunk_lines: usize,

    /// Minimum chunk size in lines; smaller trailing windows are merged back
    pub min_chunk_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::Semantic,
            overlap: OverlapStrategy::None,
            target_chunk_lines: 80,
            max_chunk_lines: 160,
            min_chunk_lines: 3,
        }
    }
}

impl ChunkerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.min_chunk_lines > self.target_chunk_lines {
            return Err(format!(
                "min_chunk_lines ({}) cannot exceed target_chunk_lines ({})",
                self.min_chunk_lines, self.target_chunk_lines
            ));
        }

        if self.target_chunk_lines > self.max_chunk_lines {
            return Err(format!(
                "target_chunk_lines ({}) cannot exceed max_chunk_lines ({})",
                self.target_chunk_lines, self.max_chunk_lines
            ));
        }

        if self.max_chunk_lines == 0 {
            return Err("max_chunk_lines must be > 0".to_string());
        }

        if let OverlapStrategy::FixedLines(n) = self.overlap {
            if n >= self.target_chunk_lines {
                return Err(format!(
                    "overlap ({n}) must be smaller than target_chunk_lines ({})",
                    self.target_chunk_lines
                ));
            }
        }

        Ok(())
    }
}

/// Strategy for chunking code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkingStrategy {
    /// Declarations from the syntax tree, line windows where no grammar applies
    Semantic,

    /// Fixed line windows only
    LineCount,
}

/// Strategy for overlapping line windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapStrategy {
    /// No overlap between chunks
    #[default]
    None,

    /// Fixed number of lines overlap
    FixedLines(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_valid() {
        assert!(ChunkerConfig::default().validate().is_ok());
        assert!(SegmentsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_only_extras_preset() {
        let config = SegmentsConfig::only_extras();
        assert!(config.only_extras);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ChunkerConfig::default();

        config.min_chunk_lines = 100;
        config.target_chunk_lines = 50;
        assert!(config.validate().is_err());

        config.min_chunk_lines = 5;
        config.target_chunk_lines = 200;
        config.max_chunk_lines = 100;
        assert!(config.validate().is_err());

        config.target_chunk_lines = 50;
        config.overlap = OverlapStrategy::FixedLines(50);
        assert!(config.validate().is_err());

        config.overlap = OverlapStrategy::FixedLines(5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_segments_config_defaults_from_json() {
        let config: SegmentsConfig =
            serde_json::from_str(r#"{"inlineCodeSpans": true}"#).unwrap();
        assert!(config.inline_code_spans);
        assert_eq!(config.inline_code_min_chars, 8);
        assert_eq!(config.inline_code_max_spans, 200);
        assert_eq!(config.inline_code_max_bytes, 65536);
        assert!(!config.only_extras);
    }
}
