//! Segment discovery: which language governs which byte range of a container file.
//!
//! Each container format has one handler returning `Option<Vec<Segment>>`;
//! `None` means "no special segmentation here" and discovery falls through to
//! the whole-file default. Caller-supplied extra segments are merged into
//! whatever the handler produced and the combined list is finalized.

mod astro;
mod finalize;
mod jsx;
mod markdown;
mod markup;
mod svelte;
mod vue;

pub use finalize::{assign_segment_ids, finalize_segments, segment_id};
pub use markdown::{detect_frontmatter, Frontmatter};

use crate::config::SegmentsConfig;
use crate::error::SegmentError;
use crate::language::Language;
use crate::types::{EmbeddingContext, FileMode, Segment, SegmentType};
use finalize::validate_extra_segments;

/// Container formats with dedicated segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Markdown,
    Vue,
    Svelte,
    Astro,
    JsxTsx,
    Default,
}

impl Container {
    /// Pick the container format for a file extension
    pub fn from_ext(ext: &str) -> Self {
        match Language::from_extension(ext) {
            Some(Language::Markdown) => Self::Markdown,
            Some(Language::Vue) => Self::Vue,
            Some(Language::Svelte) => Self::Svelte,
            Some(Language::Astro) => Self::Astro,
            Some(Language::Jsx | Language::Tsx) => Self::JsxTsx,
            _ => Self::Default,
        }
    }
}

/// Inputs for one discovery call
#[derive(Clone, Copy)]
pub struct DiscoverRequest<'a> {
    pub text: &'a str,
    /// Container extension, with or without the leading dot
    pub ext: &'a str,
    pub rel_path: &'a str,
    pub mode: FileMode,
    /// Resolved language of the container file
    pub language_id: Option<&'a str>,
    pub config: &'a SegmentsConfig,
    pub extra_segments: &'a [Segment],
    /// Syntax tree already parsed by the caller, reused for JSX/TSX
    pub tree: Option<&'a tree_sitter::Tree>,
}

impl<'a> DiscoverRequest<'a> {
    pub fn new(text: &'a str, ext: &'a str, rel_path: &'a str, config: &'a SegmentsConfig) -> Self {
        Self {
            text,
            ext,
            rel_path,
            mode: FileMode::Code,
            language_id: None,
            config,
            extra_segments: &[],
            tree: None,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn language_id(mut self, language_id: Option<&'a str>) -> Self {
        self.language_id = language_id;
        self
    }

    #[must_use]
    pub const fn extra_segments(mut self, extra_segments: &'a [Segment]) -> Self {
        self.extra_segments = extra_segments;
        self
    }

    #[must_use]
    pub const fn tree(mut self, tree: Option<&'a tree_sitter::Tree>) -> Self {
        self.tree = tree;
        self
    }
}

/// Discover the segments of a container file.
///
/// The result is sorted by `(start, end)`, contains no empty ranges and
/// carries deterministic segment ids.
pub fn discover_segments(request: &DiscoverRequest<'_>) -> Result<Vec<Segment>, SegmentError> {
    let DiscoverRequest {
        text,
        ext,
        rel_path,
        config,
        extra_segments,
        ..
    } = *request;
    validate_extra_segments(extra_segments, text)?;

    if config.only_extras {
        return Ok(finalize_segments(extra_segments.to_vec(), rel_path));
    }

    let container = Container::from_ext(ext);
    let discovered = match container {
        Container::Markdown => markdown::segment(text, rel_path, config),
        Container::Vue => vue::segment(text),
        Container::Svelte => svelte::segment(text),
        Container::Astro => astro::segment(text),
        Container::JsxTsx => jsx::segment(text, ext, request.language_id, request.tree),
        Container::Default => None,
    };
    let mut segments = discovered.unwrap_or_else(|| {
        if container != Container::Default {
            log::debug!("{rel_path}: no {container:?} segmentation, using whole-file segment");
        }
        default_segments(request)
    });

    segments.extend_from_slice(extra_segments);
    Ok(finalize_segments(segments, rel_path))
}

fn default_segments(request: &DiscoverRequest<'_>) -> Vec<Segment> {
    let end = request.text.len();
    let ext_lang = Language::from_extension(request.ext);
    let language_id = request.language_id.or(ext_lang.map(Language::as_str));

    let segment = match request.mode {
        FileMode::Prose => {
            Segment::new(SegmentType::Prose, language_id, 0, end, EmbeddingContext::Prose)
        }
        _ if ext_lang.is_some_and(Language::is_config) => {
            Segment::new(SegmentType::Config, language_id, 0, end, EmbeddingContext::Config)
        }
        _ => Segment::new(SegmentType::Code, language_id, 0, end, EmbeddingContext::Code),
    };
    vec![segment]
}

/// Segment written in `lang` inside a container of another language
pub(crate) fn embedded(lang: Language, start: usize, end: usize) -> Segment {
    let context = if lang.is_config() {
        EmbeddingContext::Config
    } else {
        EmbeddingContext::Code
    };
    Segment::new(SegmentType::Embedded, Some(lang.as_str()), start, end, context).with_ext(lang.ext())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn container_dispatch() {
        assert_eq!(Container::from_ext(".md"), Container::Markdown);
        assert_eq!(Container::from_ext("mdx"), Container::Markdown);
        assert_eq!(Container::from_ext(".vue"), Container::Vue);
        assert_eq!(Container::from_ext(".tsx"), Container::JsxTsx);
        assert_eq!(Container::from_ext(".ts"), Container::Default);
    }

    #[test]
    fn default_segment_types() {
        let config = SegmentsConfig::default();
        let code = discover_segments(&DiscoverRequest::new("fn main() {}\n", ".rs", "main.rs", &config)).unwrap();
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].segment_type, SegmentType::Code);
        assert_eq!(code[0].language_id.as_deref(), Some("rust"));

        let json = discover_segments(&DiscoverRequest::new("{}", ".json", "a.json", &config)).unwrap();
        assert_eq!(json[0].segment_type, SegmentType::Config);
        assert_eq!(json[0].embedding_context, EmbeddingContext::Config);

        let prose = discover_segments(
            &DiscoverRequest::new("hello", ".txt", "a.txt", &config).mode(FileMode::Prose),
        )
        .unwrap();
        assert_eq!(prose[0].segment_type, SegmentType::Prose);
    }

    #[test]
    fn empty_file_has_no_segments() {
        let config = SegmentsConfig::default();
        assert!(discover_segments(&DiscoverRequest::new("", ".rs", "a.rs", &config))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn extras_are_merged_and_sorted() {
        let config = SegmentsConfig::default();
        let text = "// note\nfn main() {}\n";
        let extras = [Segment::new(SegmentType::Comment, None, 0, 7, EmbeddingContext::Prose)];
        let segments = discover_segments(
            &DiscoverRequest::new(text, ".rs", "a.rs", &config).extra_segments(&extras),
        )
        .unwrap();
        let ranges: Vec<_> = segments.iter().map(|s| (s.segment_type, s.start, s.end)).collect();
        assert_eq!(
            ranges,
            vec![(SegmentType::Comment, 0, 7), (SegmentType::Code, 0, text.len())]
        );
    }

    #[test]
    fn only_extras_skips_discovery() {
        let config = SegmentsConfig::only_extras();
        let extras = [Segment::new(SegmentType::Comment, None, 2, 5, EmbeddingContext::Prose)];
        let segments = discover_segments(
            &DiscoverRequest::new("# a\n```rs\nx\n```\n", ".md", "a.md", &config)
                .extra_segments(&extras),
        )
        .unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment_type, SegmentType::Comment);
    }

    #[test]
    fn extra_past_end_is_structural_error() {
        let config = SegmentsConfig::default();
        let extras = [Segment::new(SegmentType::Comment, None, 0, 99, EmbeddingContext::Prose)];
        let err = discover_segments(
            &DiscoverRequest::new("short", ".rs", "a.rs", &config).extra_segments(&extras),
        )
        .unwrap_err();
        assert!(matches!(err, SegmentError::OutOfBounds { end: 99, .. }));
    }

    #[test]
    fn discovery_is_deterministic() {
        let config = SegmentsConfig::default();
        let text = "# Guide\n\n```tsx\nconst View = () => <div />;\n```\n";
        let request = DiscoverRequest::new(text, ".md", "docs/guide.md", &config);
        let a = discover_segments(&request).unwrap();
        let b = discover_segments(&request).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn broken_component_falls_back_to_whole_file() {
        let config = SegmentsConfig::default();
        let segments =
            discover_segments(&DiscoverRequest::new("no blocks here", ".vue", "a.vue", &config)).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].language_id.as_deref(), Some("vue"));
    }
}
