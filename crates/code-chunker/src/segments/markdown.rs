use super::finalize::{fill_gaps, has_content, segment_id};
use crate::config::SegmentsConfig;
use crate::language::Language;
use crate::types::{EmbeddingContext, Segment, SegmentType};

/// Leading metadata block of a Markdown-like document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frontmatter {
    /// Start of the opening fence (always 0)
    pub start: usize,
    /// End of the closing fence line, including its newline
    pub end: usize,
    /// Start of the body between the fences
    pub content_start: usize,
    /// End of the body (start of the closing fence line)
    pub content_end: usize,
    /// Language implied by the fence (`---` yaml, `+++` toml, `;;;` json)
    pub language: Language,
}

/// Detect a frontmatter block at the very start of `text`
#[must_use]
pub fn detect_frontmatter(text: &str) -> Option<Frontmatter> {
    let (fence, language) = [
        ("---", Language::Yaml),
        ("+++", Language::Toml),
        (";;;", Language::Json),
    ]
    .into_iter()
    .find(|(fence, _)| text.starts_with(fence))?;

    let mut lines = LineIter::new(text);
    let first = lines.next()?;
    if trim_line(first.text) != fence {
        return None;
    }
    let content_start = first.next_start;
    for line in lines {
        let trimmed = trim_line(line.text);
        if trimmed == fence || (fence == "---" && trimmed == "...") {
            return Some(Frontmatter {
                start: 0,
                end: line.next_start,
                content_start,
                content_end: line.start,
                language,
            });
        }
    }
    None
}

/// Segment a Markdown/MDX document into frontmatter, fenced blocks,
/// optional inline code spans, and prose gaps.
pub(super) fn segment(text: &str, rel_path: &str, config: &SegmentsConfig) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut covered: Vec<(usize, usize)> = Vec::new();

    let frontmatter = detect_frontmatter(text);
    if let Some(fm) = frontmatter {
        let lang = fm.language.as_str();
        segments.push(
            Segment::new(SegmentType::Config, Some(lang), fm.start, fm.end, EmbeddingContext::Config)
                .with_meta("frontmatter", true)
                .with_ext(fm.language.ext()),
        );
        if config.frontmatter_prose {
            segments.push(
                Segment::new(
                    SegmentType::Prose,
                    Some("markdown"),
                    fm.start,
                    fm.end,
                    EmbeddingContext::Prose,
                )
                .with_meta("frontmatter", true),
            );
        }
        covered.push((fm.start, fm.end));
    }

    let body_start = frontmatter.map_or(0, |fm| fm.end);
    for fence in scan_fences(text, body_start) {
        covered.push((fence.block_start, fence.block_end));
        let language = Language::from_alias(&fence.info);
        let mut seg = match language {
            Some(lang) => {
                let context = if lang.is_config() {
                    EmbeddingContext::Config
                } else {
                    EmbeddingContext::Code
                };
                Segment::new(
                    SegmentType::Embedded,
                    Some(lang.as_str()),
                    fence.body_start,
                    fence.body_end,
                    context,
                )
                .with_ext(lang.ext())
            }
            None => Segment::new(
                SegmentType::Code,
                None,
                fence.body_start,
                fence.body_end,
                EmbeddingContext::Code,
            ),
        };
        seg = seg.with_meta("block", "fence");
        if !fence.info.is_empty() {
            seg = seg.with_meta("fenceInfo", fence.info.clone());
        }
        if !fence.closed {
            seg = seg.with_meta("unterminated", true);
        }
        segments.push(seg);
    }

    let prose = fill_gaps(text, &covered, |start, end| {
        Segment::new(SegmentType::Prose, Some("markdown"), start, end, EmbeddingContext::Prose)
    });

    if config.inline_code_spans {
        let mut budget = InlineBudget {
            spans: 0,
            bytes: 0,
            config,
        };
        for parent in &prose {
            let parent_id = segment_id(rel_path, parent);
            for (start, end) in inline_code_spans(text, parent.start, parent.end) {
                match budget.admit(text, start, end) {
                    Admit::Take => {}
                    Admit::Skip => continue,
                    Admit::Stop => break,
                }
                segments.push(
                    Segment::new(SegmentType::Code, None, start, end, EmbeddingContext::Code)
                        .with_meta("inlineCode", true)
                        .with_parent(parent_id.clone()),
                );
            }
        }
    }

    segments.extend(prose);
    Some(segments)
}

enum Admit {
    Take,
    Skip,
    Stop,
}

struct InlineBudget<'a> {
    spans: usize,
    bytes: usize,
    config: &'a SegmentsConfig,
}

impl InlineBudget<'_> {
    fn admit(&mut self, text: &str, start: usize, end: usize) -> Admit {
        let len = end - start;
        if self.spans >= self.config.inline_code_max_spans
            || self.bytes + len > self.config.inline_code_max_bytes
        {
            return Admit::Stop;
        }
        let visible = text[start..end].chars().filter(|c| !c.is_whitespace()).count();
        if visible < self.config.inline_code_min_chars {
            return Admit::Skip;
        }
        self.spans += 1;
        self.bytes += len;
        Admit::Take
    }
}

#[derive(Debug)]
struct Fence {
    block_start: usize,
    block_end: usize,
    body_start: usize,
    body_end: usize,
    info: String,
    closed: bool,
}

struct OpenFence {
    marker: u8,
    count: usize,
    block_start: usize,
    body_start: usize,
    info: String,
}

fn scan_fences(text: &str, from: usize) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut open: Option<OpenFence> = None;

    for line in LineIter::new(text).filter(|line| line.start >= from) {
        match open.take() {
            None => {
                open = parse_fence_open(line.text).map(|(marker, count, info)| OpenFence {
                    marker,
                    count,
                    block_start: line.start,
                    body_start: line.next_start,
                    info,
                });
            }
            Some(current) => {
                if is_fence_close(line.text, current.marker, current.count) {
                    fences.push(Fence {
                        block_start: current.block_start,
                        block_end: line.next_start,
                        body_start: current.body_start,
                        body_end: line.start,
                        info: current.info,
                        closed: true,
                    });
                } else {
                    open = Some(current);
                }
            }
        }
    }

    if let Some(current) = open {
        fences.push(Fence {
            block_start: current.block_start,
            block_end: text.len(),
            body_start: current.body_start.min(text.len()),
            body_end: text.len(),
            info: current.info,
            closed: false,
        });
    }
    fences
}

fn parse_fence_open(line: &str) -> Option<(u8, usize, String)> {
    let line = trim_line(line);
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let marker = *rest.as_bytes().first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let count = rest.bytes().take_while(|b| *b == marker).count();
    if count < 3 {
        return None;
    }
    let info = rest[count..].trim();
    if marker == b'`' && info.contains('`') {
        return None;
    }
    Some((marker, count, info.to_string()))
}

fn is_fence_close(line: &str, marker: u8, count: usize) -> bool {
    let line = trim_line(line);
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return false;
    }
    let rest = &line[indent..];
    let run = rest.bytes().take_while(|b| *b == marker).count();
    run >= count && rest[run..].trim().is_empty()
}

/// Inline code span contents (between the backtick runs) inside `[start, end)`
fn inline_code_spans(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = start;
    while i < end {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run = bytes[i..end].iter().take_while(|b| **b == b'`').count();
        let content_start = i + run;
        let mut j = content_start;
        let mut closed = None;
        while j < end {
            if bytes[j] == b'`' {
                let close = bytes[j..end].iter().take_while(|b| **b == b'`').count();
                if close == run {
                    closed = Some(j);
                    break;
                }
                j += close;
            } else {
                j += 1;
            }
        }
        match closed {
            Some(content_end) => {
                if has_content(text, content_start, content_end) {
                    spans.push((content_start, content_end));
                }
                i = content_end + run;
            }
            None => i = content_start,
        }
    }
    spans
}

fn trim_line(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

struct Line<'a> {
    start: usize,
    next_start: usize,
    text: &'a str,
}

struct LineIter<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> LineIter<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for LineIter<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.text.len() {
            return None;
        }
        let start = self.pos;
        let next_start = self.text[start..]
            .find('\n')
            .map_or(self.text.len(), |i| start + i + 1);
        self.pos = next_start;
        Some(Line {
            start,
            next_start,
            text: &self.text[start..next_start],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ranges(segments: &[Segment]) -> Vec<(SegmentType, Option<&str>, usize, usize)> {
        let mut out: Vec<_> = segments
            .iter()
            .map(|s| (s.segment_type, s.language_id.as_deref(), s.start, s.end))
            .collect();
        out.sort_by_key(|r| (r.2, r.3));
        out
    }

    #[test]
    fn fenced_block_body_is_embedded() {
        let text = "# Guide\n\n```tsx\nconst View = () => <div />;\n```\n";
        let segments = segment(text, "guide.md", &SegmentsConfig::default()).unwrap();
        let body_start = text.find("const").unwrap();
        let body_end = text.rfind("```").unwrap();
        assert_eq!(
            ranges(&segments),
            vec![
                (SegmentType::Prose, Some("markdown"), 0, 9),
                (SegmentType::Embedded, Some("tsx"), body_start, body_end),
            ]
        );
        let fence = segments.iter().find(|s| s.language_id.as_deref() == Some("tsx")).unwrap();
        assert_eq!(fence.ext.as_deref(), Some(".tsx"));
        assert_eq!(fence.meta_str("fenceInfo"), Some("tsx"));
    }

    #[test]
    fn config_fences_use_config_context() {
        let text = "intro\n~~~~json\n{\"a\": 1}\n~~~~\n";
        let segments = segment(text, "a.md", &SegmentsConfig::default()).unwrap();
        let json = segments.iter().find(|s| s.language_id.as_deref() == Some("json")).unwrap();
        assert_eq!(json.embedding_context, EmbeddingContext::Config);
    }

    #[test]
    fn unterminated_fence_runs_to_eof() {
        let text = "text\n```python\ndef f():\n    pass\n";
        let segments = segment(text, "a.md", &SegmentsConfig::default()).unwrap();
        let py = segments.iter().find(|s| s.language_id.as_deref() == Some("python")).unwrap();
        assert_eq!(py.end, text.len());
        assert_eq!(py.meta.get("unterminated"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn shorter_closing_run_does_not_close() {
        let text = "````md\n```\ninner\n```\n````\nafter\n";
        let fences = scan_fences(text, 0);
        assert_eq!(fences.len(), 1);
        assert_eq!(&text[fences[0].body_start..fences[0].body_end], "```\ninner\n```\n");
    }

    #[test]
    fn frontmatter_variants() {
        let yaml = detect_frontmatter("---\ntitle: x\n---\nbody").unwrap();
        assert_eq!(yaml.language, Language::Yaml);
        assert_eq!((yaml.content_start, yaml.content_end, yaml.end), (4, 13, 17));

        let dots = detect_frontmatter("---\na: 1\n...\n").unwrap();
        assert_eq!(dots.end, 13);

        let toml = detect_frontmatter("+++\na = 1\n+++\n").unwrap();
        assert_eq!(toml.language, Language::Toml);

        assert!(detect_frontmatter("---\nnever closed\n").is_none());
        assert!(detect_frontmatter("----\nx\n----\n").is_none());
        assert!(detect_frontmatter("\n---\nx\n---\n").is_none());
    }

    #[test]
    fn frontmatter_segments() {
        let text = "---\ntitle: x\n---\nbody text\n";
        let config = SegmentsConfig {
            frontmatter_prose: true,
            ..Default::default()
        };
        let segments = segment(text, "a.md", &config).unwrap();
        assert_eq!(
            ranges(&segments),
            vec![
                (SegmentType::Config, Some("yaml"), 0, 17),
                (SegmentType::Prose, Some("markdown"), 0, 17),
                (SegmentType::Prose, Some("markdown"), 17, text.len()),
            ]
        );
    }

    #[test]
    fn inline_spans_respect_min_chars_and_budget() {
        let text = "Call `short` or `configure_everything()` then `another_long_call()`.\n";
        let config = SegmentsConfig {
            inline_code_spans: true,
            inline_code_max_spans: 1,
            ..Default::default()
        };
        let segments = segment(text, "a.md", &config).unwrap();
        let spans: Vec<&str> = segments
            .iter()
            .filter(|s| s.meta.contains_key("inlineCode"))
            .map(|s| &text[s.start..s.end])
            .collect();
        assert_eq!(spans, vec!["configure_everything()"]);

        let prose = segments.iter().find(|s| s.segment_type == SegmentType::Prose).unwrap();
        let child = segments.iter().find(|s| s.meta.contains_key("inlineCode")).unwrap();
        assert_eq!(
            child.parent_segment_id.as_deref(),
            Some(segment_id("a.md", prose).as_str())
        );
    }

    #[test]
    fn double_backtick_spans() {
        let text = "x ``a ` b`` y";
        assert_eq!(inline_code_spans(text, 0, text.len()), vec![(4, 9)]);
    }
}
