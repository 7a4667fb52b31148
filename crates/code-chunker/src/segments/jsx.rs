use super::embedded;
use super::finalize::has_content;
use crate::language::Language;
use crate::types::{EmbeddingContext, Segment, SegmentType};
use tree_sitter::{Parser, Tree};

const JSX_KINDS: [&str; 3] = ["jsx_element", "jsx_self_closing_element", "jsx_fragment"];

/// Alternate host-language code with merged JSX markup ranges.
///
/// Returns `None` when the file cannot be parsed or holds no JSX.
pub(super) fn segment(
    text: &str,
    ext: &str,
    host_language: Option<&str>,
    tree: Option<&Tree>,
) -> Option<Vec<Segment>> {
    let lang = Language::from_extension(ext)?;
    let owned;
    let tree = match tree {
        Some(tree) => tree,
        None => {
            owned = parse(text, lang)?;
            &owned
        }
    };

    let ranges = merge_ranges(collect_jsx_ranges(tree));
    if ranges.is_empty() {
        return None;
    }

    let host = host_language.unwrap_or(lang.as_str());
    let mut segments = Vec::with_capacity(ranges.len() * 2 + 1);
    let mut cursor = 0;
    let push_code = |start: usize, end: usize, out: &mut Vec<Segment>| {
        if end > start && has_content(text, start, end) {
            out.push(
                Segment::new(SegmentType::Code, Some(host), start, end, EmbeddingContext::Code)
                    .with_ext(lang.ext()),
            );
        }
    };
    for (start, end) in ranges {
        push_code(cursor, start, &mut segments);
        segments.push(embedded(Language::Html, start, end).with_meta("jsx", true));
        cursor = end;
    }
    push_code(cursor, text.len(), &mut segments);
    Some(segments)
}

fn parse(text: &str, lang: Language) -> Option<Tree> {
    let grammar = lang.tree_sitter_language().ok()?;
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&grammar) {
        log::debug!("jsx grammar unavailable for {}: {e}", lang.as_str());
        return None;
    }
    parser.parse(text, None)
}

/// Outermost JSX node ranges, collected with a cursor walk (no recursion)
fn collect_jsx_ranges(tree: &Tree) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut cursor = tree.walk();
    loop {
        let node = cursor.node();
        let is_jsx = JSX_KINDS.contains(&node.kind());
        if is_jsx {
            ranges.push((node.start_byte(), node.end_byte()));
        }
        if !is_jsx && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return ranges;
            }
        }
    }
}

/// Sort and merge overlapping or touching ranges
fn merge_ranges(mut ranges: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    ranges.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merges_touching_ranges() {
        assert_eq!(
            merge_ranges(vec![(10, 20), (0, 5), (5, 8), (15, 30), (40, 41)]),
            vec![(0, 8), (10, 30), (40, 41)]
        );
    }

    #[test]
    fn tsx_alternates_code_and_markup() {
        let text = "import React from 'react';\n\nexport const View = () => <div className=\"a\"><span>{1}</span></div>;\n\nexport function Other() {\n  return <></>;\n}\n";
        let segments = segment(text, ".tsx", Some("typescript"), None).unwrap();

        let markup: Vec<&str> = segments
            .iter()
            .filter(|s| s.segment_type == SegmentType::Embedded)
            .map(|s| &text[s.start..s.end])
            .collect();
        assert_eq!(
            markup,
            vec!["<div className=\"a\"><span>{1}</span></div>", "<></>"]
        );

        let code = segments.iter().find(|s| s.segment_type == SegmentType::Code).unwrap();
        assert_eq!(code.language_id.as_deref(), Some("typescript"));
        assert_eq!(code.ext.as_deref(), Some(".tsx"));

        for pair in segments.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn plain_code_has_no_jsx_segments() {
        assert!(segment("export const a = 1;\n", ".jsx", None, None).is_none());
        assert!(segment("x", ".ts", None, None).is_none());
    }
}
