use super::{embedded, markup};
use crate::language::Language;
use crate::types::Segment;

/// Split a Svelte component into instance/module scripts, styles and markup.
///
/// The markup section spans the whole document, so it overlaps the script
/// and style blocks.
pub(super) fn segment(text: &str) -> Option<Vec<Segment>> {
    if text.trim().is_empty() {
        return None;
    }
    let tree = markup::scan(text, 0);
    let mut segments = Vec::new();

    for node in tree.roots.iter().map(|&i| &tree.nodes[i]) {
        let (block, default) = match node.name.as_str() {
            "script" if node.attr("context") == Some("module") || node.has_attr("module") => {
                ("module", Language::JavaScript)
            }
            "script" => ("instance", Language::JavaScript),
            "style" => ("css", Language::Css),
            _ => continue,
        };
        let Some((start, end)) = node.inner() else {
            continue;
        };
        let lang = node
            .attr("lang")
            .and_then(Language::from_alias)
            .unwrap_or(default);
        segments.push(embedded(lang, start, end).with_meta("block", block));
    }

    segments.push(embedded(Language::Html, 0, text.len()).with_meta("block", "markup"));
    Some(segments)
}
