use super::finalize::fill_gaps;
use super::markdown::detect_frontmatter;
use super::{embedded, markup};
use crate::language::{Language, language_ext};
use crate::types::Segment;

/// Split an Astro component into frontmatter, script/style blocks and html markup
pub(super) fn segment(text: &str) -> Option<Vec<Segment>> {
    if text.trim().is_empty() {
        return None;
    }
    let mut segments = Vec::new();
    let mut covered = Vec::new();

    // The component script fence may be preceded by blank lines.
    let leading = text.len() - text.trim_start().len();
    let mut body_start = 0;
    if let Some(fm) = detect_frontmatter(&text[leading..]).filter(|fm| fm.language == Language::Yaml)
    {
        let (start, end) = (leading + fm.content_start, leading + fm.content_end);
        segments.push(embedded(Language::TypeScript, start, end).with_meta("block", "frontmatter"));
        covered.push((0, leading + fm.end));
        body_start = leading + fm.end;
    }

    let tree = markup::scan(text, body_start);
    for index in tree.walk() {
        let node = &tree.nodes[index];
        let (block, default) = match node.name.as_str() {
            "script" => ("script", script_default(node)),
            "style" => ("style", Language::Css),
            _ => continue,
        };
        covered.push(node.outer());
        let Some((start, end)) = node.inner() else {
            continue;
        };
        let lang = node
            .attr("lang")
            .and_then(Language::from_alias)
            .unwrap_or(default);
        segments.push(embedded(lang, start, end).with_meta("block", block));
    }

    segments.extend(fill_gaps(text, &covered, |start, end| {
        embedded(Language::Html, start, end).with_meta("block", "markup")
    }));
    Some(segments)
}

fn script_default(node: &markup::MarkupNode) -> Language {
    match node.attr("type") {
        Some(t) if t.contains("typescript") || language_ext(t) == Some(".ts") => Language::TypeScript,
        Some("application/json" | "application/ld+json") => Language::Json,
        _ => Language::JavaScript,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frontmatter_scripts_and_markup() {
        let text = "---\nconst title = 'Hi';\n---\n<html>\n  <body>\n    <h1>{title}</h1>\n    <script>console.log(1)</script>\n  </body>\n  <style>h1 { color: red; }</style>\n</html>\n";
        let segments = segment(text).unwrap();

        let fm = segments.iter().find(|s| s.meta_str("block") == Some("frontmatter")).unwrap();
        assert_eq!(&text[fm.start..fm.end], "const title = 'Hi';\n");
        assert_eq!(fm.language_id.as_deref(), Some("typescript"));

        let script = segments.iter().find(|s| s.meta_str("block") == Some("script")).unwrap();
        assert_eq!(&text[script.start..script.end], "console.log(1)");

        let style = segments.iter().find(|s| s.meta_str("block") == Some("style")).unwrap();
        assert_eq!(style.language_id.as_deref(), Some("css"));

        let markup: Vec<_> = segments
            .iter()
            .filter(|s| s.meta_str("block") == Some("markup"))
            .collect();
        assert_eq!(markup.len(), 3);
        for m in markup {
            assert!(!text[m.start..m.end].contains("<script"));
            assert!(!text[m.start..m.end].contains("---"));
        }
    }

    #[test]
    fn json_ld_script() {
        let text = "<script type=\"application/ld+json\">{\"a\":1}</script>";
        let segments = segment(text).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].language_id.as_deref(), Some("json"));
    }
}
