//! Tolerant tag scanner shared by the single-file-component formats.
//!
//! Produces an arena of elements with byte-exact tag offsets. Contents of
//! raw-text elements (`script`, `style`, `textarea`) are never scanned for
//! tags, comments are skipped, and unbalanced closing tags are ignored.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: [&str; 3] = ["script", "style", "textarea"];

#[derive(Debug, Clone)]
pub(crate) struct MarkupNode {
    pub name: String,
    pub attrs: Vec<(String, Option<String>)>,
    /// Offset of `<` of the opening tag
    pub open_start: usize,
    /// Offset just past `>` of the opening tag
    pub open_end: usize,
    /// Offset of `<` of the closing tag, if the element was closed
    pub close_start: Option<usize>,
    /// Offset just past `>` of the closing tag
    pub close_end: Option<usize>,
    pub children: Vec<usize>,
}

impl MarkupNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Inner content range; `None` for unclosed or void elements
    pub fn inner(&self) -> Option<(usize, usize)> {
        self.close_start.map(|close| (self.open_end, close))
    }

    /// Whole element range, opening tag through closing tag
    pub fn outer(&self) -> (usize, usize) {
        (self.open_start, self.close_end.unwrap_or(self.open_end))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MarkupTree {
    pub nodes: Vec<MarkupNode>,
    pub roots: Vec<usize>,
}

impl MarkupTree {
    /// Every element in document order, walked with an explicit worklist.
    ///
    /// The visited set keeps the walk finite even if child links were ever
    /// to form a cycle.
    pub fn walk(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            if index >= self.nodes.len() || !seen.insert(index) {
                continue;
            }
            order.push(index);
            stack.extend(self.nodes[index].children.iter().rev().copied());
        }
        order
    }
}

fn attr_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s"'=<>/]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#).ok()
    })
    .as_ref()
}

/// Scan `text[from..]` into an element tree
pub(crate) fn scan(text: &str, from: usize) -> MarkupTree {
    let bytes = text.as_bytes();
    let mut tree = MarkupTree::default();
    let mut stack: Vec<usize> = Vec::new();
    let mut pos = from;

    while let Some(rel) = text.get(pos..).and_then(|rest| rest.find('<')) {
        let lt = pos + rel;
        let rest = &text[lt..];

        if rest.starts_with("<!--") {
            pos = rest[4..].find("-->").map_or(text.len(), |i| lt + 4 + i + 3);
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            pos = rest.find('>').map_or(text.len(), |i| lt + i + 1);
            continue;
        }

        let closing = rest.starts_with("</");
        let name_start = lt + if closing { 2 } else { 1 };
        let name_len = bytes[name_start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b':' | b'.' | b'_'))
            .count();
        if name_len == 0 || !bytes[name_start].is_ascii_alphabetic() {
            pos = lt + 1;
            continue;
        }
        let name = text[name_start..name_start + name_len].to_ascii_lowercase();
        let Some(tag_end) = find_tag_end(bytes, name_start + name_len) else {
            break;
        };

        if closing {
            // Elements left open inside the matched one stay unclosed.
            if let Some(depth) = stack.iter().rposition(|&i| tree.nodes[i].name == name) {
                let index = stack[depth];
                tree.nodes[index].close_start = Some(lt);
                tree.nodes[index].close_end = Some(tag_end);
                stack.truncate(depth);
            }
            pos = tag_end;
            continue;
        }

        let attr_text = &text[name_start + name_len..tag_end - 1];
        let self_closing = attr_text.trim_end().ends_with('/');
        let attrs = parse_attrs(attr_text.trim_end_matches('/'));
        let index = tree.nodes.len();
        let parent = stack.last().copied();
        tree.nodes.push(MarkupNode {
            name: name.clone(),
            attrs,
            open_start: lt,
            open_end: tag_end,
            close_start: None,
            close_end: None,
            children: Vec::new(),
        });
        match parent {
            Some(p) => tree.nodes[p].children.push(index),
            None => tree.roots.push(index),
        }

        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            pos = tag_end;
            continue;
        }

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            match find_raw_close(text, tag_end, &name) {
                Some((close_start, close_end)) => {
                    tree.nodes[index].close_start = Some(close_start);
                    tree.nodes[index].close_end = Some(close_end);
                    pos = close_end;
                }
                None => pos = text.len(),
            }
            continue;
        }

        stack.push(index);
        pos = tag_end;
    }

    tree
}

/// Offset just past the `>` ending a tag, honouring quoted values and
/// `{...}` expression attributes
fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut braces = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => braces += 1,
                b'}' => braces = braces.saturating_sub(1),
                b'>' if braces == 0 => return Some(i + 1),
                _ => {}
            },
        }
    }
    None
}

fn find_raw_close(text: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let lower = text.get(from..)?.to_ascii_lowercase();
    let mut search = 0;
    while let Some(rel) = lower[search..].find(&needle) {
        let start = from + search + rel;
        let after = start + needle.len();
        let next = text.as_bytes().get(after).copied();
        if matches!(next, Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
            let end = find_tag_end(text.as_bytes(), after)?;
            return Some((start, end));
        }
        search += rel + needle.len();
    }
    None
}

fn parse_attrs(attr_text: &str) -> Vec<(String, Option<String>)> {
    let Some(re) = attr_regex() else {
        return Vec::new();
    };
    re.captures_iter(attr_text)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string());
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nested_elements_and_offsets() {
        let text = "<template><div v-if=\"a > b\"><br><span/></div></template>";
        let tree = scan(text, 0);
        assert_eq!(tree.roots.len(), 1);
        let template = &tree.nodes[tree.roots[0]];
        assert_eq!(template.name, "template");
        let (inner_start, inner_end) = template.inner().unwrap();
        assert_eq!(&text[inner_start..inner_end], "<div v-if=\"a > b\"><br><span/></div>");
        let div = &tree.nodes[template.children[0]];
        assert_eq!(div.attr("v-if"), Some("a > b"));
        assert_eq!(div.children.len(), 2);
    }

    #[test]
    fn raw_text_is_not_scanned() {
        let text = "<script lang=\"ts\">const x = '<div>';\nif (a < b) {}</script>\n<style scoped>a{}</style>";
        let tree = scan(text, 0);
        let names: Vec<_> = tree.roots.iter().map(|&i| tree.nodes[i].name.as_str()).collect();
        assert_eq!(names, vec!["script", "style"]);
        let script = &tree.nodes[tree.roots[0]];
        assert_eq!(script.attr("lang"), Some("ts"));
        let (s, e) = script.inner().unwrap();
        assert_eq!(&text[s..e], "const x = '<div>';\nif (a < b) {}");
        assert!(tree.nodes[tree.roots[1]].has_attr("scoped"));
    }

    #[test]
    fn comments_and_stray_closers_are_ignored() {
        let text = "<!-- <script> --></p><div>x</div>";
        let tree = scan(text, 0);
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].name, "div");
        assert_eq!(tree.nodes[0].outer(), (text.find("<div").unwrap(), text.len()));
    }

    #[test]
    fn walk_visits_in_document_order() {
        let tree = scan("<a><b></b><c><d></d></c></a><e></e>", 0);
        let names: Vec<_> = tree.walk().into_iter().map(|i| tree.nodes[i].name.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn walk_terminates_on_cyclic_links() {
        let mut tree = scan("<a><b></b></a>", 0);
        tree.nodes[1].children.push(0);
        assert_eq!(tree.walk(), vec![0, 1]);
    }
}
