use super::{embedded, markup};
use crate::language::Language;
use crate::types::Segment;

/// Split a Vue single-file component into its top-level blocks
pub(super) fn segment(text: &str) -> Option<Vec<Segment>> {
    let tree = markup::scan(text, 0);
    let mut segments = Vec::new();

    for node in tree.roots.iter().map(|&i| &tree.nodes[i]) {
        let (block, default) = match node.name.as_str() {
            "template" => ("template", Language::Html),
            "script" if node.has_attr("setup") => ("scriptSetup", Language::JavaScript),
            "script" => ("script", Language::JavaScript),
            "style" => ("style", Language::Css),
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

    (!segments.is_empty()).then_some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SFC: &str = r#"<template>
  <div :class="{ on: a > b }">{{ msg }}</div>
</template>

<script setup lang="ts">
const msg = ref('<hi>')
</script>

<script>
export default { name: 'X' }
</script>

<style scoped lang="scss">
.a { color: red; }
</style>
"#;

    #[test]
    fn blocks_map_to_embedded_segments() {
        let segments = segment(SFC).unwrap();
        let summary: Vec<_> = segments
            .iter()
            .map(|s| (s.meta_str("block").unwrap(), s.language_id.as_deref().unwrap()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("template", "html"),
                ("scriptSetup", "typescript"),
                ("script", "javascript"),
                ("style", "scss"),
            ]
        );
        let setup = &segments[1];
        assert_eq!(&SFC[setup.start..setup.end], "\nconst msg = ref('<hi>')\n");
        assert_eq!(setup.ext.as_deref(), Some(".ts"));
    }

    #[test]
    fn plain_markup_is_not_a_component() {
        assert!(segment("just some text").is_none());
        assert!(segment("<div>no blocks</div>").is_none());
    }
}
