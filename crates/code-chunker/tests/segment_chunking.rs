use context_code_chunker::{
    build_line_index, chunk_segments, discover_segments, AssemblyRequest, AstChunker, Chunk,
    DiscoverRequest, FileMode, SegmentType, SegmentsConfig, TreeSitterPass,
};
use pretty_assertions::assert_eq;
use tree_sitter::Parser;

fn chunk_file(text: &str, ext: &str, rel_path: &str, mode: FileMode) -> Vec<Chunk> {
    let config = SegmentsConfig::default();
    let segments =
        discover_segments(&DiscoverRequest::new(text, ext, rel_path, &config).mode(mode)).unwrap();
    let line_index = build_line_index(text);
    let pass = TreeSitterPass::enabled();
    let request = AssemblyRequest {
        text,
        ext,
        rel_path,
        mode,
        segments: &segments,
        line_index: &line_index,
        tree_sitter: &pass,
    };
    chunk_segments(&request, &AstChunker::default(), &mut Parser::new()).unwrap()
}

fn assert_sorted_and_bounded(chunks: &[Chunk], len: usize) {
    for chunk in chunks {
        assert!(chunk.start <= chunk.end && chunk.end <= len, "{chunk:?} out of bounds");
    }
    for pair in chunks.windows(2) {
        let ordered = pair[0].start < pair[1].start
            || (pair[0].start == pair[1].start && pair[0].end <= pair[1].end);
        assert!(ordered, "{:?} before {:?}", pair[0], pair[1]);
    }
}

#[test]
fn markdown_tsx_fence_keeps_its_language() {
    let text = "# Guide\n\n```tsx\nconst View = () => <div />;\n```\n";
    let chunks = chunk_file(text, ".md", "docs/guide.md", FileMode::Code);

    let tsx: Vec<_> = chunks
        .iter()
        .filter(|c| c.language_id() == Some("tsx"))
        .collect();
    assert!(!tsx.is_empty());
    assert_eq!(tsx[0].name.as_deref(), Some("View"));
    assert_eq!(
        tsx[0].segment.as_ref().map(|s| s.segment_type),
        Some(SegmentType::Embedded)
    );
}

#[test]
fn fenced_chunk_offsets_are_absolute() {
    let text = "Intro paragraph.\n\n```rust\nfn one() {}\n\nfn two() {}\n```\n\nOutro.\n";
    let chunks = chunk_file(text, ".md", "a.md", FileMode::Code);
    let body_start = text.find("fn one").unwrap();

    let two = chunks.iter().find(|c| c.name.as_deref() == Some("two")).unwrap();
    let local_offset = "fn one() {}\n\n".len();
    assert_eq!(two.start, body_start + local_offset);
    assert_eq!(&text[two.start..two.end], "fn two() {}");
    assert_eq!(two.meta.start_line, Some(6));
    assert_eq!(two.segment.as_ref().unwrap().start, body_start);
}

#[test]
fn prose_mode_indexes_prose_and_embedded_blocks() {
    let text = "Some words here.\n\n```python\ndef f():\n    return 1\n```\n";
    let chunks = chunk_file(text, ".md", "a.md", FileMode::Prose);
    let types: Vec<_> = chunks
        .iter()
        .map(|c| c.segment.as_ref().unwrap().segment_type)
        .collect();
    assert_eq!(types, vec![SegmentType::Prose, SegmentType::Embedded]);
}

#[test]
fn vue_component_chunks_are_sorted_and_bounded() {
    let text = r#"<template>
  <button @click="inc">{{ count }}</button>
</template>

<script setup lang="ts">
const count = ref(0)
function inc() { count.value++ }
</script>

<style>
button { color: red; }
</style>
"#;
    let chunks = chunk_file(text, ".vue", "Counter.vue", FileMode::Code);
    assert_sorted_and_bounded(&chunks, text.len());

    let langs: Vec<_> = chunks.iter().filter_map(Chunk::language_id).collect();
    assert!(langs.contains(&"html"));
    assert!(langs.contains(&"typescript"));
    assert!(langs.contains(&"css"));
    let inc = chunks.iter().find(|c| c.name.as_deref() == Some("inc")).unwrap();
    assert!(text[inc.start..inc.end].starts_with("function inc"));
}

#[test]
fn tsx_file_chunks_are_sorted_and_bounded() {
    let text = "import { useState } from 'react';\n\nexport function Counter() {\n  const [n, setN] = useState(0);\n  return <button onClick={() => setN(n + 1)}>{n}</button>;\n}\n\nexport const Label = () => <span>label</span>;\n";
    let chunks = chunk_file(text, ".tsx", "Counter.tsx", FileMode::Code);
    assert!(!chunks.is_empty());
    assert_sorted_and_bounded(&chunks, text.len());
    assert!(chunks.iter().any(|c| c.language_id() == Some("html")));
}

#[test]
fn repeated_runs_are_identical() {
    let text = "---\ntitle: x\n---\n# Doc\n\n```js\nexport function a() {}\n```\n";
    let first = chunk_file(text, ".md", "doc.md", FileMode::Code);
    let second = chunk_file(text, ".md", "doc.md", FileMode::Code);
    assert_eq!(first, second);
    assert!(first.iter().any(|c| c.language_id() == Some("yaml")));
}
