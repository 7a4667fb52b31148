//! Byte offset to line number mapping

/// Build the list of line-start byte offsets for `text`.
///
/// The first entry is always `0`, so the index is never empty and its
/// length is the file's line count (a trailing newline opens a final
/// empty line).
#[must_use]
pub fn build_line_index(text: &str) -> Vec<usize> {
    let mut index = Vec::with_capacity(text.len() / 32 + 1);
    index.push(0);
    index.extend(
        text.bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i + 1),
    );
    index
}

/// Convert a byte offset into a 1-based line number
#[must_use]
pub fn offset_to_line(index: &[usize], offset: usize) -> usize {
    match index.binary_search(&offset) {
        Ok(i) => i + 1,
        Err(i) => i.max(1),
    }
}

/// Number of lines described by a line index
#[must_use]
pub fn line_count(index: &[usize]) -> usize {
    index.len().max(1)
}
