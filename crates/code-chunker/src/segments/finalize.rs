use crate::error::SegmentError;
use crate::types::Segment;
use sha2::{Digest, Sha256};

/// Stable identifier derived from the container path and the segment's shape
#[must_use]
pub fn segment_id(rel_path: &str, segment: &Segment) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rel_path.as_bytes());
    hasher.update([0]);
    hasher.update(segment.segment_type.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(segment.language_id.as_deref().unwrap_or("").as_bytes());
    hasher.update([0]);
    hasher.update(segment.start.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(segment.end.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(segment.parent_segment_id.as_deref().unwrap_or("").as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("seg_{}", &hash[..20])
}

/// Recompute every segment id in place
pub fn assign_segment_ids(segments: &mut [Segment], rel_path: &str) {
    for segment in segments.iter_mut() {
        segment.segment_id = segment_id(rel_path, segment);
    }
}

/// Drop empty ranges, sort by `(start, end)` and assign ids
#[must_use]
pub fn finalize_segments(segments: Vec<Segment>, rel_path: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = segments.into_iter().filter(|s| !s.is_empty()).collect();
    segments.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    assign_segment_ids(&mut segments, rel_path);
    segments
}

/// Structural check for caller-supplied segments
pub(crate) fn validate_extra_segments(extras: &[Segment], text: &str) -> Result<(), SegmentError> {
    for segment in extras.iter().filter(|s| !s.is_empty()) {
        if segment.end > text.len() {
            return Err(SegmentError::OutOfBounds {
                start: segment.start,
                end: segment.end,
                len: text.len(),
            });
        }
        for offset in [segment.start, segment.end] {
            if !text.is_char_boundary(offset) {
                return Err(SegmentError::NotCharBoundary { offset });
            }
        }
    }
    Ok(())
}

/// Emit a segment for every uncovered range of `[0, text.len())` holding non-whitespace.
///
/// `covered` may be unsorted and overlapping.
pub(crate) fn fill_gaps(
    text: &str,
    covered: &[(usize, usize)],
    mut make: impl FnMut(usize, usize) -> Segment,
) -> Vec<Segment> {
    let mut ranges = covered.to_vec();
    ranges.sort_unstable();

    let mut out = Vec::new();
    let mut cursor = 0;
    let mut emit = |start: usize, end: usize, out: &mut Vec<Segment>| {
        if end > start && has_content(text, start, end) {
            out.push(make(start, end));
        }
    };
    for (start, end) in ranges {
        let start = start.min(text.len());
        if start > cursor {
            emit(cursor, start, &mut out);
        }
        cursor = cursor.max(end.min(text.len()));
    }
    emit(cursor, text.len(), &mut out);
    out
}

pub(crate) fn has_content(text: &str, start: usize, end: usize) -> bool {
    text.get(start..end)
        .is_some_and(|slice| slice.chars().any(|c| !c.is_whitespace()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EmbeddingContext, SegmentType};
    use pretty_assertions::assert_eq;

    fn prose(start: usize, end: usize) -> Segment {
        Segment::new(SegmentType::Prose, Some("markdown"), start, end, EmbeddingContext::Prose)
    }

    #[test]
    fn finalize_drops_empty_and_sorts() {
        let segments = vec![prose(10, 20), prose(5, 5), prose(0, 10), prose(10, 15), prose(9, 3)];
        let out = finalize_segments(segments, "a.md");
        let ranges: Vec<_> = out.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 10), (10, 15), (10, 20)]);
        assert!(out.iter().all(|s| s.segment_id.starts_with("seg_")));
    }

    #[test]
    fn ids_depend_on_path_and_shape() {
        let a = segment_id("a.md", &prose(0, 10));
        assert_eq!(a, segment_id("a.md", &prose(0, 10)));
        assert_ne!(a, segment_id("b.md", &prose(0, 10)));
        assert_ne!(a, segment_id("a.md", &prose(0, 11)));
        assert_ne!(a, segment_id("a.md", &prose(0, 10).with_parent("seg_x")));
    }

    #[test]
    fn gaps_skip_whitespace_only_ranges() {
        let text = "abc   def\n\n  \nghi";
        let gaps = fill_gaps(text, &[(3, 6), (9, 14)], prose);
        let ranges: Vec<_> = gaps.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 3), (6, 9), (14, 17)]);
    }

    #[test]
    fn extras_out_of_bounds_are_rejected() {
        let err = validate_extra_segments(&[prose(0, 50)], "short").unwrap_err();
        assert_eq!(err, SegmentError::OutOfBounds { start: 0, end: 50, len: 5 });
        assert!(validate_extra_segments(&[prose(40, 20)], "short").is_ok());
        assert_eq!(
            validate_extra_segments(&[prose(0, 1)], "é").unwrap_err(),
            SegmentError::NotCharBoundary { offset: 1 }
        );
    }
}
