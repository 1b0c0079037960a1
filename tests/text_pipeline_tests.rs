// Integration tests for the text pipeline: normalization composed with
// segmentation, the way the orchestrator drives them.

use tutor_live::text::{
    align_segments, detect_math_segments, detect_speaker_changes, normalize, segment_text,
    SegmentType,
};
use tutor_live::Speaker;

#[test]
fn test_three_sentences_segment_cleanly() {
    let segments = segment_text("First sentence. Second sentence! Third sentence?");

    assert_eq!(segments.len(), 3);
    for segment in &segments {
        assert_eq!(segment.segment_type, SegmentType::Text);
        assert!(segment.confidence > 0.0 && segment.confidence <= 1.0);
    }
}

#[test]
fn test_inline_math_extraction() {
    let segments = segment_text("Inline $x=5$ and more text.");

    let math: Vec<_> = segments
        .iter()
        .filter(|s| s.segment_type == SegmentType::Math)
        .collect();
    assert_eq!(math.len(), 1);
    assert_eq!(math[0].latex.as_deref(), Some("x=5"));
}

#[test]
fn test_spoken_math_normalizes_to_symbols() {
    let normalized = normalize("X plus Y equals Z");
    assert!(normalized.contains('+'));
    assert!(normalized.contains('='));
}

#[test]
fn test_normalized_utterance_segments_with_math_intact() {
    // The orchestrator's pipeline order: normalize first, then segment.
    let raw = "the  sum is  $a + b$. now  compute two plus two.";
    let normalized = normalize(raw);
    let segments = segment_text(&normalized);

    let math: Vec<_> = segments
        .iter()
        .filter(|s| s.segment_type == SegmentType::Math)
        .collect();
    assert_eq!(math.len(), 1);
    assert_eq!(math[0].latex.as_deref(), Some("a + b"));

    let prose: String = segments
        .iter()
        .filter(|s| s.segment_type == SegmentType::Text)
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    assert!(prose.contains("2 + 2"), "got: {}", prose);
}

#[test]
fn test_noise_tags_never_reach_segments() {
    let normalized = normalize("so [inaudible] the answer [crosstalk] is twelve");
    assert!(!normalized.contains('['));

    let segments = segment_text(&normalized);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, "so the answer is 12");
}

#[test]
fn test_block_and_inline_math_in_appearance_order() {
    let found = detect_math_segments("start $$e=mc^2$$ middle $f=ma$ end");

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].latex.as_deref(), Some("e=mc^2"));
    assert_eq!(found[1].latex.as_deref(), Some("f=ma"));
    assert!(found[0].end_index <= found[1].start_index);
}

#[test]
fn test_speaker_markers_found_in_order() {
    let changes = detect_speaker_changes("Student: why? Teacher: because the slope changes.");

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].speaker, Speaker::Student);
    assert_eq!(changes[1].speaker, Speaker::Teacher);
}

#[test]
fn test_alignment_spans_sum_to_duration() {
    let segments = segment_text("One. Two longer here. Three even longer than before.");
    let aligned = align_segments(&segments, 9_000);

    assert_eq!(aligned.first().map(|s| s.start_index), Some(0));
    assert_eq!(aligned.last().map(|s| s.end_index), Some(9_000));

    for window in aligned.windows(2) {
        assert_eq!(
            window[0].end_index, window[1].start_index,
            "aligned spans must be contiguous"
        );
    }
}
