use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::buffer::Speaker;

/// Classification of one sub-span of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Text,
    Math,
    Code,
}

/// A classified sub-span of one utterance.
///
/// `start_index`/`end_index` are byte offsets into the original string.
/// After `align_segments` the same fields carry the segment's time span in
/// milliseconds instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub segment_type: SegmentType,
    /// Raw notation payload for math segments
    pub latex: Option<String>,
    pub start_index: usize,
    pub end_index: usize,
    pub confidence: f32,
}

/// An explicit speaker-label marker found in transcript text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakerChange {
    /// Byte offset of the marker
    pub index: usize,
    pub speaker: Speaker,
}

/// A delimited math span inside raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MathSpan {
    pub start: usize,
    pub end: usize,
    pub inner_start: usize,
    pub inner_end: usize,
    pub block: bool,
}

static ARTIFACT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\[(](?:inaudible|crosstalk|background noise|noise|silence|music|laughter)[\])]")
        .unwrap()
});

static SPEAKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(teacher|tutor|student)\s*:").unwrap());

/// Scan for `$...$` and `$$...$$` spans, left to right. Unmatched
/// delimiters are treated as plain text.
pub(crate) fn math_spans(text: &str) -> Vec<MathSpan> {
    let mut spans = Vec::new();
    let mut search = 0;

    while let Some(rel) = text[search..].find('$') {
        let start = search + rel;
        let (delim, dlen) = if text[start..].starts_with("$$") {
            ("$$", 2)
        } else {
            ("$", 1)
        };
        let inner_start = start + dlen;

        match text[inner_start..].find(delim) {
            Some(rel_close) => {
                let inner_end = inner_start + rel_close;
                spans.push(MathSpan {
                    start,
                    end: inner_end + dlen,
                    inner_start,
                    inner_end,
                    block: dlen == 2,
                });
                search = inner_end + dlen;
            }
            None => search = inner_start,
        }
    }

    spans
}

/// Scan for ```` ``` ```` fenced code spans. An unclosed fence is ignored.
fn code_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut search = 0;

    while let Some(rel) = text[search..].find("```") {
        let start = search + rel;
        match text[start + 3..].find("```") {
            Some(rel_close) => {
                let end = start + 3 + rel_close + 3;
                spans.push((start, end));
                search = end;
            }
            None => break,
        }
    }

    spans
}

/// Split an utterance into typed segments.
///
/// Sentences split on `.`/`!`/`?` followed by whitespace; delimited math
/// and fenced code spans are emitted as indivisible `Math`/`Code` segments
/// and never broken across a sentence boundary.
pub fn segment_text(text: &str) -> Vec<Segment> {
    let code = code_spans(text);
    let math: Vec<MathSpan> = math_spans(text)
        .into_iter()
        .filter(|m| !code.iter().any(|&(cs, ce)| m.start >= cs && m.start < ce))
        .collect();

    // Merge the two protected span kinds in appearance order.
    #[derive(Clone, Copy)]
    enum Protected {
        Math(MathSpan),
        Code(usize, usize),
    }

    let mut protected: Vec<Protected> = math.iter().map(|&m| Protected::Math(m)).collect();
    protected.extend(code.iter().map(|&(s, e)| Protected::Code(s, e)));
    protected.sort_by_key(|p| match p {
        Protected::Math(m) => m.start,
        Protected::Code(s, _) => *s,
    });

    let mut segments = Vec::new();
    let mut cursor = 0;

    for span in &protected {
        match *span {
            Protected::Math(m) => {
                push_sentences(text, cursor, m.start, &mut segments);
                segments.push(Segment {
                    text: text[m.start..m.end].to_string(),
                    segment_type: SegmentType::Math,
                    latex: Some(text[m.inner_start..m.inner_end].trim().to_string()),
                    start_index: m.start,
                    end_index: m.end,
                    confidence: 0.95,
                });
                cursor = m.end;
            }
            Protected::Code(s, e) => {
                push_sentences(text, cursor, s, &mut segments);
                segments.push(Segment {
                    text: text[s..e].to_string(),
                    segment_type: SegmentType::Code,
                    latex: None,
                    start_index: s,
                    end_index: e,
                    confidence: 0.9,
                });
                cursor = e;
            }
        }
    }

    push_sentences(text, cursor, text.len(), &mut segments);
    segments
}

/// Extract only the delimited math spans, with their raw notation payload,
/// in order of appearance.
pub fn detect_math_segments(text: &str) -> Vec<Segment> {
    math_spans(text)
        .into_iter()
        .map(|m| Segment {
            text: text[m.start..m.end].to_string(),
            segment_type: SegmentType::Math,
            latex: Some(text[m.inner_start..m.inner_end].trim().to_string()),
            start_index: m.start,
            end_index: m.end,
            confidence: 0.95,
        })
        .collect()
}

/// Find explicit speaker-label markers ("Teacher:", "Student:") in
/// appearance order.
pub fn detect_speaker_changes(text: &str) -> Vec<SpeakerChange> {
    SPEAKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?.as_str().to_ascii_lowercase();
            let speaker = match label.as_str() {
                "student" => Speaker::Student,
                _ => Speaker::Teacher,
            };
            Some(SpeakerChange {
                index: whole.start(),
                speaker,
            })
        })
        .collect()
}

/// Distribute `total_duration_ms` across segments proportionally to their
/// character length. Rounding drift goes to the last segment, whose end is
/// pinned to `total_duration_ms` exactly.
pub fn align_segments(segments: &[Segment], total_duration_ms: u64) -> Vec<Segment> {
    if segments.is_empty() {
        return Vec::new();
    }

    let total_chars: usize = segments.iter().map(|s| s.text.chars().count()).sum();
    let mut aligned = Vec::with_capacity(segments.len());
    let mut cursor_ms = 0u64;

    for (i, segment) in segments.iter().enumerate() {
        let end_ms = if i == segments.len() - 1 {
            total_duration_ms
        } else if total_chars == 0 {
            cursor_ms
        } else {
            let share = segment.text.chars().count() as f64 / total_chars as f64;
            let end = cursor_ms as f64 + share * total_duration_ms as f64;
            (end.round() as u64).min(total_duration_ms)
        };

        let mut out = segment.clone();
        out.start_index = cursor_ms as usize;
        out.end_index = end_ms as usize;
        aligned.push(out);
        cursor_ms = end_ms;
    }

    aligned
}

fn push_sentences(text: &str, from: usize, to: usize, out: &mut Vec<Segment>) {
    let slice = &text[from..to];
    let mut seg_start: Option<usize> = None;
    let mut after_terminator = false;

    for (i, ch) in slice.char_indices() {
        let abs = from + i;
        let is_terminator = matches!(ch, '.' | '!' | '?');

        if is_terminator {
            if seg_start.is_some() {
                after_terminator = true;
            }
        } else if after_terminator && ch.is_whitespace() {
            if let Some(start) = seg_start.take() {
                emit_text_segment(text, start, abs, out);
            }
            after_terminator = false;
        } else {
            // "3.14" stays one sentence: a terminator only splits before
            // whitespace.
            after_terminator = false;
            if !ch.is_whitespace() && seg_start.is_none() {
                seg_start = Some(abs);
            }
        }
    }

    if let Some(start) = seg_start {
        emit_text_segment(text, start, to, out);
    }
}

fn emit_text_segment(text: &str, start: usize, end: usize, out: &mut Vec<Segment>) {
    let trimmed = text[start..end].trim_end();
    if trimmed.is_empty() {
        return;
    }

    let confidence = if ARTIFACT_RE.is_match(trimmed) {
        0.6
    } else {
        0.92
    };

    out.push(Segment {
        text: trimmed.to_string(),
        segment_type: SegmentType::Text,
        latex: None,
        start_index: start,
        end_index: start + trimmed.len(),
        confidence,
    });
}
