//! Transcript text pipeline
//!
//! Stateless cleanup and segmentation for raw speech-to-text output:
//! - `normalizer`: whitespace collapse, spoken-math rewriting, noise-tag
//!   stripping, number-word conversion
//! - `segmenter`: sentence/math/code segmentation, speaker markers,
//!   proportional time alignment
//!
//! Normalization always runs before segmentation; no normalizer stage
//! touches text inside math delimiters.

mod normalizer;
mod segmenter;

pub use normalizer::{
    collapse_whitespace, digits_from_words, normalize, rewrite_spoken_math, strip_noise_tokens,
};
pub use segmenter::{
    align_segments, detect_math_segments, detect_speaker_changes, segment_text, Segment,
    SegmentType, SpeakerChange,
};
