use serde::{Deserialize, Serialize};

/// Renderable content category of a display item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Text,
    Math,
    Code,
    Diagram,
    Image,
}

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Student,
    Teacher,
}

/// Per-word timing supplied by the speech service, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// One piece of renderable notation attached to a math item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathFragment {
    pub latex: String,
    /// Block (display-mode) notation rather than inline
    #[serde(default)]
    pub block: bool,
}

/// One buffer-resident renderable unit.
///
/// Append-only: never mutated after `ContentBuffer::add_item` finalizes
/// it. `id` is unique for the lifetime of one buffer; `timestamp` is
/// assignment-ordered and non-decreasing across successive adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayItem {
    /// Buffer-assigned when empty on insert
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub item_type: ItemType,

    pub content: String,

    /// Milliseconds since the epoch, assignment-ordered. Buffer-assigned
    /// when zero on insert.
    #[serde(default)]
    pub timestamp: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Speaker>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_timings: Option<Vec<WordTiming>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub math_fragments: Option<Vec<MathFragment>>,
}

impl DisplayItem {
    /// A bare item; the buffer fills in `id` and `timestamp` on insert.
    pub fn new(item_type: ItemType, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            item_type,
            content: content.into(),
            timestamp: 0,
            speaker: None,
            confidence: None,
            word_timings: None,
            math_fragments: None,
        }
    }

    pub fn with_speaker(mut self, speaker: Speaker) -> Self {
        self.speaker = Some(speaker);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}
