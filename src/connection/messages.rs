use serde::{Deserialize, Serialize};

use crate::buffer::{Speaker, WordTiming};
use crate::error::LiveError;
use crate::text::SegmentType;

/// One classified chunk inside a `transcription` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSegment {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,

    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,

    /// First-segment `true` means "append to the in-flight utterance"
    #[serde(default)]
    pub streaming: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_timings: Option<Vec<WordTiming>>,
}

/// Frames received from the realtime tutor service.
///
/// Unrecognized tags decode to `Unknown` so a newer service never crashes
/// the receive loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Progressive transcript chunk
    Transcription {
        speaker: Speaker,
        timestamp: i64,
        segments: Vec<FrameSegment>,
        /// Marks the last chunk of the utterance
        #[serde(default, rename = "final")]
        is_final: bool,
    },

    /// Complete, non-streaming utterance
    Text {
        speaker: Speaker,
        timestamp: i64,
        text: String,
    },

    /// End of the in-flight utterance
    UtteranceEnd { timestamp: i64 },

    /// Heartbeat reply
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },

    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub fn decode(payload: &str) -> Result<Self, LiveError> {
        serde_json::from_str(payload).map_err(|e| LiveError::MalformedMessage(e.to_string()))
    }
}

/// Frames sent to the realtime tutor service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Liveness probe
    Ping { timestamp: i64 },

    SessionStart {
        session_id: String,
        student_id: String,
        topic: String,
    },

    SessionEnd { session_id: String },

    /// Opaque control command, passed through uninterpreted
    Command { payload: serde_json::Value },
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, LiveError> {
        serde_json::to_string(self).map_err(|e| LiveError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_transcription_frame() {
        let json = r#"{
            "type": "transcription",
            "speaker": "teacher",
            "timestamp": 1700000000000,
            "segments": [
                {"type": "text", "content": "The answer is", "streaming": true},
                {"type": "math", "content": "$x=4$", "latex": "x=4"}
            ]
        }"#;

        let frame = InboundFrame::decode(json).unwrap();
        match frame {
            InboundFrame::Transcription {
                speaker,
                segments,
                is_final,
                ..
            } => {
                assert_eq!(speaker, Speaker::Teacher);
                assert_eq!(segments.len(), 2);
                assert!(segments[0].streaming);
                assert!(!segments[1].streaming);
                assert_eq!(segments[1].latex.as_deref(), Some("x=4"));
                assert!(!is_final);
            }
            other => panic!("expected transcription, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_simple_text_frame() {
        let json = r#"{"type": "text", "speaker": "student", "timestamp": 5, "text": "hello"}"#;

        match InboundFrame::decode(json).unwrap() {
            InboundFrame::Text { speaker, text, .. } => {
                assert_eq!(speaker, Speaker::Student);
                assert_eq!(text, "hello");
            }
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_fails_soft() {
        let json = r#"{"type": "speaker_diarization_update", "payload": {}}"#;
        assert!(matches!(
            InboundFrame::decode(json).unwrap(),
            InboundFrame::Unknown
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            InboundFrame::decode("not json at all"),
            Err(LiveError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_outbound_ping_roundtrip() {
        let json = OutboundFrame::Ping { timestamp: 42 }.encode().unwrap();
        assert!(json.contains("\"type\":\"ping\""));

        let back: OutboundFrame = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, OutboundFrame::Ping { timestamp: 42 }));
    }

    #[test]
    fn test_outbound_command_is_opaque() {
        let frame = OutboundFrame::Command {
            payload: serde_json::json!({"action": "mute_audio", "value": true}),
        };

        let json = frame.encode().unwrap();
        assert!(json.contains("mute_audio"));
    }
}
