use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::SessionStatus;

/// Statistics about a tutoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,

    pub student_id: String,

    pub topic: String,

    pub status: SessionStatus,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Set once the session has ended
    pub ended_at: Option<DateTime<Utc>>,

    /// Total duration in seconds (so far, for a live session)
    pub duration_secs: f64,

    /// Display items currently buffered
    pub item_count: usize,

    /// Buffered items attributed to the student
    pub student_items: usize,

    /// Buffered items attributed to the teacher
    pub teacher_items: usize,
}
