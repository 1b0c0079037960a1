use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a tutoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Ended,
}

/// One live tutoring session. At most one per orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub student_id: String,
    pub topic: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(student_id: &str, topic: &str) -> Self {
        Self {
            id: format!("session-{}", uuid::Uuid::new_v4()),
            student_id: student_id.to_string(),
            topic: topic.to_string(),
            status: SessionStatus::Active,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}
