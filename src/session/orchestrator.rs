use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::record::{Session, SessionStatus};
use super::stats::SessionSummary;
use crate::buffer::{ContentBuffer, DisplayItem, ItemType, MathFragment, Speaker, WordTiming};
use crate::connection::{
    ConnectionEvent, ConnectionManager, ConnectionSnapshot, ConnectionState, EventSubscription,
    FrameSegment, HealthMetrics, InboundFrame, OutboundFrame,
};
use crate::error::LiveError;
use crate::text::{detect_speaker_changes, normalize, segment_text, SegmentType};

/// Top-level coordinator for one tutoring session.
///
/// Owns the content buffer and a handle to the process-wide connection
/// manager, and drives inbound transcript frames through the
/// normalize → segment → buffer pipeline. The dispatch path runs
/// synchronously inside the receive-loop callback and performs no I/O.
pub struct SessionOrchestrator {
    manager: Arc<ConnectionManager>,
    buffer: Arc<ContentBuffer>,
    service_url: String,
    session: Arc<Mutex<Option<Session>>>,
    pending: Arc<Mutex<Option<PendingUtterance>>>,
    listener: Mutex<Option<EventSubscription>>,
}

impl SessionOrchestrator {
    pub fn new(
        manager: Arc<ConnectionManager>,
        buffer: Arc<ContentBuffer>,
        service_url: String,
    ) -> Self {
        let session: Arc<Mutex<Option<Session>>> = Arc::new(Mutex::new(None));
        let pending: Arc<Mutex<Option<PendingUtterance>>> = Arc::new(Mutex::new(None));

        let dispatch_session = Arc::clone(&session);
        let dispatch_pending = Arc::clone(&pending);
        let dispatch_buffer = Arc::clone(&buffer);

        let listener = manager.on_event(move |event| match event {
            ConnectionEvent::Message(frame) => {
                dispatch_frame(&dispatch_session, &dispatch_pending, &dispatch_buffer, frame);
            }
            ConnectionEvent::Error(reason) => {
                // Fatal connection failure: salvage the in-flight
                // utterance, then end the live session.
                let leftover = dispatch_pending.lock().unwrap().take();
                if let Some(done) = leftover {
                    done.flush(&dispatch_buffer);
                }

                let mut guard = dispatch_session.lock().unwrap();
                if let Some(session) = guard.as_mut() {
                    if session.status != SessionStatus::Ended {
                        warn!(
                            "ending session {} on fatal connection failure: {}",
                            session.id, reason
                        );
                        session.status = SessionStatus::Ended;
                        session.end_time = Some(Utc::now());
                    }
                }
            }
            ConnectionEvent::Connected | ConnectionEvent::Disconnected => {}
        });

        Self {
            manager,
            buffer,
            service_url,
            session,
            pending,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Start a new session. Fails while another session is live; connects
    /// the manager if it is not connected yet.
    pub async fn start_session(
        &self,
        student_id: &str,
        topic: &str,
    ) -> Result<String, LiveError> {
        {
            let guard = self.session.lock().unwrap();
            if let Some(session) = guard.as_ref() {
                if session.status != SessionStatus::Ended {
                    return Err(LiveError::SessionActive(session.id.clone()));
                }
            }
        }

        if self.manager.state() != ConnectionState::Connected {
            self.manager.connect(&self.service_url).await?;
        }

        let session = Session::new(student_id, topic);
        let session_id = session.id.clone();
        let announce = OutboundFrame::SessionStart {
            session_id: session_id.clone(),
            student_id: student_id.to_string(),
            topic: topic.to_string(),
        };
        // No partial utterance from an earlier session may leak in.
        *self.pending.lock().unwrap() = None;
        *self.session.lock().unwrap() = Some(session);

        // Best effort: the remote learns about the session when (re)connected.
        match announce.encode() {
            Ok(json) => {
                if let Err(e) = self.manager.send(json) {
                    warn!("could not announce session start: {}", e);
                }
            }
            Err(e) => warn!("could not encode session start: {}", e),
        }

        info!("session {} started for student {}", session_id, student_id);
        Ok(session_id)
    }

    /// Stop forwarding inbound events without touching the connection.
    /// Returns false when there is no active session.
    pub fn pause_session(&self) -> bool {
        let mut guard = self.session.lock().unwrap();
        match guard.as_mut() {
            Some(session) if session.status == SessionStatus::Active => {
                session.status = SessionStatus::Paused;
                info!("session {} paused", session.id);
                true
            }
            _ => false,
        }
    }

    /// Resume a paused session. Returns false when nothing is paused.
    pub fn resume_session(&self) -> bool {
        let mut guard = self.session.lock().unwrap();
        match guard.as_mut() {
            Some(session) if session.status == SessionStatus::Paused => {
                session.status = SessionStatus::Active;
                info!("session {} resumed", session.id);
                true
            }
            _ => false,
        }
    }

    /// End the live session. A mismatched id is a silent no-op (`None`).
    /// The connection stays open for reuse.
    pub fn end_session(&self, session_id: &str) -> Option<SessionSummary> {
        let is_live = {
            let guard = self.session.lock().unwrap();
            guard
                .as_ref()
                .map(|s| s.id == session_id && s.status != SessionStatus::Ended)
                .unwrap_or(false)
        };
        if !is_live {
            return None;
        }

        // Seal the in-flight utterance before closing the record.
        let leftover = self.pending.lock().unwrap().take();
        if let Some(done) = leftover {
            done.flush(&self.buffer);
        }

        let mut guard = self.session.lock().unwrap();
        let session = guard.as_mut()?;
        if session.id != session_id || session.status == SessionStatus::Ended {
            return None;
        }

        session.status = SessionStatus::Ended;
        session.end_time = Some(Utc::now());

        if let Ok(json) = (OutboundFrame::SessionEnd {
            session_id: session.id.clone(),
        })
        .encode()
        {
            let _ = self.manager.send(json);
        }

        info!("session {} ended", session.id);
        Some(summarize(session, &self.buffer))
    }

    /// Summary of the current session, live or ended.
    pub fn current_summary(&self) -> Option<SessionSummary> {
        let guard = self.session.lock().unwrap();
        guard.as_ref().map(|s| summarize(s, &self.buffer))
    }

    /// Send an opaque control command to the remote service.
    pub fn send_command(&self, payload: serde_json::Value) -> Result<(), LiveError> {
        let json = OutboundFrame::Command { payload }.encode()?;
        self.manager.send(json)
    }

    pub fn buffer(&self) -> &Arc<ContentBuffer> {
        &self.buffer
    }

    pub fn connection_snapshot(&self) -> ConnectionSnapshot {
        self.manager.snapshot()
    }

    pub fn latency(&self) -> std::time::Duration {
        self.manager.latency()
    }

    pub fn health_metrics(&self) -> HealthMetrics {
        self.manager.health_metrics()
    }

    /// Whether the connection quality warrants a UI warning.
    pub fn needs_attention(&self) -> bool {
        self.manager.needs_attention()
    }

    /// End any live session, disconnect, and drop the event subscription.
    /// Safe to call repeatedly or on an already-clean instance.
    pub async fn cleanup(&self) {
        let live_id = {
            let guard = self.session.lock().unwrap();
            guard
                .as_ref()
                .filter(|s| s.status != SessionStatus::Ended)
                .map(|s| s.id.clone())
        };
        if let Some(id) = live_id {
            let _ = self.end_session(&id);
        }

        self.manager.disconnect().await;

        let listener = self.listener.lock().unwrap().take();
        if let Some(subscription) = listener {
            subscription.unsubscribe();
        }
    }
}

/// Accumulator for an utterance streamed across several frames. Items in
/// the buffer stay immutable; only this in-flight state grows.
struct PendingUtterance {
    speaker: Speaker,
    text: String,
    word_timings: Vec<WordTiming>,
}

impl PendingUtterance {
    fn start(speaker: Speaker, segments: &[FrameSegment]) -> Self {
        let mut pending = Self {
            speaker,
            text: String::new(),
            word_timings: Vec::new(),
        };
        pending.extend(segments);
        pending
    }

    fn extend(&mut self, segments: &[FrameSegment]) {
        for segment in segments {
            if !self.text.is_empty() && !self.text.ends_with(' ') {
                self.text.push(' ');
            }

            match segment.segment_type {
                SegmentType::Math => {
                    let latex = segment
                        .latex
                        .as_deref()
                        .unwrap_or(segment.content.as_str());
                    if latex.starts_with('$') {
                        self.text.push_str(latex);
                    } else {
                        // Re-delimit so segmentation finds the span again
                        self.text.push('$');
                        self.text.push_str(latex);
                        self.text.push('$');
                    }
                }
                SegmentType::Code => {
                    if segment.content.contains("```") {
                        self.text.push_str(&segment.content);
                    } else {
                        self.text.push_str("```");
                        self.text.push_str(&segment.content);
                        self.text.push_str("```");
                    }
                }
                SegmentType::Text => self.text.push_str(&segment.content),
            }

            if let Some(timings) = &segment.word_timings {
                self.word_timings.extend(timings.iter().cloned());
            }
        }
    }

    fn flush(self, buffer: &ContentBuffer) {
        process_utterance(buffer, self.speaker, &self.text, self.word_timings);
    }
}

/// Route one decoded frame. Runs synchronously on the receive loop; drops
/// everything while the session is not active.
fn dispatch_frame(
    session: &Mutex<Option<Session>>,
    pending: &Mutex<Option<PendingUtterance>>,
    buffer: &ContentBuffer,
    frame: &InboundFrame,
) {
    let forwarding = matches!(
        session.lock().unwrap().as_ref().map(|s| s.status),
        Some(SessionStatus::Active)
    );
    if !forwarding {
        return;
    }

    match frame {
        InboundFrame::Transcription {
            speaker,
            segments,
            is_final,
            ..
        } => {
            let streaming = segments.first().map(|s| s.streaming).unwrap_or(false);
            let mut guard = pending.lock().unwrap();

            if !streaming {
                // Flush-then-new: a non-streaming chunk never merges into
                // an utterance already in flight.
                if let Some(done) = guard.take() {
                    done.flush(buffer);
                }
            }

            let same_speaker = guard
                .as_ref()
                .map(|p| p.speaker == *speaker)
                .unwrap_or(false);
            if same_speaker {
                if let Some(pending_utterance) = guard.as_mut() {
                    pending_utterance.extend(segments);
                }
            } else {
                if let Some(done) = guard.take() {
                    done.flush(buffer);
                }
                *guard = Some(PendingUtterance::start(*speaker, segments));
            }

            if *is_final {
                if let Some(done) = guard.take() {
                    done.flush(buffer);
                }
            }
        }
        InboundFrame::Text { speaker, text, .. } => {
            let leftover = pending.lock().unwrap().take();
            if let Some(done) = leftover {
                done.flush(buffer);
            }
            process_utterance(buffer, *speaker, text, Vec::new());
        }
        InboundFrame::UtteranceEnd { .. } => {
            let leftover = pending.lock().unwrap().take();
            if let Some(done) = leftover {
                done.flush(buffer);
            }
        }
        InboundFrame::Pong { .. } | InboundFrame::Unknown => {}
    }
}

/// Normalize one utterance, segment it, and append the resulting items.
/// Returns how many items were added.
fn process_utterance(
    buffer: &ContentBuffer,
    speaker: Speaker,
    raw: &str,
    word_timings: Vec<WordTiming>,
) -> usize {
    let mut attributed = speaker;
    let mut normalized = normalize(raw);
    if normalized.is_empty() {
        return 0;
    }

    // An explicit leading speaker label overrides the frame attribution.
    if let Some(first) = detect_speaker_changes(&normalized).first() {
        if first.index == 0 {
            attributed = first.speaker;
            if let Some(colon) = normalized.find(':') {
                normalized = normalized[colon + 1..].trim_start().to_string();
            }
        }
    }
    if normalized.is_empty() {
        return 0;
    }

    let mut timings = if word_timings.is_empty() {
        None
    } else {
        Some(word_timings)
    };

    let mut added = 0;
    for segment in segment_text(&normalized) {
        let mut item = match segment.segment_type {
            SegmentType::Math => {
                let latex = segment
                    .latex
                    .clone()
                    .unwrap_or_else(|| segment.text.clone());
                let mut item = DisplayItem::new(ItemType::Math, latex.clone());
                item.math_fragments = Some(vec![MathFragment {
                    latex,
                    block: segment.text.starts_with("$$"),
                }]);
                item
            }
            SegmentType::Code => {
                let code = segment
                    .text
                    .trim_start_matches("```")
                    .trim_end_matches("```")
                    .trim();
                DisplayItem::new(ItemType::Code, code)
            }
            SegmentType::Text => DisplayItem::new(ItemType::Text, segment.text.clone()),
        }
        .with_speaker(attributed)
        .with_confidence(segment.confidence);

        // Word timings describe the whole utterance; attach them to its
        // first item.
        if let Some(t) = timings.take() {
            item.word_timings = Some(t);
        }

        buffer.add_item(item);
        added += 1;
    }

    added
}

fn summarize(session: &Session, buffer: &ContentBuffer) -> SessionSummary {
    let stats = buffer.statistics();
    let ended = session.end_time.unwrap_or_else(Utc::now);

    SessionSummary {
        session_id: session.id.clone(),
        student_id: session.student_id.clone(),
        topic: session.topic.clone(),
        status: session.status,
        started_at: session.start_time,
        ended_at: session.end_time,
        duration_secs: (ended - session.start_time).num_milliseconds() as f64 / 1000.0,
        item_count: stats.total_items,
        student_items: stats
            .speaker_distribution
            .get(&Speaker::Student)
            .copied()
            .unwrap_or(0),
        teacher_items: stats
            .speaker_distribution
            .get(&Speaker::Teacher)
            .copied()
            .unwrap_or(0),
    }
}
