// Integration tests for the session orchestrator: lifecycle, the
// dispatch pipeline (normalize -> segment -> buffer), streaming-utterance
// accumulation, and cleanup.
//
// The connection manager is a process singleton, so every test takes
// MANAGER_GUARD to serialize construction.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tutor_live::{
    ConnectionManager, ConnectionState, ContentBuffer, ItemType, LiveError, SessionOrchestrator,
    SessionStatus, Speaker,
};

mod common;
use common::{test_connection_config, test_monitor_config, wait_until, ScriptedTransport};

static MANAGER_GUARD: Mutex<()> = Mutex::new(());

fn lock_manager() -> std::sync::MutexGuard<'static, ()> {
    MANAGER_GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

struct Stack {
    transport: Arc<ScriptedTransport>,
    orchestrator: SessionOrchestrator,
    buffer: Arc<ContentBuffer>,
}

fn build_stack(fail_opens: u32) -> Stack {
    let transport = ScriptedTransport::new(fail_opens);
    let manager = Arc::new(
        ConnectionManager::new(
            transport.clone(),
            test_connection_config(),
            test_monitor_config(),
        )
        .expect("manager construction"),
    );
    let buffer = Arc::new(ContentBuffer::new(100));
    let orchestrator = SessionOrchestrator::new(
        Arc::clone(&manager),
        Arc::clone(&buffer),
        "mem://tutor".to_string(),
    );

    Stack {
        transport,
        orchestrator,
        buffer,
    }
}

#[tokio::test]
async fn test_start_session_connects_and_announces() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    let session_id = stack
        .orchestrator
        .start_session("student-7", "quadratic equations")
        .await
        .unwrap();
    assert!(session_id.starts_with("session-"));
    assert_eq!(
        stack.orchestrator.connection_snapshot().state,
        ConnectionState::Connected
    );

    let mut remote = stack.transport.take_link(Duration::from_secs(1)).await;
    let announce = remote
        .next_payload(Duration::from_secs(1))
        .await
        .expect("session announcement");
    assert!(announce.contains("session_start"));
    assert!(announce.contains("student-7"));
    assert!(announce.contains("quadratic equations"));

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_second_start_fails_while_session_live() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    let first = stack
        .orchestrator
        .start_session("student-1", "fractions")
        .await
        .unwrap();

    let second = stack.orchestrator.start_session("student-2", "circles").await;
    assert!(matches!(second, Err(LiveError::SessionActive(id)) if id == first));

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_text_frame_flows_through_pipeline_to_buffer() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();
    let remote = stack.transport.take_link(Duration::from_secs(1)).await;

    remote
        .send_frame(
            r#"{"type":"text","speaker":"teacher","timestamp":10,"text":"X plus Y equals Z."}"#,
        )
        .await;

    wait_until(Duration::from_secs(1), || stack.buffer.len() == 1).await;

    let items = stack.buffer.get_buffer();
    assert_eq!(items[0].item_type, ItemType::Text);
    assert_eq!(items[0].speaker, Some(Speaker::Teacher));
    assert!(items[0].content.contains('+'), "spoken plus must normalize");
    assert!(items[0].content.contains('='), "spoken equals must normalize");

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_streaming_chunks_accumulate_until_utterance_end() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();
    let remote = stack.transport.take_link(Duration::from_secs(1)).await;

    remote
        .send_frame(
            r#"{"type":"transcription","speaker":"teacher","timestamp":1,
                "segments":[{"type":"text","content":"The answer is","streaming":true}]}"#,
        )
        .await;
    remote
        .send_frame(
            r#"{"type":"transcription","speaker":"teacher","timestamp":2,
                "segments":[{"type":"math","content":"x=4","latex":"x=4","streaming":true}]}"#,
        )
        .await;

    // Still in flight: nothing reaches the buffer yet.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stack.buffer.len(), 0);

    remote
        .send_frame(r#"{"type":"utterance_end","timestamp":3}"#)
        .await;

    wait_until(Duration::from_secs(1), || stack.buffer.len() == 2).await;

    let items = stack.buffer.get_buffer();
    assert_eq!(items[0].item_type, ItemType::Text);
    assert_eq!(items[0].content, "The answer is");
    assert_eq!(items[1].item_type, ItemType::Math);
    assert_eq!(items[1].content, "x=4");
    let fragments = items[1].math_fragments.as_ref().expect("math fragments");
    assert_eq!(fragments[0].latex, "x=4");

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_final_marker_flushes_without_utterance_end() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();
    let remote = stack.transport.take_link(Duration::from_secs(1)).await;

    remote
        .send_frame(
            r#"{"type":"transcription","speaker":"student","timestamp":1,
                "segments":[{"type":"text","content":"Is it four?","streaming":true}],
                "final":true}"#,
        )
        .await;

    wait_until(Duration::from_secs(1), || stack.buffer.len() == 1).await;
    let items = stack.buffer.get_buffer();
    assert_eq!(items[0].speaker, Some(Speaker::Student));
    assert_eq!(items[0].content, "Is it 4?");

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_nonstreaming_frame_flushes_inflight_utterance_first() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();
    let remote = stack.transport.take_link(Duration::from_secs(1)).await;

    // Open a streaming utterance, then interrupt it with a non-streaming
    // frame: flush-then-new.
    remote
        .send_frame(
            r#"{"type":"transcription","speaker":"teacher","timestamp":1,
                "segments":[{"type":"text","content":"Let us begin","streaming":true}]}"#,
        )
        .await;
    remote
        .send_frame(
            r#"{"type":"transcription","speaker":"teacher","timestamp":2,
                "segments":[{"type":"text","content":"New thought entirely."}],
                "final":true}"#,
        )
        .await;

    wait_until(Duration::from_secs(1), || stack.buffer.len() == 2).await;

    let items = stack.buffer.get_buffer();
    assert_eq!(items[0].content, "Let us begin");
    assert_eq!(items[1].content, "New thought entirely.");
    assert!(items[0].timestamp <= items[1].timestamp);

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_paused_session_drops_frames() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();
    let remote = stack.transport.take_link(Duration::from_secs(1)).await;

    assert!(stack.orchestrator.pause_session());

    remote
        .send_frame(r#"{"type":"text","speaker":"teacher","timestamp":1,"text":"dropped"}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stack.buffer.len(), 0, "paused session must not forward");

    assert!(stack.orchestrator.resume_session());
    remote
        .send_frame(r#"{"type":"text","speaker":"teacher","timestamp":2,"text":"kept"}"#)
        .await;

    wait_until(Duration::from_secs(1), || stack.buffer.len() == 1).await;
    assert_eq!(stack.buffer.get_buffer()[0].content, "kept");

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_pause_resume_without_session() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    assert!(!stack.orchestrator.pause_session());
    assert!(!stack.orchestrator.resume_session());
}

#[tokio::test]
async fn test_end_session_with_wrong_id_is_noop() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();

    assert!(stack.orchestrator.end_session("session-bogus").is_none());
    let summary = stack.orchestrator.current_summary().unwrap();
    assert_eq!(summary.status, SessionStatus::Active);

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_end_session_seals_record_and_stops_forwarding() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    let session_id = stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();
    let remote = stack.transport.take_link(Duration::from_secs(1)).await;

    remote
        .send_frame(r#"{"type":"text","speaker":"student","timestamp":1,"text":"before end"}"#)
        .await;
    wait_until(Duration::from_secs(1), || stack.buffer.len() == 1).await;

    let summary = stack.orchestrator.end_session(&session_id).unwrap();
    assert_eq!(summary.status, SessionStatus::Ended);
    assert!(summary.ended_at.is_some());
    assert_eq!(summary.item_count, 1);
    assert_eq!(summary.student_items, 1);

    // The connection stays open, but frames no longer flow.
    assert_eq!(
        stack.orchestrator.connection_snapshot().state,
        ConnectionState::Connected
    );
    remote
        .send_frame(r#"{"type":"text","speaker":"student","timestamp":2,"text":"after end"}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stack.buffer.len(), 1);

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_speaker_marker_overrides_frame_attribution() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();
    let remote = stack.transport.take_link(Duration::from_secs(1)).await;

    remote
        .send_frame(
            r#"{"type":"text","speaker":"student","timestamp":1,"text":"Teacher: try again."}"#,
        )
        .await;

    wait_until(Duration::from_secs(1), || stack.buffer.len() == 1).await;

    let items = stack.buffer.get_buffer();
    assert_eq!(items[0].speaker, Some(Speaker::Teacher));
    assert_eq!(items[0].content, "try again.");

    stack.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();

    stack.orchestrator.cleanup().await;
    assert_eq!(
        stack.orchestrator.connection_snapshot().state,
        ConnectionState::Disconnected
    );
    let summary = stack.orchestrator.current_summary().unwrap();
    assert_eq!(summary.status, SessionStatus::Ended);

    // Second cleanup on an already-clean instance.
    stack.orchestrator.cleanup().await;
    assert_eq!(
        stack.orchestrator.connection_snapshot().state,
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn test_send_command_requires_connection() {
    let _guard = lock_manager();
    let stack = build_stack(0);

    let result = stack
        .orchestrator
        .send_command(serde_json::json!({"action": "mute"}));
    assert!(matches!(result, Err(LiveError::NotConnected)));

    stack
        .orchestrator
        .start_session("student-1", "algebra")
        .await
        .unwrap();
    stack
        .orchestrator
        .send_command(serde_json::json!({"action": "mute"}))
        .unwrap();

    stack.orchestrator.cleanup().await;
}
