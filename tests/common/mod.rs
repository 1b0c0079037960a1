// Shared test support: an in-memory transport standing in for the
// realtime service, plus polling helpers for async assertions.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tutor_live::config::{ConnectionConfig, MonitorConfig};
use tutor_live::{LiveError, Transport, TransportEvent, TransportLink};

/// Remote-side handles for one accepted connection.
pub struct RemoteEnd {
    to_client: mpsc::Sender<TransportEvent>,
    pub from_client: mpsc::Receiver<String>,
}

impl RemoteEnd {
    /// Deliver a frame to the client as the remote service would.
    pub async fn send_frame(&self, json: &str) {
        self.to_client
            .send(TransportEvent::Message(json.to_string()))
            .await
            .expect("client receiver dropped");
    }

    /// Simulate an unexpected connection drop.
    pub async fn drop_link(&self) {
        let _ = self
            .to_client
            .send(TransportEvent::Closed {
                clean: false,
                reason: "simulated drop".to_string(),
            })
            .await;
    }

    /// Simulate a normal close handshake from the remote side.
    pub async fn close_cleanly(&self) {
        let _ = self
            .to_client
            .send(TransportEvent::Closed {
                clean: true,
                reason: "normal close".to_string(),
            })
            .await;
    }

    /// Next payload the client wrote to the wire, or None on timeout.
    pub async fn next_payload(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }
}

/// In-memory transport: fails the first `fail_opens` dials, then hands out
/// channel-backed links and records the remote end of each.
pub struct ScriptedTransport {
    fail_opens: AtomicU32,
    pub open_count: AtomicU32,
    links_created: AtomicU32,
    ends: Mutex<Vec<RemoteEnd>>,
}

impl ScriptedTransport {
    pub fn new(fail_opens: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_opens: AtomicU32::new(fail_opens),
            open_count: AtomicU32::new(0),
            links_created: AtomicU32::new(0),
            ends: Mutex::new(Vec::new()),
        })
    }

    pub fn opens(&self) -> u32 {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Links successfully established over the transport's lifetime.
    pub fn links_created(&self) -> u32 {
        self.links_created.load(Ordering::SeqCst)
    }

    /// Wait for the next unclaimed link and hand over its remote end.
    /// Successive calls yield successive links in connection order.
    pub async fn take_link(&self, timeout: Duration) -> RemoteEnd {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let claimed = {
                let mut ends = self.ends.lock().unwrap();
                if ends.is_empty() {
                    None
                } else {
                    Some(ends.remove(0))
                }
            };
            if let Some(end) = claimed {
                return end;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("no link established within {:?}", timeout);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _url: &str) -> Result<TransportLink, LiveError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let failures_left = self.fail_opens.load(Ordering::SeqCst);
        if failures_left > 0 {
            self.fail_opens.store(failures_left - 1, Ordering::SeqCst);
            return Err(LiveError::Transport("scripted dial failure".to_string()));
        }

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);

        self.links_created.fetch_add(1, Ordering::SeqCst);
        self.ends.lock().unwrap().push(RemoteEnd {
            to_client: in_tx,
            from_client: out_rx,
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Fast, jitter-free backoff so reconnect tests finish quickly.
pub fn test_connection_config() -> ConnectionConfig {
    ConnectionConfig {
        url: "mem://tutor".to_string(),
        base_delay_ms: 10,
        max_delay_ms: 50,
        max_attempts: 5,
        jitter: false,
    }
}

/// Slow pings so health probing stays out of the way unless a test asks.
pub fn test_monitor_config() -> MonitorConfig {
    MonitorConfig {
        ping_interval_ms: 60_000,
        ping_timeout_ms: 30_000,
        max_stored_results: 10,
    }
}

/// Poll until `check` passes or the timeout elapses.
pub async fn wait_until<F>(timeout: Duration, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
