use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backoff::BackoffPolicy;
use super::health::{HealthMetrics, HealthMonitor};
use super::messages::{InboundFrame, OutboundFrame};
use super::transport::{Transport, TransportEvent, TransportLink};
use crate::config::{ConnectionConfig, MonitorConfig};
use crate::error::LiveError;

/// Only one manager may own the service connection per process; every
/// consumer must observe the same connection state.
static MANAGER_LIVE: AtomicBool = AtomicBool::new(false);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Events delivered to registered listeners, in registration order.
///
/// Listeners run on the receive-loop task and must not block; defer long
/// work to another task.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Message(InboundFrame),
    Error(String),
}

type Listener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;
type ListenerRegistry = Arc<Mutex<Vec<(u64, Listener)>>>;

/// Handle returned by `on_event`; removes exactly that listener.
pub struct EventSubscription {
    id: u64,
    listeners: Weak<Mutex<Vec<(u64, Listener)>>>,
}

impl EventSubscription {
    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Point-in-time connection snapshot. Side-effect free.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub connected: bool,
    pub reconnecting: bool,
    /// Reconnect attempts in the current connection cycle
    pub attempts: u32,
    pub url: Option<String>,
}

struct Shared {
    state: Mutex<ConnectionState>,
    listeners: ListenerRegistry,
    next_listener_id: AtomicU64,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    attempts: AtomicU32,
    url: Mutex<Option<String>>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Synchronous fan-out in registration order.
    fn emit(&self, event: &ConnectionEvent) {
        let listeners: Vec<Listener> = {
            let guard = self.listeners.lock().unwrap();
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(event);
        }
    }
}

enum PumpExit {
    Shutdown,
    CleanClose(String),
    UnexpectedClose(String),
}

/// Owner of the one persistent connection to the realtime tutor service.
///
/// Drives the `Disconnected → Connecting → Connected` state machine,
/// redials with exponential backoff on unexpected closes, and fans
/// received frames out to registered listeners. Exactly one instance may
/// exist per process.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    connection_cfg: ConnectionConfig,
    health: Arc<HealthMonitor>,
    run_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl ConnectionManager {
    /// Fails with `AlreadyInitialized` if another manager is live; the
    /// guard is released when this one drops.
    pub fn new(
        transport: Arc<dyn Transport>,
        connection_cfg: ConnectionConfig,
        monitor_cfg: MonitorConfig,
    ) -> Result<Self, LiveError> {
        if MANAGER_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LiveError::AlreadyInitialized);
        }

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                listeners: Arc::new(Mutex::new(Vec::new())),
                next_listener_id: AtomicU64::new(0),
                outbound: Mutex::new(None),
                attempts: AtomicU32::new(0),
                url: Mutex::new(None),
            }),
            transport,
            connection_cfg,
            health: Arc::new(HealthMonitor::new(monitor_cfg)),
            run_task: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        })
    }

    /// Open the connection. No-op when already connected; otherwise starts
    /// a fresh connection cycle (attempt counter reset). A dial failure
    /// does not error here: the manager transitions to `Reconnecting` and
    /// keeps redialing in the background until the retry budget is spent.
    pub async fn connect(&self, url: &str) -> Result<(), LiveError> {
        if self.shared.state() == ConnectionState::Connected {
            return Ok(());
        }

        self.stop_supervisor().await;

        *self.shared.url.lock().unwrap() = Some(url.to_string());
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);

        let backoff = BackoffPolicy::from_config(&self.connection_cfg);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock().unwrap() = Some(shutdown_tx);

        info!("connecting to {}", url);

        let initial_link = match self.transport.open(url).await {
            Ok(link) => Some(install_link(&self.shared, &self.health, link)),
            Err(e) => {
                warn!("initial dial failed: {}", e);
                self.shared.set_state(ConnectionState::Reconnecting);
                None
            }
        };

        let shared = Arc::clone(&self.shared);
        let transport = Arc::clone(&self.transport);
        let health = Arc::clone(&self.health);
        let handle = tokio::spawn(supervise(
            shared,
            transport,
            health,
            backoff,
            shutdown_rx,
            initial_link,
        ));
        *self.run_task.lock().unwrap() = Some(handle);

        Ok(())
    }

    /// Queue a payload for the wire. Fails fast with `NotConnected` when
    /// the connection is not established; never blocks.
    pub fn send(&self, payload: String) -> Result<(), LiveError> {
        if self.shared.state() != ConnectionState::Connected {
            return Err(LiveError::NotConnected);
        }

        let sender = self
            .shared
            .outbound
            .lock()
            .unwrap()
            .clone()
            .ok_or(LiveError::NotConnected)?;

        sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                LiveError::Transport("outbound queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => LiveError::NotConnected,
        })
    }

    /// Explicit, user-initiated disconnect: cancels any pending reconnect
    /// wait, closes the transport, and emits `Disconnected`. Idempotent;
    /// no auto-reconnect follows.
    pub async fn disconnect(&self) {
        self.stop_supervisor().await;
        self.health.stop();
        *self.shared.outbound.lock().unwrap() = None;

        let previous = {
            let mut state = self.shared.state.lock().unwrap();
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };

        if previous != ConnectionState::Disconnected {
            info!("disconnected");
            self.shared.emit(&ConnectionEvent::Disconnected);
        }
    }

    /// Register a listener; events arrive in registration order.
    pub fn on_event<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.shared
            .listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));

        EventSubscription {
            id,
            listeners: Arc::downgrade(&self.shared.listeners),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.shared.state();
        ConnectionSnapshot {
            state,
            connected: state == ConnectionState::Connected,
            reconnecting: state == ConnectionState::Reconnecting,
            attempts: self.shared.attempts.load(Ordering::SeqCst),
            url: self.shared.url.lock().unwrap().clone(),
        }
    }

    /// Rolling average round-trip latency, from the health monitor.
    pub fn latency(&self) -> Duration {
        self.health.latency()
    }

    pub fn health_metrics(&self) -> HealthMetrics {
        self.health.get_metrics()
    }

    pub fn needs_attention(&self) -> bool {
        self.health.needs_attention()
    }

    async fn stop_supervisor(&self) {
        let sender = self.shutdown_tx.lock().unwrap().take();
        if let Some(sender) = sender {
            let _ = sender.send(true);
        }

        let task = self.run_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.run_task.lock().unwrap().take() {
            task.abort();
        }
        self.health.stop();
        MANAGER_LIVE.store(false, Ordering::SeqCst);
    }
}

/// Wire up an opened link: store the outbound sender, start health probing
/// over it, mark the state `Connected`, and announce it.
fn install_link(
    shared: &Arc<Shared>,
    health: &Arc<HealthMonitor>,
    link: TransportLink,
) -> mpsc::Receiver<TransportEvent> {
    let TransportLink { outbound, inbound } = link;

    *shared.outbound.lock().unwrap() = Some(outbound.clone());

    let ping_tx = outbound;
    health.start(move || {
        let frame = OutboundFrame::Ping {
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        if let Ok(json) = frame.encode() {
            let _ = ping_tx.try_send(json);
        }
    });

    shared.set_state(ConnectionState::Connected);
    info!("connected");
    shared.emit(&ConnectionEvent::Connected);

    inbound
}

/// Long-lived connection supervisor: pumps the live link, and on an
/// unexpected close redials with backoff until it succeeds, the retry
/// budget is spent, or shutdown is requested.
async fn supervise(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    health: Arc<HealthMonitor>,
    mut backoff: BackoffPolicy,
    mut shutdown: watch::Receiver<bool>,
    initial_link: Option<mpsc::Receiver<TransportEvent>>,
) {
    let mut inbound = initial_link;

    'lifecycle: loop {
        if let Some(mut rx) = inbound.take() {
            let exit = pump(&shared, &health, &mut rx, &mut shutdown).await;
            health.stop();
            *shared.outbound.lock().unwrap() = None;

            match exit {
                PumpExit::Shutdown => return,
                PumpExit::CleanClose(reason) => {
                    info!("remote closed the connection: {}", reason);
                    shared.set_state(ConnectionState::Disconnected);
                    shared.emit(&ConnectionEvent::Disconnected);
                    return;
                }
                PumpExit::UnexpectedClose(reason) => {
                    warn!("connection lost: {}", reason);
                    shared.set_state(ConnectionState::Reconnecting);
                }
            }
        }

        // Redial with backoff until a dial succeeds.
        loop {
            if !backoff.can_retry() {
                let attempts = backoff.attempts();
                warn!("retry budget exhausted after {} attempts", attempts);
                shared.set_state(ConnectionState::Error);
                shared.emit(&ConnectionEvent::Error(format!(
                    "retry budget exhausted after {} attempts",
                    attempts
                )));
                return;
            }

            let attempt = tokio::select! {
                _ = shutdown.changed() => return,
                attempt = backoff.wait() => match attempt {
                    Ok(attempt) => attempt,
                    Err(_) => continue,
                },
            };

            shared
                .attempts
                .store(attempt.attempt_number, Ordering::SeqCst);
            shared.set_state(ConnectionState::Connecting);

            let url = match shared.url.lock().unwrap().clone() {
                Some(url) => url,
                None => return,
            };

            info!(
                "reconnect attempt {} after {:?}",
                attempt.attempt_number, attempt.delay
            );

            let dialed = tokio::select! {
                _ = shutdown.changed() => return,
                dialed = transport.open(&url) => dialed,
            };

            match dialed {
                Ok(link) => {
                    inbound = Some(install_link(&shared, &health, link));
                    continue 'lifecycle;
                }
                Err(e) => {
                    warn!("redial failed: {}", e);
                    shared.set_state(ConnectionState::Reconnecting);
                }
            }
        }
    }
}

/// Drain the live link: decode frames, route heartbeat replies to the
/// health monitor, and fan everything else out to listeners. One bad frame
/// never stops the loop.
async fn pump(
    shared: &Arc<Shared>,
    health: &Arc<HealthMonitor>,
    inbound: &mut mpsc::Receiver<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpExit {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return PumpExit::Shutdown,
            event = inbound.recv() => match event {
                Some(TransportEvent::Message(payload)) => match InboundFrame::decode(&payload) {
                    Ok(InboundFrame::Pong { .. }) => health.handle_pong(),
                    Ok(InboundFrame::Unknown) => {
                        warn!("dropping unrecognized frame");
                    }
                    Ok(frame) => shared.emit(&ConnectionEvent::Message(frame)),
                    Err(e) => {
                        warn!("dropping malformed frame: {}", e);
                    }
                },
                Some(TransportEvent::Closed { clean: true, reason }) => {
                    return PumpExit::CleanClose(reason);
                }
                Some(TransportEvent::Closed { clean: false, reason }) => {
                    return PumpExit::UnexpectedClose(reason);
                }
                None => return PumpExit::UnexpectedClose("transport channel dropped".to_string()),
            }
        }
    }
}
