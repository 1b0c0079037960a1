use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::MonitorConfig;

/// Packet loss above this ratio flags the connection for attention even
/// while latency still grades as Good.
const LOSS_ATTENTION_THRESHOLD: f64 = 0.1;

/// Derived categorical rating of connection quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Point-in-time connection health snapshot.
#[derive(Debug, Clone)]
pub struct HealthMetrics {
    /// Rolling average round-trip latency
    pub latency: Duration,
    /// Lost probes / sent probes, in [0, 1]
    pub packet_loss: f64,
    pub quality: Quality,
    pub is_healthy: bool,
    /// Time since the monitor started
    pub uptime: Duration,
    pub last_pong_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MonitorState {
    latencies: VecDeque<Duration>,
    pings_sent: u64,
    probes_lost: u64,
    /// Outstanding probe awaiting a pong
    pending_ping: Option<Instant>,
    last_pong_time: Option<DateTime<Utc>>,
    started_at: Option<Instant>,
}

/// Periodic liveness prober for an active connection.
///
/// `start` spawns an owned timer task that invokes the supplied ping
/// sender every `ping_interval_ms`. Probes unanswered within
/// `ping_timeout_ms` count against packet loss. The timer is cancelled by
/// `stop`, which is safe to call repeatedly.
pub struct HealthMonitor {
    config: MonitorConfig,
    state: Arc<Mutex<MonitorState>>,
    shutdown: Arc<Notify>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MonitorState::default())),
            shutdown: Arc::new(Notify::new()),
            timer_handle: Mutex::new(None),
        }
    }

    /// Begin probing. `ping_sender` must be cheap and non-blocking; it runs
    /// on the timer task.
    pub fn start<F>(&self, ping_sender: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        // Restart cleanly if a previous timer is still around
        self.stop();

        {
            let mut state = self.state.lock().unwrap();
            *state = MonitorState::default();
            state.started_at = Some(Instant::now());
        }

        let interval = Duration::from_millis(self.config.ping_interval_ms);
        let timeout = Duration::from_millis(self.config.ping_timeout_ms);
        let state = Arc::clone(&self.state);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would probe before the transport
            // settles; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        debug!("health monitor timer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let send_probe = {
                            let mut state = state.lock().unwrap();
                            match state.pending_ping {
                                Some(sent_at) if sent_at.elapsed() >= timeout => {
                                    state.probes_lost += 1;
                                    state.pending_ping = None;
                                    warn!("liveness probe timed out ({} lost so far)", state.probes_lost);
                                    true
                                }
                                Some(_) => false, // still in flight
                                None => true,
                            }
                        };

                        if send_probe {
                            {
                                let mut state = state.lock().unwrap();
                                state.pings_sent += 1;
                                state.pending_ping = Some(Instant::now());
                            }
                            ping_sender();
                        }
                    }
                }
            }
        });

        *self.timer_handle.lock().unwrap() = Some(handle);
    }

    /// Record a heartbeat reply from the remote service.
    pub fn handle_pong(&self) {
        let max_stored = self.config.max_stored_results;
        let mut state = self.state.lock().unwrap();

        if let Some(sent_at) = state.pending_ping.take() {
            let latency = sent_at.elapsed();
            state.latencies.push_back(latency);
            while state.latencies.len() > max_stored {
                state.latencies.pop_front();
            }
            debug!("pong received, latency {:?}", latency);
        }

        state.last_pong_time = Some(Utc::now());
    }

    pub fn get_metrics(&self) -> HealthMetrics {
        let timeout = Duration::from_millis(self.config.ping_timeout_ms);
        let state = self.state.lock().unwrap();

        // A probe past its timeout counts as lost even before the timer
        // task reaps it.
        let pending_expired = matches!(state.pending_ping, Some(sent) if sent.elapsed() >= timeout);
        let lost = state.probes_lost + u64::from(pending_expired);

        let packet_loss = if state.pings_sent == 0 {
            0.0
        } else {
            lost as f64 / state.pings_sent as f64
        };

        let latency = if state.latencies.is_empty() {
            Duration::ZERO
        } else {
            let total: Duration = state.latencies.iter().sum();
            total / state.latencies.len() as u32
        };

        let quality = grade(latency, packet_loss, state.latencies.is_empty() && lost > 0);

        HealthMetrics {
            latency,
            packet_loss,
            quality,
            is_healthy: matches!(quality, Quality::Excellent | Quality::Good),
            uptime: state.started_at.map(|t| t.elapsed()).unwrap_or_default(),
            last_pong_time: state.last_pong_time,
        }
    }

    /// Whether the connection should be surfaced as degraded.
    pub fn needs_attention(&self) -> bool {
        let metrics = self.get_metrics();
        matches!(metrics.quality, Quality::Fair | Quality::Poor)
            || metrics.packet_loss > LOSS_ATTENTION_THRESHOLD
    }

    /// Rolling average round-trip latency.
    pub fn latency(&self) -> Duration {
        self.get_metrics().latency
    }

    /// Cancel the timer task. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.timer_handle.lock().unwrap().take() {
            self.shutdown.notify_waiters();
            handle.abort();
        }
    }

    /// Zero all counters without touching the timer.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        let started_at = state.started_at;
        *state = MonitorState::default();
        state.started_at = started_at;
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Threshold grading: degrades monotonically as loss or latency rises.
fn grade(latency: Duration, packet_loss: f64, all_probes_lost: bool) -> Quality {
    if all_probes_lost {
        return Quality::Poor;
    }

    let ms = latency.as_millis();
    if packet_loss == 0.0 && ms < 100 {
        Quality::Excellent
    } else if packet_loss < 0.05 && ms < 250 {
        Quality::Good
    } else if packet_loss < 0.15 && ms < 600 {
        Quality::Fair
    } else {
        Quality::Poor
    }
}
