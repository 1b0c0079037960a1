use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub connection: ConnectionConfig,
    pub monitor: MonitorConfig,
    pub buffer: BufferConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Connection and reconnect-backoff settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket URL of the realtime tutor service
    pub url: String,

    /// First reconnect delay in milliseconds (doubles each attempt)
    pub base_delay_ms: u64,

    /// Upper bound on a single reconnect delay
    pub max_delay_ms: u64,

    /// Reconnect attempts before giving up
    pub max_attempts: u32,

    /// Randomize delays to avoid thundering-herd redials
    pub jitter: bool,
}

/// Connection health probe settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Interval between liveness pings in milliseconds
    pub ping_interval_ms: u64,

    /// How long to wait for a pong before counting the probe as lost
    pub ping_timeout_ms: u64,

    /// Size of the rolling latency sample window
    pub max_stored_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Maximum retained display items (oldest evicted first)
    pub max_size: usize,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7880/realtime".to_string(),
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter: true,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 10_000,
            ping_timeout_ms: 5_000,
            max_stored_results: 50,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { max_size: 500 }
    }
}
