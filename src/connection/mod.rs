//! Connection layer for the realtime tutor service
//!
//! One `ConnectionManager` per process owns the persistent duplex link:
//! it dials, pumps inbound frames to listeners, probes liveness, and
//! redials with exponential backoff when the link drops unexpectedly.

mod backoff;
mod health;
mod manager;
mod messages;
mod transport;

pub use backoff::{BackoffPolicy, BackoffStats, RetryAttempt};
pub use health::{HealthMetrics, HealthMonitor, Quality};
pub use manager::{
    ConnectionEvent, ConnectionManager, ConnectionSnapshot, ConnectionState, EventSubscription,
};
pub use messages::{FrameSegment, InboundFrame, OutboundFrame};
pub use transport::{Transport, TransportEvent, TransportLink, WsTransport};
