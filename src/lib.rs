pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod session;
pub mod text;

pub use buffer::{
    BufferStatistics, BufferSubscription, ContentBuffer, DisplayItem, ItemType, MathFragment,
    Speaker, WordTiming,
};
pub use config::Config;
pub use connection::{
    BackoffPolicy, ConnectionEvent, ConnectionManager, ConnectionSnapshot, ConnectionState,
    HealthMetrics, HealthMonitor, InboundFrame, OutboundFrame, Quality, Transport, TransportEvent,
    TransportLink, WsTransport,
};
pub use error::LiveError;
pub use http::{create_router, AppState};
pub use session::{Session, SessionOrchestrator, SessionStatus, SessionSummary};
pub use text::{normalize, segment_text, Segment, SegmentType};
