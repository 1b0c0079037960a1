use thiserror::Error;

/// Errors surfaced by the live session core.
///
/// Transport-level failures are retried internally by the connection
/// manager; everything else is returned to the caller immediately.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The underlying transport failed to connect, send, or receive.
    #[error("transport error: {0}")]
    Transport(String),

    /// The reconnect budget is spent; the connection stays down until an
    /// explicit `connect()`.
    #[error("retry budget exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    /// A send was attempted while the connection was not established.
    #[error("not connected to the realtime service")]
    NotConnected,

    /// A second `ConnectionManager` was constructed in the same process.
    #[error("a connection manager already exists in this process")]
    AlreadyInitialized,

    /// `start_session` was called while another session is still active.
    #[error("session {0} is still active")]
    SessionActive(String),

    /// An inbound frame could not be decoded. Logged and dropped by the
    /// dispatch loop; never tears down the connection.
    #[error("malformed inbound frame: {0}")]
    MalformedMessage(String),

    /// A serialized buffer failed to parse on import. Existing buffer
    /// contents are left untouched.
    #[error("buffer import rejected: {0}")]
    BufferImport(String),
}
