use std::time::Duration;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The bus exchange failed.
    #[error("transport error: {0}")]
    Transport(#[from] ntrig_transport::TransportError),

    /// The command could not be framed.
    #[error("frame error: {0}")]
    Frame(#[from] ntrig_frame::FrameError),

    /// Waiting for the bus was cancelled; nothing was sent.
    #[error("interrupted while waiting for the bus, retry")]
    Interrupted,

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The caller's buffer cannot hold the oldest reply.
    #[error("reply of {needed} bytes does not fit in {available}-byte buffer")]
    BufferTooSmall { needed: usize, available: usize },

    /// The heartbeat request could not be sent.
    #[error("heartbeat request failed: {0}")]
    HeartbeatFailed(String),
}

impl SessionError {
    /// Whether the operation can simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
