/// Errors that can occur during a bus exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying bus.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
