/// Errors that can occur while encoding or decoding low messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An outbound command carried no bytes.
    #[error("empty command")]
    EmptyCommand,

    /// An outbound command does not fit in one transfer.
    #[error("command too large ({size} bytes, max {max})")]
    CommandTooLarge { size: usize, max: usize },

    /// The first byte of an outbound command names no known request kind.
    #[error("unsupported request 0x{0:02x}")]
    UnsupportedRequest(u8),

    /// A buffer ended before the declared message did.
    #[error("truncated message ({available} bytes, need {needed})")]
    Truncated { needed: usize, available: usize },

    /// The declared message length is outside the valid range.
    #[error("invalid message length {0}")]
    InvalidLength(u16),
}

pub type Result<T> = std::result::Result<T, FrameError>;
