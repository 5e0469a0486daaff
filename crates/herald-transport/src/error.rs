use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("confirm mode unavailable on this channel")]
    ConfirmsUnavailable,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("declaration refused: {0}")]
    Declare(String),
    #[error("connection unavailable: {0}")]
    Connection(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
