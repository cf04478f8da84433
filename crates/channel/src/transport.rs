use async_trait::async_trait;
use thiserror::Error;

use crate::message::{InboundMessage, OutboundReply};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("channel failed to connect: {0}")]
    Connect(String),
    #[error("channel read failed: {0}")]
    Receive(String),
    #[error("channel reply failed: {0}")]
    Send(String),
    #[error("channel disconnect failed: {0}")]
    Disconnect(String),
}

/// A chat provider connection. `next_message` returns `None` once the stream has closed.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError>;
    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Transport with no provider behind it: connects, then reports a closed stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopChannelTransport;

#[async_trait]
impl ChannelTransport for NoopChannelTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
        Ok(None)
    }

    async fn send_reply(&self, _reply: &OutboundReply) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
