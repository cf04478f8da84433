//! Messaging-channel ingress.
//!
//! A [`ChannelTransport`] delivers customer messages from a chat provider and carries replies
//! back. [`ChannelRunner`] keeps the transport connected, reconnecting with exponential
//! backoff, and hands every inbound message to a [`MessageHandler`].
//!
//! ```text
//! provider → ChannelTransport → ChannelRunner → MessageHandler (orchestrator)
//!                   ↑                                  │
//!                   └──────────── reply ───────────────┘
//! ```

pub mod message;
pub mod runner;
pub mod transport;

pub use message::{InboundMessage, OutboundReply};
pub use runner::{ChannelRunner, HandlerError, MessageHandler, ReconnectPolicy};
pub use transport::{ChannelTransport, NoopChannelTransport, TransportError};
