use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::message::InboundMessage;
use crate::transport::{ChannelTransport, NoopChannelTransport, TransportError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("message handling failed: {0}")]
    Failed(String),
}

/// Produces the reply for one inbound message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> Result<String, HandlerError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

pub struct ChannelRunner {
    transport: Arc<dyn ChannelTransport>,
    handler: Arc<dyn MessageHandler>,
    reconnect_policy: ReconnectPolicy,
}

impl ChannelRunner {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        handler: Arc<dyn MessageHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, handler, reconnect_policy }
    }

    /// A runner without a provider; it connects and finishes immediately.
    pub fn detached(handler: Arc<dyn MessageHandler>) -> Self {
        Self::new(Arc::new(NoopChannelTransport), handler, ReconnectPolicy::default())
    }

    /// Pumps messages until the transport closes its stream. Transport failures are retried
    /// with backoff; once retries are exhausted the runner returns without failing the process.
    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        event_name = "ingress.channel.transport_failed",
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "channel transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            event_name = "ingress.channel.retries_exhausted",
                            max_retries = self.reconnect_policy.max_retries,
                            "channel retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening channel transport connection");
        self.transport.connect().await?;
        info!(attempt, "channel transport connected");

        let mut turns = JoinSet::new();
        let outcome = self.pump(attempt, &mut turns).await;

        // Turns already accepted still get their replies, even when the stream failed.
        let drained = turns.len();
        while turns.join_next().await.is_some() {}
        if drained > 0 {
            debug!(
                event_name = "ingress.channel.turns_drained",
                attempt,
                drained,
                "in-flight turns finished"
            );
        }

        outcome?;
        self.transport.disconnect().await
    }

    async fn pump(&self, attempt: u32, turns: &mut JoinSet<()>) -> Result<(), TransportError> {
        loop {
            while turns.try_join_next().is_some() {}

            let Some(message) = self.transport.next_message().await? else {
                info!(attempt, "channel transport stream closed");
                return Ok(());
            };
            let key = message.session_key();

            info!(
                event_name = "ingress.channel.message_received",
                correlation_id = %message.message_id,
                tenant_id = %message.tenant_id,
                identity = %key.masked_identity(),
                "received customer message"
            );

            turns.spawn(answer(Arc::clone(&self.transport), Arc::clone(&self.handler), message));
        }
    }
}

/// Runs one turn and delivers its reply. Conversations do not wait on each other here;
/// ordering within one conversation is the handler's concern.
async fn answer(
    transport: Arc<dyn ChannelTransport>,
    handler: Arc<dyn MessageHandler>,
    message: InboundMessage,
) {
    let text = match handler.handle(&message).await {
        Ok(text) => text,
        Err(error) => {
            warn!(
                event_name = "ingress.channel.handler_failed",
                correlation_id = %message.message_id,
                tenant_id = %message.tenant_id,
                error = %error,
                "message handling failed; continuing channel loop"
            );
            return;
        }
    };

    if let Err(error) = transport.send_reply(&message.reply(text)).await {
        warn!(
            event_name = "ingress.channel.reply_failed",
            correlation_id = %message.message_id,
            tenant_id = %message.tenant_id,
            error = %error,
            "failed to deliver reply"
        );
    } else {
        debug!(
            event_name = "ingress.channel.reply_sent",
            correlation_id = %message.message_id,
            tenant_id = %message.tenant_id,
            "reply delivered"
        );
    }
}
