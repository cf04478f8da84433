use std::sync::Arc;

use async_trait::async_trait;
use storefront_agent::ConversationOrchestrator;
use storefront_channel::{HandlerError, InboundMessage, MessageHandler};

/// Feeds channel messages into the orchestrator. Every turn produces a reply, so this
/// handler never fails.
pub struct OrchestratorHandler {
    orchestrator: Arc<ConversationOrchestrator>,
}

impl OrchestratorHandler {
    pub fn new(orchestrator: Arc<ConversationOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl MessageHandler for OrchestratorHandler {
    async fn handle(&self, message: &InboundMessage) -> Result<String, HandlerError> {
        let reply = self.orchestrator.handle_message(&message.session_key(), &message.text).await;
        Ok(reply.text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storefront_channel::{InboundMessage, MessageHandler};
    use storefront_db::DemoSeedDataset;

    use super::OrchestratorHandler;
    use crate::bootstrap::bootstrap_with_config;
    use crate::test_support::in_memory_config;

    #[tokio::test]
    async fn channel_greeting_gets_the_store_welcome() {
        let app = bootstrap_with_config(in_memory_config()).await.expect("bootstrap");
        DemoSeedDataset::load(&app.db_pool).await.expect("seed");

        let handler = OrchestratorHandler::new(Arc::clone(&app.orchestrator));
        let message =
            InboundMessage::new("m-1", DemoSeedDataset::tenant_id(), "5561999991234", "Oi");
        let reply = handler.handle(&message).await.expect("reply");

        assert!(reply.starts_with("Hello! Welcome to Farmácia Demo."), "{reply}");
        assert!(app.orchestrator.sessions().contains(&message.session_key()).await);
    }
}
