use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::domain::session::SessionKey;
use storefront_core::domain::tenant::TenantId;

/// One customer message as delivered by a chat provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Provider-assigned id, used as the correlation id of the turn.
    pub message_id: String,
    pub tenant_id: TenantId,
    /// The customer's channel identity, typically a phone number.
    pub identity: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        message_id: impl Into<String>,
        tenant_id: TenantId,
        identity: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            tenant_id,
            identity: identity.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.tenant_id.clone(), self.identity.clone())
    }

    /// Builds the reply addressed to the sender of this message.
    pub fn reply(&self, text: impl Into<String>) -> OutboundReply {
        OutboundReply {
            in_reply_to: self.message_id.clone(),
            tenant_id: self.tenant_id.clone(),
            identity: self.identity.clone(),
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub in_reply_to: String,
    pub tenant_id: TenantId,
    pub identity: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use storefront_core::domain::tenant::TenantId;

    use super::InboundMessage;

    #[test]
    fn reply_is_addressed_to_the_sender() {
        let message =
            InboundMessage::new("wamid-1", TenantId("demo".to_string()), "5561999991234", "oi");
        let reply = message.reply("Olá!");

        assert_eq!(reply.in_reply_to, "wamid-1");
        assert_eq!(reply.identity, "5561999991234");
        assert_eq!(message.session_key().masked_identity(), "*********1234");
    }

    #[test]
    fn messages_deserialize_from_provider_json() {
        let message: InboundMessage = serde_json::from_value(serde_json::json!({
            "message_id": "m-9",
            "tenant_id": "demo",
            "identity": "5561",
            "text": "tem dipirona?",
            "received_at": "2026-03-01T12:00:00Z"
        }))
        .expect("decode");
        assert_eq!(message.tenant_id, TenantId("demo".to_string()));
    }
}
