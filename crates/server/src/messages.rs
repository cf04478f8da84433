use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use storefront_agent::ConversationOrchestrator;
use storefront_core::domain::session::SessionKey;
use storefront_core::domain::tenant::TenantId;
use storefront_core::errors::InterfaceError;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize)]
pub struct MessageRequest {
    pub tenant_id: String,
    pub identity: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageResponse {
    pub reply: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub correlation_id: String,
}

/// `POST /v1/messages`: runs one conversation turn and returns the reply text.
pub async fn post_message(
    State(orchestrator): State<Arc<ConversationOrchestrator>>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let key = session_key(&request).map_err(|error| {
        warn!(
            event_name = "ingress.http.rejected",
            correlation_id = %error.correlation_id(),
            error = %error,
            "message request rejected"
        );
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: error.user_message(),
                correlation_id: error.correlation_id().to_string(),
            }),
        )
    })?;

    let reply = orchestrator.handle_message(&key, &request.text).await;
    Ok(Json(MessageResponse {
        reply: reply.text,
        correlation_id: reply.correlation_id.to_string(),
    }))
}

fn session_key(request: &MessageRequest) -> Result<SessionKey, InterfaceError> {
    let tenant_id = request.tenant_id.trim();
    let identity = request.identity.trim();
    let missing = match (tenant_id.is_empty(), identity.is_empty()) {
        (true, _) => "tenant_id",
        (_, true) => "identity",
        _ => return Ok(SessionKey::new(TenantId(tenant_id.to_string()), identity)),
    };
    Err(InterfaceError::BadRequest {
        message: format!("`{missing}` must not be empty"),
        correlation_id: Uuid::new_v4().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{session_key, MessageRequest};

    fn request(tenant_id: &str, identity: &str) -> MessageRequest {
        MessageRequest {
            tenant_id: tenant_id.to_string(),
            identity: identity.to_string(),
            text: "oi".to_string(),
        }
    }

    #[test]
    fn blank_fields_are_rejected_by_name() {
        let error = session_key(&request("  ", "5561")).expect_err("blank tenant");
        assert!(error.to_string().contains("tenant_id"));

        let error = session_key(&request("farmacia-demo", "")).expect_err("blank identity");
        assert!(error.to_string().contains("identity"));
    }

    #[test]
    fn keys_are_trimmed() {
        let key = session_key(&request(" farmacia-demo ", " 5561999991234 ")).expect("key");
        assert_eq!(key.tenant_id.0, "farmacia-demo");
        assert_eq!(key.identity, "5561999991234");
    }
}
