//! One conversation turn, end to end.
//!
//! load session → greeting shortcut or one model call → tool batch → append turns → observer.
//! A turn that fails before producing a reply leaves the session exactly as it was. Turns of
//! one conversation run one at a time; different conversations run in parallel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use storefront_core::domain::commerce::Customer;
use storefront_core::domain::session::{Role, SessionKey, Turn};
use storefront_core::domain::tenant::TenantProfile;

use crate::aggregator::GENERIC_FAILURE_REPLY;
use crate::llm::{ChatMessage, LlmClient, LlmReply, LlmRequest};
use crate::observer::{LoggingObserver, TurnObserver, TurnPath, TurnRecord};
use crate::prompt::PromptRenderer;
use crate::session::SessionStore;
use crate::tools::classify::{is_simple_greeting, refinement_of_previous_search};
use crate::tools::{tool_definitions, ErrorKind, ToolDispatcher, ToolInvocation, ToolOutcome};

pub const MODEL_UNAVAILABLE_REPLY: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";
pub const EMPTY_MESSAGE_REPLY: &str =
    "Send 'products' to see our catalog, or tell me what you're looking for.";

const DEFAULT_PROMPT_HISTORY_TURNS: usize = 6;

/// What the customer receives for one inbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnReply {
    pub correlation_id: Uuid,
    pub text: String,
    pub outcomes: Vec<ToolOutcome>,
}

pub struct ConversationOrchestrator {
    dispatcher: Arc<ToolDispatcher>,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptRenderer>,
    observer: Arc<dyn TurnObserver>,
    session_ttl: Duration,
    prompt_history_turns: usize,
}

impl ConversationOrchestrator {
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptRenderer>,
    ) -> Self {
        let session_ttl = dispatcher.sessions().settings().default_ttl;
        Self {
            dispatcher,
            llm,
            prompts,
            observer: Arc::new(LoggingObserver),
            session_ttl,
            prompt_history_turns: DEFAULT_PROMPT_HISTORY_TURNS,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_prompt_history_turns(mut self, turns: usize) -> Self {
        self.prompt_history_turns = turns;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        self.dispatcher.sessions()
    }

    pub async fn handle_message(&self, key: &SessionKey, text: &str) -> TurnReply {
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "turn",
            correlation_id = %correlation_id,
            tenant_id = %key.tenant_id,
            identity = %key.masked_identity()
        );
        async {
            let _turn = self.sessions().begin_turn(key).await;
            self.run_turn(correlation_id, key, text).await
        }
        .instrument(span)
        .await
    }

    async fn run_turn(&self, correlation_id: Uuid, key: &SessionKey, text: &str) -> TurnReply {
        let started = Instant::now();
        let message = text.trim();
        if message.is_empty() {
            return TurnReply {
                correlation_id,
                text: EMPTY_MESSAGE_REPLY.to_string(),
                outcomes: Vec::new(),
            };
        }

        let session = self.sessions().get_or_create(key, self.session_ttl).await;
        let customer = self.load_customer(key).await;
        let profile = self.load_profile(key).await;
        let now = self.sessions().now();

        if session.history().is_empty() && is_simple_greeting(message) {
            match self.prompts.welcome(&profile, customer.as_ref(), now) {
                Ok(welcome) => {
                    return self
                        .finish(
                            correlation_id,
                            key,
                            message,
                            welcome,
                            Vec::new(),
                            TurnPath::Welcome,
                            started,
                        )
                        .await;
                }
                Err(error) => warn!(
                    event_name = "turn.welcome.unavailable",
                    error = %error,
                    "welcome template failed; asking the model instead"
                ),
            }
        }

        let tools = tool_definitions();
        let system = match self.prompts.system_prompt(&profile, customer.as_ref(), &tools, now) {
            Ok(system) => system,
            Err(error) => {
                error!(event_name = "turn.prompt.failed", error = %error, "system prompt failed");
                return self.abandon(correlation_id, key, started);
            }
        };

        let request = LlmRequest {
            messages: prompt_messages(system, session.history(), self.prompt_history_turns, message),
            tools,
        };
        let reply = match self.llm.complete(&request).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "llm.request.failed",
                    error_kind = ErrorKind::ExternalCollaborator.as_str(),
                    error = %error,
                    "language model call failed; session left untouched"
                );
                return self.abandon(correlation_id, key, started);
            }
        };

        let refinement = match &reply {
            LlmReply::Text(_) => refinement_of_previous_search(message, session.history()),
            LlmReply::ToolCalls(_) => None,
        };
        match (reply, refinement) {
            (LlmReply::ToolCalls(invocations), _) => {
                let report = self.dispatcher.execute(key, message, invocations).await;
                self.finish(
                    correlation_id,
                    key,
                    message,
                    report.reply,
                    report.outcomes,
                    TurnPath::Tools,
                    started,
                )
                .await
            }
            (LlmReply::Text(_), Some(query)) => {
                info!(
                    event_name = "turn.refinement.detected",
                    query = %query,
                    "model answered a search refinement with text; searching the combined query"
                );
                let search = ToolInvocation::new("search_products", json!({ "query": query }));
                let report = self.dispatcher.execute(key, message, vec![search]).await;
                self.finish(
                    correlation_id,
                    key,
                    message,
                    report.reply,
                    report.outcomes,
                    TurnPath::Refinement,
                    started,
                )
                .await
            }
            (LlmReply::Text(text), None) => {
                let text = if text.trim().is_empty() {
                    GENERIC_FAILURE_REPLY.to_string()
                } else {
                    text
                };
                self.finish(
                    correlation_id,
                    key,
                    message,
                    text,
                    Vec::new(),
                    TurnPath::ModelText,
                    started,
                )
                .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        correlation_id: Uuid,
        key: &SessionKey,
        message: &str,
        reply: String,
        outcomes: Vec<ToolOutcome>,
        path: TurnPath,
        started: Instant,
    ) -> TurnReply {
        let sessions = self.sessions();
        let now = sessions.now();
        // confirm_order may have cleared the session during this turn.
        sessions.get_or_create(key, self.session_ttl).await;
        sessions.append_turn(key, Turn::user(message, now)).await;
        sessions.append_turn(key, Turn::assistant(reply.clone(), now)).await;

        self.observer.turn_completed(&TurnRecord {
            correlation_id,
            key: key.clone(),
            path,
            outcomes: outcomes.clone(),
            reply: reply.clone(),
            elapsed_ms: elapsed_ms(started),
        });
        TurnReply { correlation_id, text: reply, outcomes }
    }

    fn abandon(&self, correlation_id: Uuid, key: &SessionKey, started: Instant) -> TurnReply {
        let reply = MODEL_UNAVAILABLE_REPLY.to_string();
        self.observer.turn_completed(&TurnRecord {
            correlation_id,
            key: key.clone(),
            path: TurnPath::ModelUnavailable,
            outcomes: Vec::new(),
            reply: reply.clone(),
            elapsed_ms: elapsed_ms(started),
        });
        TurnReply { correlation_id, text: reply, outcomes: Vec::new() }
    }

    async fn load_customer(&self, key: &SessionKey) -> Option<Customer> {
        match self.dispatcher.services().customers.get_or_create(&key.tenant_id, &key.identity).await
        {
            Ok(customer) => Some(customer),
            Err(error) => {
                warn!(
                    event_name = "turn.customer.unavailable",
                    error_kind = ErrorKind::Persistence.as_str(),
                    error = %error,
                    "customer record could not be loaded"
                );
                None
            }
        }
    }

    async fn load_profile(&self, key: &SessionKey) -> TenantProfile {
        match self.dispatcher.services().tenants.find_profile(&key.tenant_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => TenantProfile::placeholder(key.tenant_id.clone()),
            Err(error) => {
                warn!(
                    event_name = "turn.tenant.unavailable",
                    error_kind = ErrorKind::Persistence.as_str(),
                    error = %error,
                    "tenant profile could not be loaded"
                );
                TenantProfile::placeholder(key.tenant_id.clone())
            }
        }
    }
}

/// System prompt, then the last `history_turns` history entries, then the new message.
fn prompt_messages(
    system: String,
    history: &[Turn],
    history_turns: usize,
    message: &str,
) -> Vec<ChatMessage> {
    let skip = history.len().saturating_sub(history_turns);
    let mut messages = Vec::with_capacity(history.len() - skip + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history[skip..].iter().map(|turn| match turn.role {
        Role::User => ChatMessage::user(turn.content.clone()),
        Role::Assistant => ChatMessage::assistant(turn.content.clone()),
    }));
    messages.push(ChatMessage::user(message));
    messages
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use storefront_core::domain::session::Turn;

    use super::prompt_messages;
    use crate::llm::{ChatMessage, ChatRole};

    #[test]
    fn prompt_keeps_only_recent_history() {
        let now = Utc::now();
        let history = vec![
            Turn::user("oi", now),
            Turn::assistant("Olá!", now),
            Turn::user("tem dipirona?", now),
            Turn::assistant("1. Dipirona 500mg", now),
        ];

        let messages = prompt_messages("system".to_string(), &history, 2, "quero o 1");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::system("system"));
        assert_eq!(messages[1], ChatMessage::user("tem dipirona?"));
        assert_eq!(messages[2].role, ChatRole::Assistant);
        assert_eq!(messages[3], ChatMessage::user("quero o 1"));

        let without_history = prompt_messages("system".to_string(), &history, 0, "oi");
        assert_eq!(without_history.len(), 2);
    }
}
