//! Hook receiving what each completed turn did.

use tracing::info;
use uuid::Uuid;

use storefront_core::domain::session::SessionKey;

use crate::tools::ToolOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPath {
    /// Greeting answered from the welcome template, no model call.
    Welcome,
    /// The model answered with text.
    ModelText,
    /// The model proposed tool calls and the dispatcher ran them.
    Tools,
    /// The model answered a bare refinement with text; the previous search was re-run with it.
    Refinement,
    /// The model call failed and the customer was asked to try again.
    ModelUnavailable,
}

impl TurnPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::ModelText => "model_text",
            Self::Tools => "tools",
            Self::Refinement => "refinement",
            Self::ModelUnavailable => "model_unavailable",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TurnRecord {
    pub correlation_id: Uuid,
    pub key: SessionKey,
    pub path: TurnPath,
    pub outcomes: Vec<ToolOutcome>,
    pub reply: String,
    pub elapsed_ms: u64,
}

impl TurnRecord {
    pub fn failed_tools(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.is_success()).count()
    }
}

pub trait TurnObserver: Send + Sync {
    fn turn_completed(&self, record: &TurnRecord);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingObserver;

impl TurnObserver for LoggingObserver {
    fn turn_completed(&self, record: &TurnRecord) {
        let tools: Vec<&str> = record.outcomes.iter().map(|outcome| outcome.name.as_str()).collect();
        info!(
            event_name = "turn.completed",
            correlation_id = %record.correlation_id,
            tenant_id = %record.key.tenant_id,
            identity = %record.key.masked_identity(),
            path = record.path.as_str(),
            tools = ?tools,
            failed_tools = record.failed_tools(),
            elapsed_ms = record.elapsed_ms,
            "conversation turn completed"
        );
    }
}
