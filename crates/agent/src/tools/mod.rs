//! Tool invocations proposed by the language model and what running them produced.

pub mod classify;
pub mod command;
pub mod dispatcher;
pub mod handlers;
pub mod reply;
pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use command::{DecodeError, ToolCommand};
pub use dispatcher::{CommerceServices, DispatchReport, ToolDispatcher};
pub use handlers::HandlerError;
pub use reply::{CartAddition, ProductListing, ToolReply};
pub use schema::{tool_definitions, ToolDefinition};

/// One action the model asked for. `arguments` is whatever JSON object the model produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    #[serde(default)]
    pub call_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self { call_id: None, name: name.into(), arguments }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    ExternalCollaborator,
    Persistence,
    Parse,
    UnknownTool,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::ExternalCollaborator => "external_collaborator",
            Self::Persistence => "persistence",
            Self::Parse => "parse",
            Self::UnknownTool => "unknown_tool",
        }
    }

    /// Kinds whose outcome still carries an explanation meant for the customer.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound | Self::Validation | Self::Conflict)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutcome {
    pub name: String,
    pub arguments: Value,
    pub reply: ToolReply,
    pub error_kind: Option<ErrorKind>,
}

impl ToolOutcome {
    pub fn succeeded(invocation: &ToolInvocation, reply: ToolReply) -> Self {
        Self {
            name: invocation.name.clone(),
            arguments: invocation.arguments.clone(),
            reply,
            error_kind: None,
        }
    }

    pub fn failed(invocation: &ToolInvocation, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            name: invocation.name.clone(),
            arguments: invocation.arguments.clone(),
            reply: ToolReply::Message(message.into()),
            error_kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }

    /// Whether the text of this outcome can be shown to the customer.
    pub fn is_usable(&self) -> bool {
        self.error_kind.map_or(true, |kind| kind.is_recoverable())
    }

    pub fn result_text(&self) -> String {
        self.reply.render()
    }
}
