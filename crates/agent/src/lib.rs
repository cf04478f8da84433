//! Conversational commerce agent core.
//!
//! A customer message flows through the [`orchestrator`]: the session is loaded from the
//! [`session`] store, the language model ([`llm`]) proposes either text or tool calls, the
//! [`tools`] dispatcher runs the calls against the catalog ([`retrieval`]) and the commerce
//! repositories, and the [`aggregator`] merges their outcomes into one reply.
//!
//! The model never decides prices, stock or order state. Those come from the repositories,
//! and every tool call is decoded into a typed command before it runs.

pub mod aggregator;
pub mod alerts;
pub mod llm;
pub mod observer;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod session;
pub mod tools;

pub use orchestrator::{ConversationOrchestrator, TurnReply};
