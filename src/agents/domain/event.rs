//! Events emitted by a session while it runs its call loop

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agents::error::{AgentError, AgentResult};

/// Method name of the session switch action
pub const SWITCH_SESSION: &str = "switch_session";

/// Payload of a `switch_session` action
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SwitchSessionRequest {
    /// Agent to activate; `None` only updates the current memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Memory written into the current session before switching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Map<String, Value>>,
    /// Merge `memory` into the existing memory instead of replacing it
    #[serde(default)]
    pub merge: bool,
    /// Follow-up user message appended to the new session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Cross-cutting action requested by a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "data", rename_all = "snake_case")]
pub enum EmitAction {
    SwitchSession(SwitchSessionRequest),
}

impl EmitAction {
    pub fn method(&self) -> &'static str {
        match self {
            EmitAction::SwitchSession(_) => SWITCH_SESSION,
        }
    }

    /// Build an action from its method name and data
    pub fn from_method(method: &str, data: Value) -> AgentResult<Self> {
        match method {
            SWITCH_SESSION => Ok(EmitAction::SwitchSession(serde_json::from_value(data)?)),
            other => Err(AgentError::Configuration(format!("Unknown emit method: {}", other))),
        }
    }

    /// Whether the method name is one the application handles
    pub fn is_known_method(method: &str) -> bool {
        method == SWITCH_SESSION
    }
}

/// Event delivered to the application's callback sink
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Informational message (activation, notebook creation)
    Info { message: String },
    /// Bot output; `partial` marks a streamed fragment
    Bot { text: String, partial: bool },
    /// Result of a function call
    Function { name: String, result: String },
    /// Action for the application to carry out
    Emit { action: EmitAction },
    /// Reported error
    Error { message: String },
}

impl ChatEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info { message: message.into() }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::Bot { text: text.into(), partial: false }
    }

    pub fn bot_partial(text: impl Into<String>) -> Self {
        Self::Bot { text: text.into(), partial: true }
    }

    pub fn function(name: impl Into<String>, result: impl Into<String>) -> Self {
        Self::Function { name: name.into(), result: result.into() }
    }

    pub fn emit(action: EmitAction) -> Self {
        Self::Emit { action }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Callback type string: `info`, `bot`, `function`, `emit` or `error`
    pub fn callback_type(&self) -> &'static str {
        match self {
            ChatEvent::Info { .. } => "info",
            ChatEvent::Bot { .. } => "bot",
            ChatEvent::Function { .. } => "function",
            ChatEvent::Emit { .. } => "emit",
            ChatEvent::Error { .. } => "error",
        }
    }
}
