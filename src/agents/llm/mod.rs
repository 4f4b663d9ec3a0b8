//! LLM engine implementations
//!
//! One engine per provider, all normalized to the same [`Completion`] shape:
//! - `openai-gpt` — OpenAI chat completions with native function calling
//! - `openai-vision` — OpenAI vision models, image URL taken from the prompt
//! - `hosted` — self-managed inference endpoints taking a flattened prompt
//! - `ollama` — local models
//! - `echo` — deterministic offline engine

mod echo;
mod hosted;
mod ollama;
mod openai;
mod registry;
mod stream;
mod vision;

pub use echo::EchoEngine;
pub use hosted::{message_to_prompt, HostedEngine};
pub use ollama::OllamaEngine;
pub use openai::OpenAiEngine;
pub use registry::{EngineConstructor, EngineRegistry};
pub use stream::*;
pub use vision::{extract_image_url, OpenAiVisionEngine};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agents::config::ModelConfig;
use crate::agents::domain::{FunctionCall, Manifest, Message, Role};
use crate::agents::error::{LlmError, LlmResult};
use crate::agents::extract::extract_function_call;
use crate::config::Credentials;

/// Normalized result of one completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Role of the produced message (always assistant for chat engines)
    pub role: Role,
    /// Response text; `None` when the response is a function call
    pub text: Option<String>,
    /// Function call, native or extracted
    pub function_call: Option<FunctionCall>,
    /// Provider failure reported instead of raised
    pub failure: Option<String>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: Some(text.into()),
            function_call: None,
            failure: None,
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            role: Role::Assistant,
            text: None,
            function_call: Some(call),
            failure: None,
        }
    }

    /// Degraded result standing in for a provider failure
    pub fn failed(error: &LlmError) -> Self {
        Self {
            role: Role::Assistant,
            text: Some(String::new()),
            function_call: None,
            failure: Some(error.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Reason completion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    FunctionCall,
    ContentFilter,
}

impl FinishReason {
    /// Map a provider finish reason string
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "length" => FinishReason::Length,
            "function_call" | "tool_calls" => FinishReason::FunctionCall,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

/// Provider adapter
///
/// Implementors provide [`LlmEngine::complete`]; callers use
/// [`LlmEngine::chat_completion`], which never fails: provider errors are
/// logged and turned into a degraded [`Completion`].
#[async_trait]
pub trait LlmEngine: Send + Sync {
    /// Engine registry name
    fn name(&self) -> &str;

    /// Provider model identifier
    fn model(&self) -> &str;

    /// Whether [`LlmEngine::complete_stream`] is implemented
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Run one completion against the provider
    async fn complete(&self, messages: &[Message], manifest: &Manifest, verbose: bool) -> LlmResult<Completion>;

    /// Run one streamed completion
    fn complete_stream(
        &self,
        _messages: &[Message],
        _manifest: &Manifest,
        _verbose: bool,
    ) -> LlmResult<CompletionStream> {
        Err(LlmError::Unsupported(format!("{} does not stream", self.name())))
    }

    /// Whether `text` fits the model context minus the reserved margin
    fn is_within_budget(&self, text: &str) -> bool;

    /// Run one completion, reporting failures instead of raising them
    async fn chat_completion(&self, messages: &[Message], manifest: &Manifest, verbose: bool) -> Completion {
        match self.complete(messages, manifest, verbose).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::error!(engine = self.name(), model = self.model(), "Chat completion failed: {}", e);
                Completion::failed(&e)
            }
        }
    }
}

/// Resolve the API key a model config asks for
///
/// Returns `None` for models without a credential or with an optional one
/// that is absent; a required credential that is absent is an error.
pub fn resolve_api_key(config: &ModelConfig, credentials: &Credentials) -> LlmResult<Option<String>> {
    let Some(name) = &config.api_key else {
        return Ok(None);
    };

    match credentials.get(name) {
        Some(value) => Ok(Some(value.to_string())),
        None if config.api_key_required => Err(LlmError::MissingCredential(name.clone())),
        None => Ok(None),
    }
}

/// Build the normalized result from a provider's text and native call
///
/// Text without a native call goes through the extractor when the manifest
/// declares functions.
pub(crate) fn normalize(
    messages: &[Message],
    manifest: &Manifest,
    text: Option<String>,
    native_call: Option<FunctionCall>,
) -> Completion {
    if let Some(call) = native_call {
        return Completion::function_call(call);
    }

    let text = text.unwrap_or_default();
    if !text.is_empty() {
        if let Some(call) = extract_function_call(messages.last(), manifest, &text) {
            return Completion::function_call(call);
        }
    }

    Completion::text(text)
}
