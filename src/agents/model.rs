//! LLM model: a model configuration bound to its engine

use serde_json::Value;
use std::sync::Arc;

use super::config::{ModelConfig, DEFAULT_MAX_TOKEN};
use super::domain::{Manifest, Message};
use super::error::{AgentError, AgentResult, LlmError};
use super::llm::{Completion, CompletionStream, EngineRegistry, LlmEngine};
use crate::config::Credentials;

/// Result of [`LlmModel::generate_response`]
pub enum ModelResponse {
    /// Whole completion
    Complete(Completion),
    /// Fragments in production order
    Stream(CompletionStream),
}

impl std::fmt::Debug for ModelResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelResponse::Complete(completion) => f.debug_tuple("Complete").field(completion).finish(),
            ModelResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A configured model and the engine serving it
///
/// The engine is looked up by name in the [`EngineRegistry`]. An unknown
/// engine name is reported and leaves the model without an engine; calls on
/// such a model fail with [`AgentError::Configuration`].
pub struct LlmModel {
    config: ModelConfig,
    credentials: Credentials,
    engine: Option<Arc<dyn LlmEngine>>,
}

impl LlmModel {
    /// Build the model and its engine
    ///
    /// A missing required credential is fatal and returned as an error.
    pub fn new(config: ModelConfig, registry: &EngineRegistry, credentials: &Credentials) -> AgentResult<Self> {
        let engine = match registry.create(&config, credentials) {
            Ok(engine) => Some(engine),
            Err(LlmError::UnknownEngine(name)) => {
                tracing::error!(model = %config.name, "Invalid engine name: {}", name);
                None
            }
            Err(LlmError::MissingCredential(name)) => {
                return Err(AgentError::Configuration(format!(
                    "{} is required by model {} but is not set",
                    name, config.name
                )));
            }
            Err(e) => return Err(AgentError::Configuration(format!("model {}: {}", config.name, e))),
        };

        Ok(Self {
            config,
            credentials: credentials.clone(),
            engine,
        })
    }

    /// Bind a model to an engine directly, bypassing the registry
    pub fn with_engine(config: ModelConfig, engine: Arc<dyn LlmEngine>) -> Self {
        Self {
            config,
            credentials: Credentials::default(),
            engine: Some(engine),
        }
    }

    /// Provider model identifier
    pub fn name(&self) -> &str {
        &self.config.model_name
    }

    pub fn engine_name(&self) -> &str {
        &self.config.engine_name
    }

    /// Token budget, defaulting to 4096
    pub fn max_token(&self) -> u32 {
        self.config.max_token.unwrap_or(DEFAULT_MAX_TOKEN)
    }

    /// Whether the model's credential is available
    ///
    /// Models that do not reference a credential always pass.
    pub fn check_api_key(&self) -> bool {
        match &self.config.api_key {
            Some(name) => self.credentials.get(name).is_some_and(|v| !v.is_empty()),
            None => true,
        }
    }

    /// Value of the model's credential, if any
    pub fn api_key_value(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .and_then(|name| self.credentials.get(name))
    }

    /// Any configuration key
    pub fn get(&self, key: &str) -> Option<Value> {
        self.config.get(key)
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    fn engine(&self) -> AgentResult<&Arc<dyn LlmEngine>> {
        self.engine.as_ref().ok_or_else(|| {
            AgentError::Configuration(format!(
                "model {} has no engine (unknown engine {})",
                self.config.name, self.config.engine_name
            ))
        })
    }

    /// Ask the engine for the next response
    ///
    /// Streams when the manifest asks for it and the engine can; otherwise
    /// returns the whole completion, provider failures included as degraded
    /// results.
    pub async fn generate_response(
        &self,
        messages: &[Message],
        manifest: &Manifest,
        verbose: bool,
    ) -> AgentResult<ModelResponse> {
        let engine = self.engine()?;

        if manifest.stream() && engine.supports_streaming() {
            let stream = engine.complete_stream(messages, manifest, verbose)?;
            return Ok(ModelResponse::Stream(stream));
        }

        Ok(ModelResponse::Complete(engine.chat_completion(messages, manifest, verbose).await))
    }

    /// Whether `text` fits the model context minus the reserved margin
    ///
    /// Without an engine nothing is considered to fit.
    pub fn is_within_budget(&self, text: &str) -> bool {
        self.engine.as_ref().is_some_and(|engine| engine.is_within_budget(text))
    }
}

impl std::fmt::Debug for LlmModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmModel")
            .field("name", &self.config.name)
            .field("engine", &self.config.engine_name)
            .field("has_engine", &self.engine.is_some())
            .finish()
    }
}
