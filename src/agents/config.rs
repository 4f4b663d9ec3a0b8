//! Configuration types for LLM models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Token budget applied when a model does not declare `max_token`
pub const DEFAULT_MAX_TOKEN: u32 = 4096;

/// Configuration of one LLM model
///
/// Binds an engine (by registry name) to a concrete provider model, the
/// credential it authenticates with and its token budget. Immutable once the
/// model has been built.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Short name used to refer to the model from manifests and the CLI
    pub name: String,
    /// Engine registry key (e.g. "openai-gpt", "hosted")
    pub engine_name: String,
    /// Provider-side model identifier (e.g. "gpt-3.5-turbo-0613")
    pub model_name: String,
    /// Name of the credential holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Whether the credential must be present at construction time
    #[serde(default = "default_required")]
    pub api_key_required: bool,
    /// Maximum token length of the model context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_token: Option<u32>,
    /// Base URL override for OpenAI-compatible endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Inference URL for hosted engines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Header carrying the API key for hosted engines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_api_key: Option<String>,
    /// Marks the default model
    #[serde(default)]
    pub default: bool,
    /// Any other engine-specific keys
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn default_required() -> bool {
    true
}

impl ModelConfig {
    /// Create a model configuration with the required fields
    pub fn new(
        name: impl Into<String>,
        engine_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            engine_name: engine_name.into(),
            model_name: model_name.into(),
            api_key: None,
            api_key_required: true,
            max_token: None,
            api_base: None,
            url: None,
            header_api_key: None,
            default: false,
            extra: HashMap::new(),
        }
    }

    /// Set the credential name
    pub fn with_api_key(mut self, credential: impl Into<String>) -> Self {
        self.api_key = Some(credential.into());
        self
    }

    /// Set the token budget
    pub fn with_max_token(mut self, max_token: u32) -> Self {
        self.max_token = Some(max_token);
        self
    }

    /// Set the API base override
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set the hosted inference URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the hosted API key header
    pub fn with_header_api_key(mut self, header: impl Into<String>) -> Self {
        self.header_api_key = Some(header.into());
        self
    }

    /// Make the credential optional
    pub fn optional_api_key(mut self) -> Self {
        self.api_key_required = false;
        self
    }

    /// Built-in model used when the settings declare none
    pub fn builtin_default() -> Self {
        let mut config = Self::new("gpt3", "openai-gpt", "gpt-3.5-turbo")
            .with_api_key("OPENAI_API_KEY")
            .with_max_token(DEFAULT_MAX_TOKEN);
        config.default = true;
        config
    }

    /// Look up any key, typed fields first
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "name" => Some(Value::String(self.name.clone())),
            "engine_name" => Some(Value::String(self.engine_name.clone())),
            "model_name" => Some(Value::String(self.model_name.clone())),
            "api_key" => self.api_key.clone().map(Value::String),
            "max_token" => self.max_token.map(Value::from),
            "api_base" => self.api_base.clone().map(Value::String),
            "url" => self.url.clone().map(Value::String),
            "header_api_key" => self.header_api_key.clone().map(Value::String),
            _ => self.extra.get(key).cloned(),
        }
    }
}
