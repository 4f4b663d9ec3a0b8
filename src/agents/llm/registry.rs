//! Engine registry mapping engine names to constructors

use std::collections::HashMap;
use std::sync::Arc;

use super::{EchoEngine, HostedEngine, LlmEngine, OllamaEngine, OpenAiEngine, OpenAiVisionEngine};
use crate::agents::config::ModelConfig;
use crate::agents::error::{LlmError, LlmResult};
use crate::config::Credentials;

/// Builds an engine from a model configuration
pub type EngineConstructor =
    Arc<dyn Fn(&ModelConfig, &Credentials) -> LlmResult<Arc<dyn LlmEngine>> + Send + Sync>;

/// Name to constructor table consulted when a model is built
#[derive(Clone)]
pub struct EngineRegistry {
    constructors: HashMap<String, EngineConstructor>,
}

impl EngineRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with every built-in engine
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("openai-gpt", |config, credentials| {
            Ok(Arc::new(OpenAiEngine::new(config, credentials)?))
        });
        registry.register("openai-vision", |config, credentials| {
            Ok(Arc::new(OpenAiVisionEngine::new(config, credentials)?))
        });
        registry.register("hosted", |config, credentials| {
            Ok(Arc::new(HostedEngine::new(config, credentials)?))
        });
        registry.register("ollama", |config, credentials| {
            Ok(Arc::new(OllamaEngine::new(config, credentials)?))
        });
        registry.register("echo", |config, credentials| {
            Ok(Arc::new(EchoEngine::new(config, credentials)?))
        });
        registry
    }

    /// Register (or replace) an engine constructor
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&ModelConfig, &Credentials) -> LlmResult<Arc<dyn LlmEngine>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// Build the engine a model configuration names
    pub fn create(&self, config: &ModelConfig, credentials: &Credentials) -> LlmResult<Arc<dyn LlmEngine>> {
        let constructor = self
            .constructors
            .get(&config.engine_name)
            .ok_or_else(|| LlmError::UnknownEngine(config.engine_name.clone()))?;
        constructor(config, credentials)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered engine names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry").field("engines", &self.names()).finish()
    }
}
