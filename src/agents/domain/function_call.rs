//! Function call types

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Manifest;
use crate::agents::error::{AgentError, AgentResult};

/// A function invocation requested by the model
///
/// Produced either from the provider's native `function_call` field or
/// recovered from free text by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function being called
    pub name: String,
    /// Arguments (JSON object)
    pub arguments: Value,
}

impl FunctionCall {
    /// Create a new function call
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Build from the provider wire shape, where `arguments` is a JSON string
    pub fn from_wire(name: impl Into<String>, arguments: &str) -> Self {
        let arguments = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
        };
        Self::new(name, arguments)
    }

    /// Check the call against the function schema declared by the manifest
    pub fn validate(&self, manifest: &Manifest) -> AgentResult<()> {
        let definition = manifest.function(&self.name).ok_or_else(|| AgentError::InvalidFunctionCall {
            name: self.name.clone(),
            reason: "function is not declared by the manifest".to_string(),
        })?;

        let Some(schema) = definition.get("parameters") else {
            return Ok(());
        };

        let compiled = JSONSchema::compile(schema).map_err(|e| AgentError::InvalidFunctionCall {
            name: self.name.clone(),
            reason: format!("invalid parameter schema: {}", e),
        })?;

        if let Err(errors) = compiled.validate(&self.arguments) {
            let messages: Vec<String> = errors.map(|e| format!("{}: {}", e.instance_path, e)).collect();
            return Err(AgentError::InvalidFunctionCall {
                name: self.name.clone(),
                reason: messages.join(", "),
            });
        }

        Ok(())
    }
}

/// Partial function call received while streaming
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl FunctionCallDelta {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, args: impl Into<String>) -> Self {
        self.arguments = Some(args.into());
        self
    }
}

/// Accumulator for building a function call from streaming deltas
#[derive(Debug, Default)]
pub struct FunctionCallAccumulator {
    name: String,
    arguments: String,
}

impl FunctionCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a delta update
    pub fn apply_delta(&mut self, delta: &FunctionCallDelta) {
        if let Some(name) = &delta.name {
            self.name.push_str(name);
        }
        if let Some(args) = &delta.arguments {
            self.arguments.push_str(args);
        }
    }

    /// Whether any delta named a function
    pub fn has_function_call(&self) -> bool {
        !self.name.is_empty()
    }

    /// Build the final call, if any
    pub fn build(self) -> Option<FunctionCall> {
        if self.name.is_empty() {
            return None;
        }
        Some(FunctionCall::from_wire(self.name, &self.arguments))
    }
}
