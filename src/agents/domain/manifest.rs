//! Agent manifest: declarative definition of one agent

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tera::{Context, Tera};

use super::EmitAction;
use crate::agents::error::AgentResult;

/// Temperature used when a manifest does not set one
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// System prompt, written either as one string or as a list of lines
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PromptText {
    Line(String),
    Lines(Vec<String>),
}

impl PromptText {
    fn joined(&self) -> String {
        match self {
            PromptText::Line(line) => line.clone(),
            PromptText::Lines(lines) => lines.join("\n"),
        }
    }
}

/// Side effect attached to a declared function
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Render a message from the call arguments
    Template { message: String },
    /// Emit an action to the application
    Emit {
        emit_method: String,
        #[serde(default)]
        emit_data: Map<String, Value>,
    },
}

impl ActionSpec {
    /// Render a template action's message against the call arguments
    pub fn render_message(template: &str, arguments: &Value) -> AgentResult<String> {
        let context = arguments_context(arguments)?;
        Ok(Tera::one_off(template, &context, false)?)
    }

    /// Build the emitted action, rendering every string in `emit_data`
    pub fn build_emit(method: &str, data: &Map<String, Value>, arguments: &Value) -> AgentResult<EmitAction> {
        let context = arguments_context(arguments)?;
        let rendered = render_value(&Value::Object(data.clone()), &context)?;
        EmitAction::from_method(method, rendered)
    }
}

fn arguments_context(arguments: &Value) -> AgentResult<Context> {
    match arguments {
        Value::Object(_) => Ok(Context::from_serialize(arguments)?),
        _ => Ok(Context::new()),
    }
}

fn render_value(value: &Value, context: &Context) -> AgentResult<Value> {
    Ok(match value {
        Value::String(s) if s.contains("{{") => Value::String(Tera::one_off(s, context, false)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(v, context))
                .collect::<AgentResult<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), render_value(v, context)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

/// Declarative agent definition
///
/// Read-only from the session's point of view. Loaded by the configuration
/// layer from `switchboard.toml` or the `manifests/` directory.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Manifest {
    /// Display title
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    /// System prompt; `{{key}}` placeholders are filled from session memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptText>,
    /// Candidate intro messages, one is picked on activation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intro: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Function schemas (`{name, description, parameters}`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<Value>,
    /// Side effects keyed by function name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub actions: HashMap<String, ActionSpec>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_completions: Option<u32>,
    /// Model name override (key into the configured models)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Requests a sandboxed notebook runtime on activation
    #[serde(default)]
    pub notebook: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Manifest {
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Declared function schemas, `None` when the manifest declares none
    pub fn functions(&self) -> Option<&[Value]> {
        if self.functions.is_empty() {
            None
        } else {
            Some(&self.functions)
        }
    }

    /// Schema of one declared function
    pub fn function(&self, name: &str) -> Option<&Value> {
        self.functions
            .iter()
            .find(|f| f.get("name").and_then(Value::as_str) == Some(name))
    }

    /// Names of all declared functions
    pub fn function_names(&self) -> Vec<&str> {
        self.functions
            .iter()
            .filter_map(|f| f.get("name").and_then(Value::as_str))
            .collect()
    }

    pub fn action(&self, function_name: &str) -> Option<&ActionSpec> {
        self.actions.get(function_name)
    }

    pub fn stream(&self) -> bool {
        self.stream
    }

    pub fn num_completions(&self) -> u32 {
        self.num_completions.unwrap_or(1)
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn notebook(&self) -> bool {
        self.notebook
    }

    /// Look up any key, typed fields first
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "title" => Some(Value::String(self.title.clone())),
            "description" => self.description.clone().map(Value::String),
            "about" => self.about.clone().map(Value::String),
            "prompt" => self.prompt.as_ref().map(|p| Value::String(p.joined())),
            "temperature" => Some(Value::from(self.temperature())),
            "stream" => Some(Value::Bool(self.stream)),
            "notebook" => Some(Value::Bool(self.notebook)),
            "model" => self.model.clone().map(Value::String),
            "sample" => self.sample.clone().map(Value::String),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// System prompt rendered against the session memory
    pub fn system_prompt(&self, memory: &Map<String, Value>) -> Option<String> {
        let prompt = self.prompt.as_ref()?.joined();
        if !prompt.contains("{{") {
            return Some(prompt);
        }

        let context = Context::from_serialize(memory).unwrap_or_default();
        match Tera::one_off(&prompt, &context, false) {
            Ok(rendered) => Some(rendered),
            Err(e) => {
                tracing::warn!("Failed to render manifest prompt: {}", e);
                Some(prompt)
            }
        }
    }

    /// Pick one intro message at random
    pub fn pick_intro(&self) -> Option<String> {
        self.intro.choose(&mut rand::thread_rng()).cloned()
    }
}
