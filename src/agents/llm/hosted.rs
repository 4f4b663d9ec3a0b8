//! Engine for self-managed inference endpoints
//!
//! Hosted endpoints speak the KServe v2 inference protocol: the conversation is
//! flattened into one prompt string, and the answer comes back as a JSON
//! document encoded inside the first output tensor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{normalize, resolve_api_key, Completion, LlmEngine};
use crate::agents::config::{ModelConfig, DEFAULT_MAX_TOKEN};
use crate::agents::domain::{Manifest, Message, Role};
use crate::agents::error::{LlmError, LlmResult};
use crate::agents::token::{TokenBudget, WordTokenizer};
use crate::config::Credentials;

const DEFAULT_HEADER: &str = "Authorization";

/// Flatten a conversation into a llama2 style prompt
///
/// The system prompt goes into the first instruction block. When the
/// manifest declares functions, the prompt lists them and asks for a call
/// written as `name(arguments)` so the extractor can recover it.
pub fn message_to_prompt(messages: &[Message], manifest: &Manifest) -> String {
    let mut system = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_text().into_owned())
        .collect::<Vec<_>>()
        .join("\n");

    let names = manifest.function_names();
    if !names.is_empty() {
        if !system.is_empty() {
            system.push('\n');
        }
        system.push_str(&format!(
            "You may call one of these functions by answering with name(arguments): {}",
            names.join(", ")
        ));
    }

    let mut prompt = String::new();
    let mut pending_system = (!system.is_empty()).then_some(system);

    for message in messages.iter().filter(|m| m.role != Role::System) {
        let text = message.content.as_text();
        match message.role {
            Role::User | Role::Function => {
                let body = match &message.name {
                    Some(name) if message.role == Role::Function => format!("{} returned: {}", name, text),
                    _ => text.into_owned(),
                };
                match pending_system.take() {
                    Some(system) => prompt.push_str(&format!("[INST] <<SYS>>\n{}\n<</SYS>>\n\n{} [/INST]", system, body)),
                    None => prompt.push_str(&format!("[INST] {} [/INST]", body)),
                }
            }
            Role::Assistant => prompt.push_str(&format!(" {} ", text)),
            Role::System => {}
        }
    }

    prompt
}

/// Hosted inference engine (`hosted`)
pub struct HostedEngine {
    client: reqwest::Client,
    url: String,
    header_name: String,
    api_key: Option<String>,
    config: ModelConfig,
}

impl HostedEngine {
    pub fn new(config: &ModelConfig, credentials: &Credentials) -> LlmResult<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| LlmError::InvalidRequest(format!("Model {} has no url", config.name)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            header_name: config
                .header_api_key
                .clone()
                .unwrap_or_else(|| DEFAULT_HEADER.to_string()),
            api_key: resolve_api_key(config, credentials)?,
            config: config.clone(),
        })
    }

    fn request_body(prompt: &str) -> Value {
        json!({
            "inputs": [{
                "name": "input-0",
                "data": [prompt],
                "datatype": "BYTES",
                "shape": [-1],
            }]
        })
    }
}

/// Pull the answer text out of a KServe response
///
/// `outputs[0].data[0]` is itself a JSON string whose `message` holds the
/// answer, either as one string or as a list of pieces.
fn decode_response(response: InferenceResponse) -> LlmResult<String> {
    let encoded = response
        .outputs
        .into_iter()
        .next()
        .and_then(|output| output.data.into_iter().next())
        .ok_or_else(|| LlmError::Parse("Response has no output data".to_string()))?;

    let inner: Value = match encoded {
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|e| LlmError::Parse(format!("Output data is not JSON: {}", e)))?,
        other => other,
    };

    Ok(match inner.get("message") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(pieces)) => pieces.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    })
}

#[async_trait]
impl LlmEngine for HostedEngine {
    fn name(&self) -> &str {
        "hosted"
    }

    fn model(&self) -> &str {
        &self.config.model_name
    }

    async fn complete(&self, messages: &[Message], manifest: &Manifest, verbose: bool) -> LlmResult<Completion> {
        let prompt = message_to_prompt(messages, manifest);
        if verbose {
            tracing::debug!(url = %self.url, "Calling hosted model");
        }

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(&prompt));
        if let Some(key) = &self.api_key {
            request = request.header(self.header_name.as_str(), key.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))?;
        let text = decode_response(body)?;
        if verbose {
            tracing::debug!(length = text.len(), "Hosted model answered");
        }

        // Hosted models never call functions natively
        Ok(normalize(messages, manifest, Some(text), None))
    }

    fn is_within_budget(&self, text: &str) -> bool {
        let max_token = self.config.max_token.unwrap_or(DEFAULT_MAX_TOKEN) as usize;
        TokenBudget::new(max_token).is_within_budget(&WordTokenizer, text)
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    outputs: Vec<InferenceOutput>,
}

#[derive(Debug, Deserialize)]
struct InferenceOutput {
    #[serde(default)]
    data: Vec<Value>,
}
