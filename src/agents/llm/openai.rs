//! OpenAI chat completions engine with function calling and streaming

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{
    normalize, resolve_api_key, Completion, CompletionStream, CompletionStreamSender, FinishReason,
    LlmEngine, StreamChunk,
};
use crate::agents::config::{ModelConfig, DEFAULT_MAX_TOKEN};
use crate::agents::domain::{FunctionCall, FunctionCallDelta, Manifest, Message};
use crate::agents::error::{LlmError, LlmResult};
use crate::agents::token::{TiktokenTokenizer, TokenBudget, Tokenizer};
use crate::config::Credentials;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completions engine (`openai-gpt`)
pub struct OpenAiEngine {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    config: ModelConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl OpenAiEngine {
    /// Create the engine; a missing API key is fatal
    pub fn new(config: &ModelConfig, credentials: &Credentials) -> LlmResult<Self> {
        let api_key = resolve_api_key(config, credentials)?
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                LlmError::MissingCredential(config.api_key.clone().unwrap_or_else(|| "OPENAI_API_KEY".to_string()))
            })?;

        let base_url = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let tokenizer = TiktokenTokenizer::for_model(&config.model_name)
            .map_err(|e| LlmError::InvalidRequest(format!("Failed to load tokenizer: {}", e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            config: config.clone(),
            tokenizer: Arc::new(tokenizer),
        })
    }

    /// Replace the tokenizer used for budget checks
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Build the request body from the messages and manifest
    pub(super) fn build_request_body(
        &self,
        messages: &[Message],
        manifest: &Manifest,
        with_functions: bool,
        stream: bool,
    ) -> Value {
        let mut body = json!({
            "model": self.config.model_name,
            "messages": messages,
            "temperature": manifest.temperature(),
            "n": manifest.num_completions(),
        });

        if with_functions {
            if let Some(functions) = manifest.functions() {
                body["functions"] = json!(functions);
            }
        }

        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    /// POST a request body and decode the response
    pub(super) async fn send(&self, body: &Value) -> LlmResult<OpenAiResponse> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))
    }

    async fn stream_completion(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        body: Value,
        sender: CompletionStreamSender,
    ) -> LlmResult<()> {
        let response = client
            .post(format!("{}/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| LlmError::Streaming(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);

                let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if data == "[DONE]" {
                    return Ok(());
                }

                let Ok(parsed) = serde_json::from_str::<OpenAiStreamResponse>(data) else {
                    tracing::warn!("Skipping malformed stream event: {}", data);
                    continue;
                };
                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };

                let mut out = StreamChunk::text(choice.delta.content.unwrap_or_default());
                if let Some(function_call) = choice.delta.function_call {
                    let mut delta = FunctionCallDelta::default();
                    delta.name = function_call.name;
                    delta.arguments = function_call.arguments;
                    out.function_call = Some(delta);
                }
                out.finish_reason = choice.finish_reason.as_deref().map(FinishReason::from_wire);

                if sender.send(out).await.is_err() {
                    return Ok(()); // Receiver dropped
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl LlmEngine for OpenAiEngine {
    fn name(&self) -> &str {
        "openai-gpt"
    }

    fn model(&self) -> &str {
        &self.config.model_name
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(&self, messages: &[Message], manifest: &Manifest, verbose: bool) -> LlmResult<Completion> {
        let body = self.build_request_body(messages, manifest, true, false);
        let response = self.send(&body).await?;

        if verbose {
            tracing::info!(model = ?response.model, usage = ?response.usage, "OpenAI response");
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?;

        let native_call = if manifest.functions().is_some() {
            choice
                .message
                .function_call
                .map(|fc| FunctionCall::from_wire(fc.name, &fc.arguments))
        } else {
            None
        };

        Ok(normalize(messages, manifest, choice.message.content, native_call))
    }

    fn complete_stream(&self, messages: &[Message], manifest: &Manifest, _verbose: bool) -> LlmResult<CompletionStream> {
        let (sender, stream) = CompletionStream::channel(64);

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let body = self.build_request_body(messages, manifest, true, true);

        tokio::spawn(async move {
            let result = Self::stream_completion(client, api_key, base_url, body, sender.clone()).await;
            if let Err(e) = result {
                let _ = sender.send_error(e).await;
            }
        });

        Ok(stream)
    }

    fn is_within_budget(&self, text: &str) -> bool {
        let max_token = self.config.max_token.unwrap_or(DEFAULT_MAX_TOKEN) as usize;
        TokenBudget::new(max_token).is_within_budget(self.tokenizer.as_ref(), text)
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiChoice {
    pub message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiMessage {
    pub content: Option<String>,
    pub function_call: Option<OpenAiFunctionCall>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    function_call: Option<OpenAiStreamFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunctionCall {
    name: Option<String>,
    arguments: Option<String>,
}
