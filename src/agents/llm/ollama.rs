//! Ollama engine with streaming support (for local models)

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{normalize, Completion, CompletionStream, CompletionStreamSender, FinishReason, LlmEngine, StreamChunk};
use crate::agents::config::{ModelConfig, DEFAULT_MAX_TOKEN};
use crate::agents::domain::{Manifest, Message};
use crate::agents::error::{LlmError, LlmResult};
use crate::agents::token::{TokenBudget, WordTokenizer};
use crate::config::Credentials;

/// Ollama engine (`ollama`)
pub struct OllamaEngine {
    client: reqwest::Client,
    base_url: String,
    config: ModelConfig,
}

impl OllamaEngine {
    /// Create the engine; Ollama needs no credential
    pub fn new(config: &ModelConfig, _credentials: &Credentials) -> LlmResult<Self> {
        let base_url = config
            .api_base
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            config: config.clone(),
        })
    }

    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                json!({
                    "role": m.role.to_string(),
                    "content": m.content.as_text(),
                })
            })
            .collect()
    }

    fn request_body(&self, messages: &[Message], manifest: &Manifest, stream: bool) -> Value {
        json!({
            "model": self.config.model_name,
            "messages": Self::convert_messages(messages),
            "stream": stream,
            "options": {
                "temperature": manifest.temperature(),
            }
        })
    }

    async fn stream_completion(
        client: reqwest::Client,
        base_url: String,
        body: Value,
        sender: CompletionStreamSender,
    ) -> LlmResult<()> {
        let response = client
            .post(format!("{}/api/chat", base_url))
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

            // Ollama streams NDJSON (one JSON object per line)
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);

                if line.is_empty() {
                    continue;
                }

                if let Ok(stream_response) = serde_json::from_str::<OllamaStreamResponse>(&line) {
                    if let Some(content) = stream_response.message.and_then(|m| m.content) {
                        if !content.is_empty() && sender.send(StreamChunk::text(content)).await.is_err() {
                            return Ok(());
                        }
                    }

                    if stream_response.done {
                        let _ = sender.send_finish(FinishReason::Stop).await;
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl LlmEngine for OllamaEngine {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model_name
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(&self, messages: &[Message], manifest: &Manifest, verbose: bool) -> LlmResult<Completion> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.request_body(messages, manifest, false))
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

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))?;

        if verbose {
            tracing::info!(
                prompt_tokens = ollama_response.prompt_eval_count.unwrap_or(0),
                completion_tokens = ollama_response.eval_count.unwrap_or(0),
                "Ollama response"
            );
        }

        Ok(normalize(messages, manifest, Some(ollama_response.message.content), None))
    }

    fn complete_stream(&self, messages: &[Message], manifest: &Manifest, _verbose: bool) -> LlmResult<CompletionStream> {
        let (sender, stream) = CompletionStream::channel(64);

        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let body = self.request_body(messages, manifest, true);

        tokio::spawn(async move {
            let result = Self::stream_completion(client, base_url, body, sender.clone()).await;
            if let Err(e) = result {
                let _ = sender.send_error(e).await;
            }
        });

        Ok(stream)
    }

    fn is_within_budget(&self, text: &str) -> bool {
        let max_token = self.config.max_token.unwrap_or(DEFAULT_MAX_TOKEN) as usize;
        TokenBudget::new(max_token).is_within_budget(&WordTokenizer, text)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamResponse {
    message: Option<OllamaStreamMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamMessage {
    content: Option<String>,
}
