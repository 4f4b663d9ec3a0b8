//! Deterministic offline engine
//!
//! Answers with the text of the latest user message. Useful for trying
//! manifests and function extraction without a provider account.

use async_trait::async_trait;

use super::{normalize, Completion, CompletionStream, FinishReason, LlmEngine, StreamChunk};
use crate::agents::config::{ModelConfig, DEFAULT_MAX_TOKEN};
use crate::agents::domain::{Manifest, Message, Role};
use crate::agents::error::LlmResult;
use crate::agents::token::{TokenBudget, WordTokenizer};
use crate::config::Credentials;

/// Echo engine (`echo`)
pub struct EchoEngine {
    config: ModelConfig,
}

impl EchoEngine {
    pub fn new(config: &ModelConfig, _credentials: &Credentials) -> LlmResult<Self> {
        Ok(Self { config: config.clone() })
    }

    fn reply(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_text().into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmEngine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        &self.config.model_name
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(&self, messages: &[Message], manifest: &Manifest, _verbose: bool) -> LlmResult<Completion> {
        Ok(normalize(messages, manifest, Some(Self::reply(messages)), None))
    }

    fn complete_stream(&self, messages: &[Message], _manifest: &Manifest, _verbose: bool) -> LlmResult<CompletionStream> {
        let reply = Self::reply(messages);
        let (sender, stream) = CompletionStream::channel(16);

        tokio::spawn(async move {
            for fragment in reply.split_inclusive(' ') {
                if sender.send(StreamChunk::text(fragment)).await.is_err() {
                    return;
                }
            }
            let _ = sender.send_finish(FinishReason::Stop).await;
        });

        Ok(stream)
    }

    fn is_within_budget(&self, text: &str) -> bool {
        let max_token = self.config.max_token.unwrap_or(DEFAULT_MAX_TOKEN) as usize;
        TokenBudget::new(max_token).is_within_budget(&WordTokenizer, text)
    }
}
