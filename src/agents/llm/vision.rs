//! OpenAI vision engine
//!
//! Vision models take the image as a structured content part, so the URL is
//! lifted out of the latest user message before the request is sent.

use async_trait::async_trait;
use serde_json::json;

use super::{normalize, Completion, LlmEngine, OpenAiEngine};
use crate::agents::config::ModelConfig;
use crate::agents::domain::{ContentPart, ImageUrl, Manifest, Message, MessageContent, Role};
use crate::agents::error::{LlmError, LlmResult};
use crate::config::Credentials;

/// Output cap sent with vision requests, which otherwise default very low
pub const VISION_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Find the first `http://` or `https://` URL in `text`
///
/// Returns the URL (up to the next whitespace) and the text with the URL
/// removed.
pub fn extract_image_url(text: &str) -> Option<(String, String)> {
    let start = ["https://", "http://"]
        .iter()
        .filter_map(|scheme| text.find(scheme))
        .min()?;
    let end = text[start..]
        .find(char::is_whitespace)
        .map(|offset| start + offset)
        .unwrap_or(text.len());

    let url = text[start..end].to_string();
    let remaining = format!("{}{}", &text[..start], &text[end..]).trim().to_string();
    Some((url, remaining))
}

/// OpenAI vision engine (`openai-vision`)
pub struct OpenAiVisionEngine {
    inner: OpenAiEngine,
}

impl OpenAiVisionEngine {
    pub fn new(config: &ModelConfig, credentials: &Credentials) -> LlmResult<Self> {
        Ok(Self {
            inner: OpenAiEngine::new(config, credentials)?,
        })
    }

    /// Reshape the latest user message into text and image parts
    fn prepare_messages(messages: &[Message]) -> LlmResult<Vec<Message>> {
        let mut prepared = messages.to_vec();
        let last_user = prepared
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or_else(|| LlmError::InvalidRequest("No user message to take an image from".to_string()))?;

        let text = last_user.content.as_text().into_owned();
        let (url, remaining) = extract_image_url(&text)
            .ok_or_else(|| LlmError::InvalidRequest("No image URL found in the user message".to_string()))?;

        last_user.content = MessageContent::Parts(vec![
            ContentPart::Text { text: remaining },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            },
        ]);

        Ok(prepared)
    }
}

#[async_trait]
impl LlmEngine for OpenAiVisionEngine {
    fn name(&self) -> &str {
        "openai-vision"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, messages: &[Message], manifest: &Manifest, verbose: bool) -> LlmResult<Completion> {
        let prepared = Self::prepare_messages(messages)?;

        let mut body = self.inner.build_request_body(&prepared, manifest, false, false);
        body["max_tokens"] = json!(VISION_MAX_OUTPUT_TOKENS);

        let response = self.inner.send(&body).await?;
        if verbose {
            tracing::info!(model = ?response.model, usage = ?response.usage, "OpenAI vision response");
        }

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);

        // Functions are never sent to vision models; calls only come back as text
        Ok(normalize(messages, manifest, text, None))
    }

    fn is_within_budget(&self, text: &str) -> bool {
        self.inner.is_within_budget(text)
    }
}
