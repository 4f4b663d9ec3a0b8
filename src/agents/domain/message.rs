//! Message and transcript types

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions to the LLM)
    System,
    /// User message
    User,
    /// Assistant (LLM) message
    Assistant,
    /// Result of a function call
    Function,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Function => write!(f, "function"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "function" => Ok(Role::Function),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// One part of a structured message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text { text: String },
    /// Image reference
    ImageUrl { image_url: ImageUrl },
}

/// Image URL wrapper, as the vision wire format nests it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Message body: plain text or a list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Text view of the content; text parts are joined, images skipped
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            MessageContent::Text(text) => Cow::Borrowed(text),
            MessageContent::Parts(parts) => Cow::Owned(
                parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::ImageUrl { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Message content
    pub content: MessageContent,
    /// Function name for function result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a function result message
    pub fn function(name: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Function,
            content: content.into(),
            name: Some(name.into()),
        }
    }

    /// Text view of the content
    pub fn text(&self) -> Cow<'_, str> {
        self.content.as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_content_serializes_as_string() {
        let message = Message::user("hello");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({ "role": "user", "content": "hello" }));
    }

    #[test]
    fn test_parts_round_trip_and_text_view() {
        let value = json!({
            "role": "user",
            "content": [
                { "type": "text", "text": "what is this?" },
                { "type": "image_url", "image_url": { "url": "https://x.test/cat.png" } }
            ]
        });
        let message: Message = serde_json::from_value(value.clone()).unwrap();
        assert!(matches!(message.content, MessageContent::Parts(ref p) if p.len() == 2));
        assert_eq!(message.text(), "what is this?");
        assert_eq!(serde_json::to_value(&message).unwrap(), value);
    }

    #[test]
    fn test_function_message_carries_name() {
        let message = Message::function("lookup", "{\"temp\": 20}");
        assert_eq!(message.role, Role::Function);
        assert_eq!(message.name.as_deref(), Some("lookup"));
        assert_eq!("function".parse::<Role>().unwrap(), Role::Function);
    }
}
