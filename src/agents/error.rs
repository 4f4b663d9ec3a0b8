//! Error types for the chat orchestration layer

use thiserror::Error;

/// Errors that can occur while running sessions and applications
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration error (unknown engine, missing credential, bad settings)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// LLM engine error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// A function call failed validation against the manifest
    #[error("Invalid function call '{name}': {reason}")]
    InvalidFunctionCall { name: String, reason: String },

    /// History persistence error
    #[error("History error: {0}")]
    History(String),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    /// Call loop did not settle
    #[error("Max iterations ({0}) reached without completion")]
    MaxIterations(u32),

    /// Cancelled between stream fragments
    #[error("Operation was cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors specific to LLM engine operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// No constructor registered for the engine name
    #[error("Unknown LLM engine: {0}")]
    UnknownEngine(String),

    /// Required credential absent from the configured credentials
    #[error("Missing credential: {0} is not set")]
    MissingCredential(String),

    /// Non-success response from the provider
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Malformed response body
    #[error("Parse error: {0}")]
    Parse(String),

    /// The request could not be built from the messages/manifest
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The engine does not support the requested mode
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

impl From<tera::Error> for AgentError {
    fn from(err: tera::Error) -> Self {
        AgentError::Template(err.to_string())
    }
}

/// Result type alias for session/application operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
