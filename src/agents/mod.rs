//! Chat orchestration core
//!
//! Routes a conversation through one of several LLM engines and lets agents
//! hand the conversation to each other.
//!
//! ## Architecture
//!
//! - `domain/` - Core types (Message, Manifest, FunctionCall, ChatEvent)
//! - `llm/` - Engine implementations, registry and streaming
//! - `extract` - Recovery of function calls written as text
//! - `token/` - Token counting and budgets
//! - `model` - A model configuration bound to its engine
//! - `session` - One agent activation and its call loop
//! - `application` - Session ownership and switching
//! - `memory/` - Transcript storage backends

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod llm;
pub mod memory;
pub mod model;
pub mod runtime;
pub mod session;
pub mod token;

// Re-export commonly used types
pub use application::{ChatApplication, EventCallback};
pub use config::*;
pub use domain::*;
pub use error::*;
pub use model::{LlmModel, ModelResponse};
pub use runtime::FunctionRuntime;
pub use session::{ChatContext, ChatSession, SessionOptions, MAX_LOOP_ITERATIONS};
