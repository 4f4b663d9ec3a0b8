//! # Switchboard - multi-agent chat orchestration
//!
//! Switchboard routes a conversation through one of several LLM engines and
//! lets agents hand the conversation to each other.
//!
//! ## Features
//!
//! - **Engines**: OpenAI chat, OpenAI vision, hosted KServe endpoints, Ollama, offline echo
//! - **Function calls**: native or recovered from plain text, validated against JSON schema
//! - **Streaming**: fragments delivered in order, cancellable between fragments
//! - **Agent handoff**: a function can switch the conversation to another agent
//! - **Manifests**: agents declared in `switchboard.toml` or `manifests/*.{json,yaml,toml}`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchboard::agents::ChatApplication;
//! use switchboard::config::{Credentials, Settings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new()?;
//!     let credentials = Credentials::from_env(settings.credential_names());
//!
//!     let mut app = ChatApplication::new(settings, credentials)?
//!         .with_callback(|agent, event| println!("{:?}: {:?}", agent, event));
//!     app.ask("Hello!").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **agents**: engines, sessions and the application that owns them
//! - **config**: settings, manifests and credentials
//! - **cli**: command line arguments and prompt commands

pub mod agents;
pub mod cli;
pub mod config;
