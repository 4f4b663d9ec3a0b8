//! Domain types for the chat orchestration layer
//!
//! Messages, manifests, function calls and the events a session emits.

mod event;
mod function_call;
mod manifest;
mod message;

pub use event::*;
pub use function_call::*;
pub use manifest::*;
pub use message::*;
