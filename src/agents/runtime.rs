//! Function runtime interface
//!
//! Executes functions that carry no declarative action, and creates the
//! sandboxed notebook some manifests ask for. Implementations live outside
//! the core; the session only calls through this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::error::AgentResult;

#[async_trait]
pub trait FunctionRuntime: Send + Sync {
    /// Run a function and return its result
    async fn call_function(&self, name: &str, arguments: &Value) -> AgentResult<Value>;

    /// Create a notebook for `model_name`
    ///
    /// The returned value describes the notebook; its `notebook_name` key, when
    /// present, is shown to the user.
    async fn create_notebook(&self, model_name: &str) -> AgentResult<Value>;
}
