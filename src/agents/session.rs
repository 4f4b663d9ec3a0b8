//! Chat session: one agent activation and its call loop
//!
//! A session owns the transcript, the manifest, the model and the short-term
//! memory of one agent. It never switches itself: a function whose action
//! asks for another agent is reported as an `emit` event, and the owning
//! application performs the switch.

use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::domain::{ActionSpec, ChatEvent, FunctionCall, FunctionCallAccumulator, Manifest, Message, Role};
use super::error::{AgentError, AgentResult};
use super::extract::extract_function_call;
use super::llm::{CancelHandle, CompletionStream};
use super::memory::HistoryStore;
use super::model::{LlmModel, ModelResponse};
use super::runtime::FunctionRuntime;

/// Upper bound on model calls in one `call_loop`
pub const MAX_LOOP_ITERATIONS: u32 = 10;

/// Transcript and short-term memory of a session
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    messages: Vec<Message>,
    memory: Map<String, Value>,
}

impl ChatContext {
    pub fn new(memory: Map<String, Value>) -> Self {
        Self {
            messages: Vec::new(),
            memory,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn memory(&self) -> &Map<String, Value> {
        &self.memory
    }

    /// Replace the memory, or merge into it when `merge` is set
    pub fn set_memory(&mut self, memory: Map<String, Value>, merge: bool) {
        if merge {
            self.memory.extend(memory);
        } else {
            self.memory = memory;
        }
    }
}

/// Construction options for [`ChatSession`]
#[derive(Default, Clone)]
pub struct SessionOptions {
    /// Initial short-term memory
    pub memory: Option<Map<String, Value>>,
    /// Pick an intro message from the manifest
    pub intro: bool,
    /// Store each appended message here
    pub history: Option<Arc<dyn HistoryStore>>,
    /// Shared cancellation flag; a fresh one when unset
    pub cancel: Option<CancelHandle>,
}

/// What to do after a function call was applied
enum Step {
    Done,
    Continue,
}

/// Live conversation state of one agent
pub struct ChatSession {
    agent_name: Option<String>,
    manifest: Arc<Manifest>,
    model: Arc<LlmModel>,
    context: ChatContext,
    intro_message: Option<String>,
    session_id: String,
    history: Option<Arc<dyn HistoryStore>>,
    cancel: CancelHandle,
}

impl ChatSession {
    /// Start a session for `agent_name` (or the default session for `None`)
    pub fn new(
        agent_name: Option<&str>,
        manifest: Arc<Manifest>,
        model: Arc<LlmModel>,
        options: SessionOptions,
    ) -> Self {
        let context = ChatContext::new(options.memory.unwrap_or_default());
        let mut session = Self {
            agent_name: agent_name.map(str::to_string),
            manifest,
            model,
            context,
            intro_message: None,
            session_id: Uuid::new_v4().to_string(),
            history: options.history,
            cancel: options.cancel.unwrap_or_default(),
        };

        if let Some(prompt) = session.manifest.system_prompt(session.context.memory()) {
            session.context.messages.push(Message::system(prompt));
        }

        if options.intro {
            if let Some(intro) = session.manifest.pick_intro() {
                session.context.messages.push(Message::assistant(intro.as_str()));
                session.intro_message = Some(intro);
            }
        }

        session
    }

    pub fn agent_name(&self) -> Option<&str> {
        self.agent_name.as_deref()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn model(&self) -> &Arc<LlmModel> {
        &self.model
    }

    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    pub fn messages(&self) -> &[Message] {
        self.context.messages()
    }

    pub fn memory(&self) -> &Map<String, Value> {
        self.context.memory()
    }

    pub fn set_memory(&mut self, memory: Map<String, Value>, merge: bool) {
        self.context.set_memory(memory, merge);
    }

    /// Manifest title, or the agent name when the manifest has none
    pub fn title(&self) -> &str {
        if self.manifest.title.is_empty() {
            self.agent_name.as_deref().unwrap_or_default()
        } else {
            &self.manifest.title
        }
    }

    pub fn temperature(&self) -> f32 {
        self.manifest.temperature()
    }

    pub fn intro_message(&self) -> Option<&str> {
        self.intro_message.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Handle for cancelling a streamed response from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Append a message to the transcript and the history store
    pub async fn append_message(&mut self, message: Message) {
        if let Some(history) = &self.history {
            if let Err(e) = history.append(&self.session_id, self.agent_name.as_deref(), &message).await {
                tracing::warn!(session_id = %self.session_id, "Failed to store message: {}", e);
            }
        }
        self.context.messages.push(message);
    }

    /// Append a user message
    pub async fn append_user_question(&mut self, text: impl Into<String>) {
        self.append_message(Message::user(text.into())).await;
    }

    /// Run the model until the conversation is idle again
    ///
    /// Events are delivered to `events` in the order they are produced.
    /// Errors are not handled here; they propagate to the caller.
    pub async fn call_loop(
        &mut self,
        events: &mut (dyn FnMut(ChatEvent) + Send),
        verbose: bool,
        runtime: Option<&dyn FunctionRuntime>,
    ) -> AgentResult<()> {
        for iteration in 0..MAX_LOOP_ITERATIONS {
            self.trim_history();
            if verbose {
                tracing::debug!(iteration, messages = self.context.messages.len(), "Calling model");
            }

            let response = self
                .model
                .generate_response(self.context.messages(), &self.manifest, verbose)
                .await?;

            let call = match response {
                ModelResponse::Complete(completion) => {
                    if let Some(failure) = completion.failure {
                        events(ChatEvent::error(failure));
                        return Ok(());
                    }
                    if let Some(text) = completion.text.filter(|t| !t.is_empty()) {
                        self.append_message(Message::assistant(text.as_str())).await;
                        events(ChatEvent::bot(text));
                    }
                    completion.function_call
                }
                ModelResponse::Stream(stream) => self.consume_stream(stream, events).await?,
            };

            let Some(call) = call else {
                return Ok(());
            };

            match self.apply_function_call(call, events, runtime).await? {
                Step::Done => return Ok(()),
                Step::Continue => continue,
            }
        }

        Err(AgentError::MaxIterations(MAX_LOOP_ITERATIONS))
    }

    /// Forward fragments as partial bot events and assemble the result
    async fn consume_stream(
        &mut self,
        mut stream: CompletionStream,
        events: &mut (dyn FnMut(ChatEvent) + Send),
    ) -> AgentResult<Option<FunctionCall>> {
        let mut text = String::new();
        let mut accumulator = FunctionCallAccumulator::new();

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(session_id = %self.session_id, "Stream cancelled");
                self.cancel.reset();
                if !text.is_empty() {
                    self.append_message(Message::assistant(text)).await;
                }
                return Err(AgentError::Cancelled);
            }

            let Some(next) = stream.next_chunk().await else {
                break;
            };

            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!(model = self.model.name(), "Stream failed: {}", e);
                    if !text.is_empty() {
                        self.append_message(Message::assistant(text)).await;
                    }
                    events(ChatEvent::error(e.to_string()));
                    return Ok(None);
                }
            };

            if chunk.has_content() {
                text.push_str(&chunk.content);
                events(ChatEvent::bot_partial(chunk.content));
            }
            if let Some(delta) = &chunk.function_call {
                accumulator.apply_delta(delta);
            }
        }

        let call = if self.manifest.functions().is_none() {
            None
        } else {
            accumulator
                .build()
                .or_else(|| extract_function_call(self.context.messages.last(), &self.manifest, &text))
        };

        if call.is_none() && !text.is_empty() {
            self.append_message(Message::assistant(text)).await;
        }

        Ok(call)
    }

    /// Validate a call and carry out its action
    async fn apply_function_call(
        &mut self,
        call: FunctionCall,
        events: &mut (dyn FnMut(ChatEvent) + Send),
        runtime: Option<&dyn FunctionRuntime>,
    ) -> AgentResult<Step> {
        if let Err(e) = call.validate(&self.manifest) {
            tracing::warn!(function = %call.name, "Rejected function call: {}", e);
            events(ChatEvent::error(e.to_string()));
            return Ok(Step::Done);
        }

        let action = self.manifest.action(&call.name).cloned();
        match action {
            Some(ActionSpec::Template { message }) => {
                let rendered = ActionSpec::render_message(&message, &call.arguments)?;
                self.append_message(Message::function(call.name.as_str(), rendered.as_str()))
                    .await;
                events(ChatEvent::function(call.name, rendered));
                Ok(Step::Done)
            }
            Some(ActionSpec::Emit { emit_method, emit_data }) => {
                let emitted = ActionSpec::build_emit(&emit_method, &emit_data, &call.arguments)?;
                let record = serde_json::to_string(&emitted)?;
                self.append_message(Message::function(call.name.as_str(), record)).await;
                events(ChatEvent::emit(emitted));
                Ok(Step::Done)
            }
            None => {
                let Some(runtime) = runtime else {
                    events(ChatEvent::error(format!("No runtime to execute function {}", call.name)));
                    return Ok(Step::Done);
                };

                let result = runtime.call_function(&call.name, &call.arguments).await?;
                let result = match result {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                self.append_message(Message::function(call.name.as_str(), result.as_str()))
                    .await;
                events(ChatEvent::function(call.name, result));
                Ok(Step::Continue)
            }
        }
    }

    /// Drop the oldest turns until the transcript fits the model budget
    ///
    /// System messages and the latest message are always kept.
    fn trim_history(&mut self) {
        if !self.model.has_engine() {
            return;
        }

        loop {
            let joined = self
                .context
                .messages
                .iter()
                .map(|m| m.content.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            if self.model.is_within_budget(&joined) {
                return;
            }

            let last = self.context.messages.len().saturating_sub(1);
            let Some(index) = self
                .context
                .messages
                .iter()
                .position(|m| m.role != Role::System)
                .filter(|&i| i < last)
            else {
                return;
            };

            self.context.messages.remove(index);
            tracing::debug!(session_id = %self.session_id, "Dropped oldest message to fit the token budget");
        }
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("agent_name", &self.agent_name)
            .field("session_id", &self.session_id)
            .field("messages", &self.context.messages.len())
            .finish()
    }
}
