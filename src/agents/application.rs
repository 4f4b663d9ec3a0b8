//! Chat application: owns the active session and switches between agents
//!
//! Exactly one session is active at a time. Switching replaces it wholesale;
//! memory is carried forward only when an emitted action asks for it.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::domain::{ChatEvent, EmitAction, Manifest};
use super::error::{AgentError, AgentResult};
use super::llm::{CancelHandle, EngineRegistry};
use super::memory::{create_store, HistoryStore};
use super::model::LlmModel;
use super::runtime::FunctionRuntime;
use super::session::{ChatSession, SessionOptions, MAX_LOOP_ITERATIONS};
use crate::config::{Credentials, Settings};

/// Sink for every event, called with the active agent name
pub type EventCallback = Box<dyn FnMut(Option<&str>, &ChatEvent) + Send>;

pub struct ChatApplication {
    settings: Settings,
    registry: EngineRegistry,
    credentials: Credentials,
    default_model: Arc<LlmModel>,
    models: HashMap<String, Arc<LlmModel>>,
    manifests: HashMap<String, Arc<Manifest>>,
    runtime: Option<Arc<dyn FunctionRuntime>>,
    history: Option<Arc<dyn HistoryStore>>,
    callback: EventCallback,
    cancel: CancelHandle,
    session: ChatSession,
}

impl ChatApplication {
    /// Create the application with the built-in engines
    pub fn new(settings: Settings, credentials: Credentials) -> AgentResult<Self> {
        Self::with_registry(settings, EngineRegistry::default(), credentials)
    }

    /// Create the application with a custom engine registry
    ///
    /// Fails when the default model cannot be built, e.g. because its
    /// credential is missing.
    pub fn with_registry(settings: Settings, registry: EngineRegistry, credentials: Credentials) -> AgentResult<Self> {
        let default_config = settings.default_model_config();
        let default_model = Arc::new(LlmModel::new(default_config.clone(), &registry, &credentials)?);

        let mut models = HashMap::new();
        models.insert(default_config.name.clone(), default_model.clone());

        let manifests = settings
            .manifests
            .iter()
            .map(|(name, manifest)| (name.clone(), Arc::new(manifest.clone())))
            .collect();

        let history = match &settings.history_dir {
            Some(dir) => Some(create_store(Some(dir))?),
            None => None,
        };

        let cancel = CancelHandle::new();
        let session = ChatSession::new(
            None,
            Arc::new(Manifest::default()),
            default_model.clone(),
            SessionOptions {
                history: history.clone(),
                cancel: Some(cancel.clone()),
                ..Default::default()
            },
        );

        Ok(Self {
            settings,
            registry,
            credentials,
            default_model,
            models,
            manifests,
            runtime: None,
            history,
            callback: Box::new(|_, _| {}),
            cancel,
            session,
        })
    }

    /// Set the event sink
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(Option<&str>, &ChatEvent) + Send + 'static,
    {
        self.callback = Box::new(callback);
        self
    }

    /// Set the function runtime
    pub fn with_runtime(mut self, runtime: Arc<dyn FunctionRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set the history store used by new sessions
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ChatSession {
        &mut self.session
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn verbose(&self) -> bool {
        self.settings.verbose
    }

    /// Names of the configured agents, sorted
    pub fn agent_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.manifests.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.manifests.contains_key(name)
    }

    /// Cancellation flag shared by every session this application starts
    ///
    /// Cleared when [`ChatApplication::process_llm`] starts, so a handle taken
    /// before [`ChatApplication::ask`] also stops sessions reached by handoff.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn emit(&mut self, event: ChatEvent) {
        (self.callback)(self.session.agent_name(), &event);
    }

    fn default_session(&self, memory: Option<Map<String, Value>>, history: Option<Arc<dyn HistoryStore>>) -> ChatSession {
        ChatSession::new(
            None,
            Arc::new(Manifest::default()),
            self.default_model.clone(),
            SessionOptions {
                memory,
                intro: false,
                history,
                cancel: Some(self.cancel.clone()),
            },
        )
    }

    /// Model a manifest asks for, built on first use
    fn model_for(&mut self, manifest: &Manifest) -> AgentResult<Arc<LlmModel>> {
        let Some(name) = manifest.model() else {
            return Ok(self.default_model.clone());
        };
        if let Some(model) = self.models.get(name) {
            return Ok(model.clone());
        }

        let config = self
            .settings
            .model_config(name)
            .cloned()
            .ok_or_else(|| AgentError::Configuration(format!("Unknown model: {}", name)))?;
        let model = Arc::new(LlmModel::new(config, &self.registry, &self.credentials)?);
        self.models.insert(name.to_string(), model.clone());
        Ok(model)
    }

    /// Replace the active session
    ///
    /// `None` starts the default session. An unknown agent is reported and
    /// leaves the active session untouched; the return value tells whether
    /// the switch happened.
    pub async fn switch_session(
        &mut self,
        agent_name: Option<&str>,
        intro: bool,
        memory: Option<Map<String, Value>>,
        history: Option<Arc<dyn HistoryStore>>,
    ) -> bool {
        let history = history.or_else(|| self.history.clone());

        let Some(name) = agent_name else {
            tracing::warn!("No agent given, starting the default session");
            self.session = self.default_session(memory, history);
            return true;
        };

        let Some(manifest) = self.manifests.get(name).cloned() else {
            tracing::error!(agent = name, "Invalid agent name");
            self.emit(ChatEvent::error(format!("Invalid agent: {}", name)));
            return false;
        };

        let model = match self.model_for(&manifest) {
            Ok(model) => model,
            Err(e) => {
                tracing::error!(agent = name, "Cannot activate agent: {}", e);
                self.emit(ChatEvent::error(format!("Cannot activate {}: {}", name, e)));
                return false;
            }
        };

        self.session = ChatSession::new(
            Some(name),
            manifest.clone(),
            model.clone(),
            SessionOptions {
                memory,
                intro,
                history,
                cancel: Some(self.cancel.clone()),
            },
        );

        let activation = if self.settings.verbose {
            format!(
                "Activating: {} (model={}, temperature={}, max_token={})",
                self.session.title(),
                model.name(),
                self.session.temperature(),
                model.max_token()
            )
        } else {
            format!("Activating: {}", self.session.title())
        };
        tracing::info!(agent = name, model = model.name(), "Session activated");
        self.emit(ChatEvent::info(activation));

        if manifest.notebook() {
            self.create_notebook(model.name()).await;
        }

        if let Some(intro) = self.session.intro_message().map(str::to_string) {
            self.emit(ChatEvent::bot(intro));
        }

        true
    }

    async fn create_notebook(&mut self, model_name: &str) {
        let Some(runtime) = self.runtime.clone() else {
            self.emit(ChatEvent::error("This agent needs a notebook but no runtime is configured"));
            return;
        };

        match runtime.create_notebook(model_name).await {
            Ok(result) => {
                let name = result
                    .get("notebook_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.emit(ChatEvent::info(format!("Created a notebook: {}", name)));
            }
            Err(e) => {
                tracing::error!("Failed to create a notebook: {}", e);
                self.emit(ChatEvent::error(format!("Failed to create a notebook: {}", e)));
            }
        }
    }

    /// Append a user message and run the model
    pub async fn ask(&mut self, text: impl Into<String>) -> AgentResult<()> {
        self.session.append_user_question(text).await;
        self.process_llm().await
    }

    /// Run the active session's call loop
    ///
    /// Emitted actions are handled after the loop returns; a switch that asks
    /// for it continues the conversation under the new agent. A failing loop
    /// is reported and the same agent restarted; in verbose mode the error is
    /// returned after the restart.
    pub async fn process_llm(&mut self) -> AgentResult<()> {
        self.cancel.reset();

        for _ in 0..MAX_LOOP_ITERATIONS {
            let actions = match self.run_session_loop().await {
                Ok(actions) => actions,
                Err(AgentError::Cancelled) => {
                    tracing::info!("Response cancelled");
                    return Ok(());
                }
                Err(e) => return self.recover(e).await,
            };

            let mut resume = false;
            for action in actions {
                resume |= self.apply_emit(action).await;
            }
            if !resume {
                return Ok(());
            }
        }

        tracing::warn!("Stopped after {} consecutive agent handoffs", MAX_LOOP_ITERATIONS);
        Ok(())
    }

    /// Forward one event and carry out what it asks for
    pub async fn process_event(&mut self, event: ChatEvent) -> AgentResult<()> {
        self.emit(event.clone());

        if let ChatEvent::Emit { action } = event {
            if self.apply_emit(action).await {
                return self.process_llm().await;
            }
        }
        Ok(())
    }

    async fn run_session_loop(&mut self) -> AgentResult<Vec<EmitAction>> {
        let verbose = self.settings.verbose;
        let runtime = self.runtime.clone();
        let agent_name = self.session.agent_name().map(str::to_string);
        let callback = &mut self.callback;
        let mut queued = Vec::new();

        let mut sink = |event: ChatEvent| {
            callback(agent_name.as_deref(), &event);
            if let ChatEvent::Emit { action } = event {
                queued.push(action);
            }
        };
        self.session.call_loop(&mut sink, verbose, runtime.as_deref()).await?;

        Ok(queued)
    }

    /// Apply an emitted action; returns whether the loop should continue
    async fn apply_emit(&mut self, action: EmitAction) -> bool {
        match action {
            EmitAction::SwitchSession(request) => {
                if let Some(memory) = request.memory {
                    self.session.set_memory(memory, request.merge);
                }

                let Some(agent) = request.agent else {
                    return false;
                };

                let memory = self.session.memory().clone();
                if !self.switch_session(Some(&agent), true, Some(memory), None).await {
                    return false;
                }

                if let Some(message) = request.message {
                    self.session.append_user_question(message).await;
                }
                true
            }
        }
    }

    async fn recover(&mut self, error: AgentError) -> AgentResult<()> {
        tracing::error!("Restarting the chat: {}", error);
        self.emit(ChatEvent::error(format!("Restarting the chat: {}", error)));

        match self.session.agent_name().map(str::to_string) {
            Some(agent) => {
                self.switch_session(Some(&agent), true, None, None).await;
            }
            None => {
                self.session = self.default_session(None, self.history.clone());
            }
        }

        if self.settings.verbose {
            Err(error)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for ChatApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatApplication")
            .field("session", &self.session)
            .field("agents", &self.agent_names())
            .finish()
    }
}
