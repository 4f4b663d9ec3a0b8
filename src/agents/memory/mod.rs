//! Transcript storage for chat sessions
//!
//! A session with a store attached persists every appended message under its
//! session id:
//! - In-memory (default, lost on restart)
//! - File-based (one JSON document per session)

mod file;
mod in_memory;

pub use file::FileHistory;
pub use in_memory::InMemoryHistory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::agents::domain::Message;
use crate::agents::error::AgentResult;

/// Stored transcript of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub session_id: String,
    /// Agent the session belongs to; `None` for the default session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(session_id: impl Into<String>, agent_name: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            agent_name: agent_name.map(str::to_string),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and touch the update timestamp
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

/// Storage backend for session transcripts
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Save a whole record, replacing any previous one
    async fn save(&self, record: &HistoryRecord) -> AgentResult<()>;

    /// Load a record by session id
    async fn load(&self, session_id: &str) -> AgentResult<Option<HistoryRecord>>;

    /// Delete a record
    async fn delete(&self, session_id: &str) -> AgentResult<()>;

    /// Ids of stored sessions, most recently updated first
    async fn list(&self, agent_name: Option<&str>) -> AgentResult<Vec<String>>;

    /// Append one message, creating the record on first use
    async fn append(&self, session_id: &str, agent_name: Option<&str>, message: &Message) -> AgentResult<()> {
        let mut record = self
            .load(session_id)
            .await?
            .unwrap_or_else(|| HistoryRecord::new(session_id, agent_name));
        record.push(message.clone());
        self.save(&record).await
    }
}

/// Store selected by the settings: file-backed when a directory is set
pub fn create_store(history_dir: Option<&PathBuf>) -> AgentResult<Arc<dyn HistoryStore>> {
    match history_dir {
        Some(dir) => Ok(Arc::new(FileHistory::new(dir)?)),
        None => Ok(Arc::new(InMemoryHistory::new())),
    }
}
