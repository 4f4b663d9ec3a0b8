//! File-based transcript store

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{HistoryRecord, HistoryStore};
use crate::agents::error::{AgentError, AgentResult};

/// One pretty-printed JSON file per session
#[derive(Debug, Clone)]
pub struct FileHistory {
    base_path: PathBuf,
}

impl FileHistory {
    /// Create the store, creating the directory if needed
    pub fn new(base_path: impl AsRef<Path>) -> AgentResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&base_path)
            .map_err(|e| AgentError::History(format!("Failed to create directory: {}", e)))?;

        Ok(Self { base_path })
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl HistoryStore for FileHistory {
    async fn save(&self, record: &HistoryRecord) -> AgentResult<()> {
        let content = serde_json::to_string_pretty(record)?;

        fs::write(self.record_path(&record.session_id), content)
            .await
            .map_err(|e| AgentError::History(format!("Failed to write history file: {}", e)))
    }

    async fn load(&self, session_id: &str) -> AgentResult<Option<HistoryRecord>> {
        let path = self.record_path(session_id);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| AgentError::History(format!("Failed to read history file: {}", e)))?;

        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn delete(&self, session_id: &str) -> AgentResult<()> {
        let path = self.record_path(session_id);

        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| AgentError::History(format!("Failed to delete history file: {}", e)))?;
        }

        Ok(())
    }

    async fn list(&self, agent_name: Option<&str>) -> AgentResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| AgentError::History(format!("Failed to read directory: {}", e)))?;

        let mut records = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgentError::History(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            // Unreadable files are skipped rather than failing the listing
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            if let Ok(record) = serde_json::from_str::<HistoryRecord>(&content) {
                if agent_name.map_or(true, |name| record.agent_name.as_deref() == Some(name)) {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records.into_iter().map(|r| r.session_id).collect())
    }
}
