//! In-memory transcript store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{HistoryRecord, HistoryStore};
use crate::agents::error::AgentResult;

/// In-memory transcript store
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistory {
    records: Arc<RwLock<HashMap<String, HistoryRecord>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn save(&self, record: &HistoryRecord) -> AgentResult<()> {
        let mut records = self.records.write().await;
        records.insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> AgentResult<Option<HistoryRecord>> {
        let records = self.records.read().await;
        Ok(records.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> AgentResult<()> {
        let mut records = self.records.write().await;
        records.remove(session_id);
        Ok(())
    }

    async fn list(&self, agent_name: Option<&str>) -> AgentResult<Vec<String>> {
        let records = self.records.read().await;

        let mut matching: Vec<&HistoryRecord> = records
            .values()
            .filter(|r| agent_name.map_or(true, |name| r.agent_name.as_deref() == Some(name)))
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(matching.into_iter().map(|r| r.session_id.clone()).collect())
    }
}
