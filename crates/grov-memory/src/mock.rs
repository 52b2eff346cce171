// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;
use grov_types::{Memory, Session};
use uuid::Uuid;

use crate::trait_def::MemoryService;

/// In-process memory service backed by a fixed fixture list, used for
/// local development without a real ingest service and in tests.
#[derive(Default)]
pub struct MockMemoryService {
    fixtures: Vec<Memory>,
    saved: Mutex<Vec<(String, String)>>,
}

impl MockMemoryService {
    pub fn new(fixtures: Vec<Memory>) -> Self {
        Self { fixtures, saved: Mutex::new(Vec::new()) }
    }

    pub fn saved_trigger_reasons(&self) -> Vec<(String, String)> {
        self.saved.lock().expect("mock memory service mutex poisoned").clone()
    }
}

#[async_trait]
impl MemoryService for MockMemoryService {
    async fn fetch_team_memories(
        &self,
        _project_path: &str,
        user_prompt: &str,
        _current_files: &[String],
        limit: usize,
    ) -> anyhow::Result<Vec<Memory>> {
        let lower = user_prompt.to_ascii_lowercase();
        let matched: Vec<Memory> = self
            .fixtures
            .iter()
            .filter(|m| lower.contains(&m.goal.to_ascii_lowercase()) || m.summary.to_ascii_lowercase().contains(&lower))
            .take(limit)
            .cloned()
            .collect();
        if matched.is_empty() {
            Ok(self.fixtures.iter().take(limit).cloned().collect())
        } else {
            Ok(matched)
        }
    }

    async fn save_memory(&self, session: &Session, trigger_reason: &str) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.saved.lock().expect("mock memory service mutex poisoned").push((session.id.clone(), trigger_reason.to_string()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use grov_types::TaskType;

    fn fixture() -> Memory {
        Memory {
            id: "abcdef1234567890".into(),
            updated_at: Utc::now(),
            goal: "Design worker pool".into(),
            summary: "Bounded FIFO with N workers".into(),
            original_query: "worker pool design".into(),
            reasoning_trace: None,
            decisions: None,
            files_touched: None,
        }
    }

    #[tokio::test]
    async fn fetch_returns_matching_fixture() {
        let svc = MockMemoryService::new(vec![fixture()]);
        let results = svc.fetch_team_memories("/proj", "tell me about the worker pool design", &[], 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "abcdef1234567890");
    }

    #[tokio::test]
    async fn save_memory_records_trigger_reason() {
        let svc = MockMemoryService::new(vec![]);
        let session = Session::new_active("/proj", "goal", TaskType::Main);
        let id = svc.save_memory(&session, "task_complete").await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(svc.saved_trigger_reasons(), vec![(session.id, "task_complete".to_string())]);
    }
}
