// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use grov_types::{Memory, Session};

/// The team-memory / ingest service the core depends on for exactly two
/// operations. Treated as opaque JSON/HTTP transport by the core.
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn fetch_team_memories(
        &self,
        project_path: &str,
        user_prompt: &str,
        current_files: &[String],
        limit: usize,
    ) -> anyhow::Result<Vec<Memory>>;

    async fn save_memory(&self, session: &Session, trigger_reason: &str) -> anyhow::Result<String>;
}
