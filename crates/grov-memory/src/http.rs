// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use grov_types::{Memory, Session};
use serde::Deserialize;
use serde_json::json;

use crate::trait_def::MemoryService;

pub struct HttpMemoryService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMemoryService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct FetchResponse {
    memories: Vec<Memory>,
}

#[derive(Deserialize)]
struct SaveResponse {
    id: String,
}

#[async_trait]
impl MemoryService for HttpMemoryService {
    async fn fetch_team_memories(
        &self,
        project_path: &str,
        user_prompt: &str,
        current_files: &[String],
        limit: usize,
    ) -> anyhow::Result<Vec<Memory>> {
        let url = format!("{}/memories/search", self.base_url);
        let body = json!({
            "project_path": project_path,
            "query": user_prompt,
            "current_files": current_files,
            "limit": limit,
        });
        let resp = self.client.post(&url).json(&body).send().await.context("fetchTeamMemories request failed")?;
        let parsed: FetchResponse = resp.error_for_status()?.json().await.context("fetchTeamMemories response was not valid JSON")?;
        Ok(parsed.memories)
    }

    async fn save_memory(&self, session: &Session, trigger_reason: &str) -> anyhow::Result<String> {
        let url = format!("{}/memories", self.base_url);
        let body = json!({ "session": session, "trigger_reason": trigger_reason });
        let resp = self.client.post(&url).json(&body).send().await.context("saveMemory request failed")?;
        let parsed: SaveResponse = resp.error_for_status()?.json().await.context("saveMemory response was not valid JSON")?;
        Ok(parsed.id)
    }
}
