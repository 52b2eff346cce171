// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use grov_types::{DriftResult, Session, Step, TaskVerdict};
use serde_json::json;
use tracing::warn;

use crate::traits::Analyzers;
use crate::types::{DriftInput, RawDriftResult, RawTaskVerdict, TaskContextInput};

/// HTTP/JSON client for the external analyzer service.
pub struct HttpAnalyzers {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalyzers {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Analyzers for HttpAnalyzers {
    async fn analyze_task_context(&self, input: TaskContextInput<'_>) -> anyhow::Result<TaskVerdict> {
        let url = format!("{}/analyze-task-context", self.base_url);
        let body = json!({
            "session": input.session_for_comparison,
            "user_message": input.user_message,
            "recent_steps": input.recent_steps,
            "assistant_text": input.assistant_text,
            "history": input.history,
        });
        let resp = self.client.post(&url).json(&body).send().await.context("analyzeTaskContext request failed")?;
        let raw: RawTaskVerdict = resp.error_for_status()?.json().await.context("analyzeTaskContext response was not valid JSON")?;
        Ok(raw.into())
    }

    async fn check_drift(&self, input: DriftInput<'_>) -> anyhow::Result<DriftResult> {
        let url = format!("{}/check-drift", self.base_url);
        let body = json!({
            "session_state": input.session_state,
            "recent_steps": input.recent_steps,
            "latest_user_message": input.latest_user_message,
        });
        let resp = self.client.post(&url).json(&body).send().await.context("checkDrift request failed")?;
        let raw: RawDriftResult = resp.error_for_status()?.json().await.context("checkDrift response was not valid JSON")?;
        Ok(raw.into_drift_result())
    }

    async fn generate_session_summary(&self, session: &Session, steps: &[Step], max_chars: usize) -> anyhow::Result<String> {
        let url = format!("{}/generate-session-summary", self.base_url);
        let body = json!({ "session": session, "steps": steps, "max_chars": max_chars });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("generateSessionSummary request failed")?;
        let resp = match resp.error_for_status() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "generateSessionSummary call failed, falling back to truncated goal");
                return Ok(truncate(&session.original_goal, max_chars));
            }
        };
        #[derive(serde::Deserialize)]
        struct SummaryResponse {
            summary: String,
        }
        let parsed: SummaryResponse = resp.json().await.context("generateSessionSummary response was not valid JSON")?;
        Ok(truncate(&parsed.summary, max_chars))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
