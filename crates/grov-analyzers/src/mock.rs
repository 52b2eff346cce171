// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use grov_types::{DriftResult, Session, Step, TaskAction, TaskVerdict};

use crate::traits::Analyzers;
use crate::types::{DriftInput, TaskContextInput};

/// Deterministic built-in analyzer used when no external analyzer service
/// is configured (`grov-config`'s `AnalyzerConfig::base_url == None`).
/// Heuristics only — good enough for local dev and tests, never intended
/// to replace a real LLM-based analyzer in production.
#[derive(Debug, Default)]
pub struct MockAnalyzers;

impl MockAnalyzers {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzers for MockAnalyzers {
    async fn analyze_task_context(&self, input: TaskContextInput<'_>) -> anyhow::Result<TaskVerdict> {
        let action = if input.session_for_comparison.is_none() {
            TaskAction::NewTask
        } else if looks_like_completion(input.assistant_text) {
            TaskAction::TaskComplete
        } else {
            TaskAction::Continue
        };
        let new_goal = (action == TaskAction::NewTask && input.user_message.len() >= 30)
            .then(|| input.user_message.to_string());
        let summary = (action == TaskAction::TaskComplete).then(|| truncate(input.assistant_text, 280));
        Ok(TaskVerdict { action, new_goal, summary, is_information_task: false, parent_session_id: None, constraints: None, step_reasoning: None })
    }

    async fn check_drift(&self, input: DriftInput<'_>) -> anyhow::Result<DriftResult> {
        let edits_without_goal_mention = input
            .recent_steps
            .iter()
            .filter(|s| s.is_edit_or_write())
            .filter(|s| !s.files.iter().any(|f| input.latest_user_message.contains(f.as_str())))
            .count();
        let score = 10u8.saturating_sub(edits_without_goal_mention as u8 * 3);
        Ok(DriftResult::new(score, "mock analyzer: heuristic edit/goal overlap check"))
    }

    async fn generate_session_summary(&self, session: &Session, steps: &[Step], max_chars: usize) -> anyhow::Result<String> {
        let files: Vec<&str> = steps.iter().flat_map(|s| s.files.iter()).map(String::as_str).collect();
        let summary = if files.is_empty() {
            format!("Worked on: {}", session.original_goal)
        } else {
            format!("Worked on: {}. Touched {} file(s): {}", session.original_goal, files.len(), files.join(", "))
        };
        Ok(truncate(&summary, max_chars))
    }
}

fn looks_like_completion(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    text.chars().count() > 100 && (lower.contains("done") || lower.contains("complete") || lower.contains("finished"))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
