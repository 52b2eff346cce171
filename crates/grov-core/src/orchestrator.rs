// SPDX-License-Identifier: Apache-2.0
//! Task orchestrator: interprets the analyzer's verdict into session
//! lifecycle transitions. Runs only on `isEndTurn == true`.
use std::sync::Arc;

use grov_analyzers::{Analyzers, HistoryItem, TaskContextInput};
use grov_memory::MemoryService;
use grov_store::{SessionRepository, StepRepository};
use grov_types::{Session, SessionStatus, Step, TaskAction, TaskType};
use tracing::{info, warn};

const MIN_GOAL_OVERWRITE_LEN: usize = 30;
const FINAL_RESPONSE_MAX_CHARS: usize = 10_000;
const QA_SHORT_CIRCUIT_MIN_CHARS: usize = 100;
const MAX_STEP_REASONING_BACKFILL: usize = 10;

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// What happened as a result of one orchestrator pass. `session` is the
/// project's new active session, if any remains active afterward.
pub struct OrchestratorOutcome {
    pub session: Option<Session>,
    /// Set when `task_complete` on a `planning`-goal session: the next
    /// first request for this project should replace history with this
    /// summary injected into the system prompt.
    pub pending_plan_clear: Option<String>,
}

pub struct TaskOrchestrator<S, St> {
    sessions: Arc<S>,
    steps: Arc<St>,
    memory: Arc<dyn MemoryService>,
    analyzers: Arc<dyn Analyzers>,
}

impl<S, St> TaskOrchestrator<S, St>
where
    S: SessionRepository,
    St: StepRepository,
{
    pub fn new(sessions: Arc<S>, steps: Arc<St>, memory: Arc<dyn MemoryService>, analyzers: Arc<dyn Analyzers>) -> Self {
        Self { sessions, steps, memory, analyzers }
    }

    /// Run one orchestrator pass. `current_session` is the project's
    /// active session if any; `most_recent_completed` is used both for
    /// lineage inference and as the fallback comparison target.
    pub async fn handle_end_turn(
        &self,
        project_path: &str,
        current_session: Option<Session>,
        most_recent_completed: Option<Session>,
        recent_steps: &[Step],
        user_message: &str,
        assistant_text: &str,
        history: &[HistoryItem],
    ) -> anyhow::Result<OrchestratorOutcome> {
        let session_for_comparison = current_session.as_ref().or(most_recent_completed.as_ref());
        let verdict = self
            .analyzers
            .analyze_task_context(TaskContextInput {
                session_for_comparison,
                user_message,
                recent_steps,
                assistant_text,
                history,
            })
            .await?;

        info!(action = ?verdict.action, project_path, "task orchestrator verdict");

        let outcome = match verdict.action {
            TaskAction::Continue => {
                let mut session = current_session
                    .or(most_recent_completed)
                    .unwrap_or_else(|| Session::new_active(project_path, user_message, TaskType::Main));
                if session.status == SessionStatus::Completed {
                    session.reactivate();
                }
                if let (Some(goal), true) = (verdict.new_goal.clone(), user_message.len() >= MIN_GOAL_OVERWRITE_LEN) {
                    session.original_goal = goal;
                }
                session.prompt_count += 1;
                self.sessions.update(&session).await?;
                OrchestratorOutcome { session: Some(session), pending_plan_clear: None }
            }

            TaskAction::NewTask => {
                if let Some(prior) = &most_recent_completed {
                    if let Err(e) = self.sessions.delete_cascade(&prior.id).await {
                        warn!(error = %e, session_id = %prior.id, "could not drop prior completed session");
                    }
                }
                let goal = verdict.new_goal.clone().unwrap_or_else(|| user_message.to_string());
                let mut session = Session::new_active(project_path, goal, TaskType::Main);

                let has_actions = !recent_steps.is_empty();
                if verdict.is_information_task && assistant_text.chars().count() > QA_SHORT_CIRCUIT_MIN_CHARS && !has_actions {
                    self.sessions.insert(&session).await?;
                    session.final_response = Some(truncate_chars(assistant_text, FINAL_RESPONSE_MAX_CHARS));
                    let trigger = "qa_short_circuit";
                    if let Err(e) = self.memory.save_memory(&session, trigger).await {
                        warn!(error = %e, "failed to save Q&A short-circuit memory");
                    }
                    session.mark_completed();
                    self.sessions.update(&session).await?;
                    OrchestratorOutcome { session: None, pending_plan_clear: None }
                } else {
                    self.sessions.insert(&session).await?;
                    OrchestratorOutcome { session: Some(session), pending_plan_clear: None }
                }
            }

            TaskAction::Subtask | TaskAction::ParallelTask => {
                let task_type = if verdict.action == TaskAction::Subtask { TaskType::Subtask } else { TaskType::Parallel };
                let parent_id = verdict
                    .parent_session_id
                    .clone()
                    .or_else(|| current_session.as_ref().map(|s| s.id.clone()));
                let goal = verdict.new_goal.clone().unwrap_or_else(|| user_message.to_string());
                let mut child = Session::new_active(project_path, goal, task_type);
                child.parent_session_id = parent_id;
                self.sessions.insert(&child).await?;
                OrchestratorOutcome { session: Some(child), pending_plan_clear: None }
            }

            TaskAction::TaskComplete => {
                match current_session.or(most_recent_completed) {
                    Some(mut session) => {
                        session.final_response = Some(truncate_chars(assistant_text, FINAL_RESPONSE_MAX_CHARS));
                        let trigger = "task_complete";
                        if let Err(e) = self.memory.save_memory(&session, trigger).await {
                            warn!(error = %e, "failed to save task_complete memory");
                        }
                        session.mark_completed();
                        self.sessions.update(&session).await?;

                        let pending_plan_clear = if is_planning_goal(&session.original_goal) {
                            match self.analyzers.generate_session_summary(&session, recent_steps, FINAL_RESPONSE_MAX_CHARS).await {
                                Ok(summary) => Some(summary),
                                Err(e) => {
                                    warn!(error = %e, "failed to generate plan-clear summary");
                                    None
                                }
                            }
                        } else {
                            None
                        };
                        OrchestratorOutcome { session: None, pending_plan_clear }
                    }
                    None if assistant_text.chars().count() >= QA_SHORT_CIRCUIT_MIN_CHARS => {
                        let mut session = Session::new_active(project_path, user_message, TaskType::Main);
                        session.final_response = Some(truncate_chars(assistant_text, FINAL_RESPONSE_MAX_CHARS));
                        self.sessions.insert(&session).await?;
                        if let Err(e) = self.memory.save_memory(&session, "instant_complete").await {
                            warn!(error = %e, "failed to save instant-complete memory");
                        }
                        session.mark_completed();
                        self.sessions.update(&session).await?;
                        OrchestratorOutcome { session: None, pending_plan_clear: None }
                    }
                    None => OrchestratorOutcome { session: None, pending_plan_clear: None },
                }
            }

            TaskAction::SubtaskComplete => {
                match current_session {
                    Some(mut subtask) => {
                        subtask.final_response = Some(truncate_chars(assistant_text, FINAL_RESPONSE_MAX_CHARS));
                        if let Err(e) = self.memory.save_memory(&subtask, "subtask_complete").await {
                            warn!(error = %e, "failed to save subtask_complete memory");
                        }
                        subtask.mark_completed();
                        self.sessions.update(&subtask).await?;

                        let parent = match &subtask.parent_session_id {
                            Some(id) => self.sessions.get(id).await?,
                            None => None,
                        };
                        if let Some(mut parent) = parent {
                            parent.reactivate();
                            self.sessions.update(&parent).await?;
                            OrchestratorOutcome { session: Some(parent), pending_plan_clear: None }
                        } else {
                            OrchestratorOutcome { session: None, pending_plan_clear: None }
                        }
                    }
                    None => OrchestratorOutcome { session: None, pending_plan_clear: None },
                }
            }
        };

        if let Some(step_reasoning) = &verdict.step_reasoning {
            let capped: Vec<(String, String)> = step_reasoning.iter().take(MAX_STEP_REASONING_BACKFILL).cloned().collect();
            if let Err(e) = self.steps.backfill_reasoning(&capped).await {
                warn!(error = %e, "failed to back-fill step reasoning");
            }
        }

        Ok(outcome)
    }
}

fn is_planning_goal(goal: &str) -> bool {
    let lower = goal.to_ascii_lowercase();
    lower.starts_with("plan:") || lower.contains("create a plan") || lower.contains("planning:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use grov_analyzers::MockAnalyzers;
    use grov_memory::MockMemoryService;
    use grov_store::SqliteStore;

    async fn orchestrator() -> TaskOrchestrator<SqliteStore, SqliteStore> {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("t.sqlite3")).await.unwrap());
        TaskOrchestrator::new(store.clone(), store, Arc::new(MockMemoryService::new(vec![])), Arc::new(MockAnalyzers::new()))
    }

    #[tokio::test]
    async fn new_task_creates_session_when_none_exists() {
        let orch = orchestrator().await;
        let outcome = orch
            .handle_end_turn("/proj", None, None, &[], "Please refactor the authentication module end to end", "Sure, I'll plan this out first.", &[])
            .await
            .unwrap();
        assert!(outcome.session.is_some());
        assert_eq!(outcome.session.unwrap().status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn continue_reuses_existing_session() {
        let orch = orchestrator().await;
        let existing = Session::new_active("/proj", "do the thing", TaskType::Main);
        let outcome = orch
            .handle_end_turn("/proj", Some(existing.clone()), None, &[], "short", "still working on it", &[])
            .await
            .unwrap();
        let session = outcome.session.unwrap();
        assert_eq!(session.id, existing.id);
        assert_eq!(session.prompt_count, 1);
    }

    #[tokio::test]
    async fn task_complete_marks_completed_and_clears_active() {
        let orch = orchestrator().await;
        let existing = Session::new_active("/proj", "do the thing", TaskType::Main);
        let assistant_text = "a".repeat(150) + " this task looks complete and done now";
        let outcome = orch
            .handle_end_turn("/proj", Some(existing), None, &[], "short", &assistant_text, &[])
            .await
            .unwrap();
        assert!(outcome.session.is_none());
    }
}
