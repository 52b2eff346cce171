// SPDX-License-Identifier: Apache-2.0
//! Wires the session manager, injection engine, task orchestrator, drift
//! machine, and extended cache into the single per-request pipeline
//! `grov-server` drives, and the fire-and-forget post-processing step run
//! after the response has already been written to the client.
use std::sync::Arc;

use grov_adapters::{ActionKind, AgentAdapter};
use grov_analyzers::{Analyzers, HistoryItem};
use grov_memory::MemoryService;
use grov_store::{DriftLogRepository, SessionRepository, StepRepository};
use grov_types::{ActionType, Session, Step};
use serde_json::Value;
use tracing::{error, warn};

use crate::drift::{should_check_drift, DriftMachine};
use crate::extended_cache::ExtendedCache;
use crate::injection_engine::InjectionEngine;
use crate::orchestrator::TaskOrchestrator;
use crate::session_manager::SessionManager;

/// Owns every long-lived `grov-core` component for one running proxy
/// instance. Cloned cheaply (`Arc` fields) into each request handler.
pub struct CoreState<R> {
    repo: Arc<R>,
    pub sessions: Arc<SessionManager<R>>,
    pub injection: Arc<InjectionEngine>,
    pub orchestrator: Arc<TaskOrchestrator<R, R>>,
    pub drift: Arc<DriftMachine<R>>,
    pub extended_cache: Arc<ExtendedCache>,
    drift_check_interval: u32,
}

impl<R> CoreState<R>
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, memory: Arc<dyn MemoryService>, analyzers: Arc<dyn Analyzers>, extended_cache: Arc<ExtendedCache>, drift_check_interval: u32) -> Self {
        Self {
            repo: repo.clone(),
            sessions: Arc::new(SessionManager::new(repo.clone())),
            injection: Arc::new(InjectionEngine::new(memory.clone())),
            orchestrator: Arc::new(TaskOrchestrator::new(repo.clone(), repo.clone(), memory, analyzers.clone())),
            drift: Arc::new(DriftMachine::new(analyzers, repo.clone())),
            extended_cache,
            drift_check_interval,
        }
    }

    /// Everything that happens after a non-streaming, end-turn response has
    /// already been written to the client: record the turn's actions as
    /// steps, run the drift check, and hand the turn to the task
    /// orchestrator. Spawned with `tokio::spawn` by the handler; every
    /// error is logged and swallowed here so a panic never crosses the
    /// spawn boundary.
    pub async fn post_process_end_turn(
        &self,
        adapter: Arc<dyn AgentAdapter>,
        project_path: String,
        mut session: Session,
        most_recent_completed: Option<Session>,
        user_message: String,
        assistant_text: String,
        history: Vec<HistoryItem>,
        response: Value,
    ) {
        let steps = self.record_steps(&adapter, &session.id, &response).await;

        if should_check_drift(&session, &steps, self.drift_check_interval) {
            match self.drift.check(&mut session, &steps, &user_message).await {
                Ok(outcome) => {
                    if let Err(e) = self.repo.update(&session).await {
                        error!(error = %e, session_id = %session.id, "failed to persist drift state");
                    }
                    if outcome.result.level.is_severe() {
                        warn!(session_id = %session.id, score = outcome.result.score, "session drifted");
                    }
                }
                Err(e) => error!(error = %e, session_id = %session.id, "drift check failed"),
            }
        }

        let recent_steps = steps;
        if let Err(e) = self
            .orchestrator
            .handle_end_turn(&project_path, Some(session), most_recent_completed, &recent_steps, &user_message, &assistant_text, &history)
            .await
        {
            error!(error = %e, project_path, "task orchestrator pass failed");
        }
    }

    async fn record_steps(&self, adapter: &Arc<dyn AgentAdapter>, session_id: &str, response: &Value) -> Vec<Step> {
        let mut steps = Vec::new();
        for action in adapter.parse_actions(response) {
            let mut step = Step::new(session_id, map_action_kind(action.kind));
            step.files = action.files;
            step.folders = action.folders;
            step.command = action.command;
            if let Err(e) = StepRepository::insert(self.repo.as_ref(), &step).await {
                error!(error = %e, session_id, "failed to persist step");
                continue;
            }
            steps.push(step);
        }
        steps
    }
}

fn map_action_kind(kind: ActionKind) -> ActionType {
    match kind {
        ActionKind::Edit => ActionType::Edit,
        ActionKind::Write => ActionType::Write,
        ActionKind::Bash => ActionType::Bash,
        ActionKind::Read => ActionType::Read,
        ActionKind::Glob => ActionType::Glob,
        ActionKind::Grep => ActionType::Grep,
        ActionKind::Task => ActionType::Task,
        ActionKind::Other => ActionType::Other,
    }
}
