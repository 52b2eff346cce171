// SPDX-License-Identifier: Apache-2.0
use grov_types::{DriftResult, Session, Step, TaskAction, TaskVerdict};
use serde::{Deserialize, Serialize};

/// One prior turn passed to `analyzeTaskContext`, independent of any
/// adapter's wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub role: String,
    pub text: String,
}

/// Input to the task-context analyzer. `session_for_comparison` is the
/// current active session or, absent one, the most recently completed
/// session (used for lineage inference).
#[derive(Debug, Clone, Serialize)]
pub struct TaskContextInput<'a> {
    pub session_for_comparison: Option<&'a Session>,
    pub user_message: &'a str,
    pub recent_steps: &'a [Step],
    pub assistant_text: &'a str,
    pub history: &'a [HistoryItem],
}

/// Input to the drift analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct DriftInput<'a> {
    pub session_state: &'a Session,
    pub recent_steps: &'a [Step],
    pub latest_user_message: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDriftResult {
    pub score: u8,
    pub drift_type: String,
    pub diagnostic: String,
    #[serde(default)]
    pub recovery_steps: Option<Vec<String>>,
}

impl RawDriftResult {
    pub fn into_drift_result(self) -> DriftResult {
        DriftResult::new(self.score, self.diagnostic)
    }
}

/// Input to the recovery-alignment check. Pure and synchronous.
#[derive(Debug, Clone)]
pub struct AlignmentInput<'a> {
    pub action_summary: &'a str,
    pub recovery_plan: Option<&'a str>,
    pub session_state: &'a Session,
}

pub use grov_types::AlignmentVerdict;

#[derive(Debug, Clone, Deserialize)]
pub struct RawTaskVerdict {
    pub action: TaskAction,
    #[serde(default)]
    pub current_goal: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub is_information_task: bool,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub constraints: Option<Vec<String>>,
    #[serde(default)]
    pub step_reasoning: Option<Vec<(String, String)>>,
}

impl From<RawTaskVerdict> for TaskVerdict {
    fn from(r: RawTaskVerdict) -> Self {
        TaskVerdict {
            action: r.action,
            new_goal: r.current_goal,
            summary: r.summary,
            is_information_task: r.is_information_task,
            parent_session_id: r.parent_task_id,
            constraints: r.constraints,
            step_reasoning: r.step_reasoning,
        }
    }
}
