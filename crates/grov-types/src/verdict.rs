// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// The orchestrator decision returned by the task-context analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Continue,
    NewTask,
    Subtask,
    ParallelTask,
    TaskComplete,
    SubtaskComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskVerdict {
    pub action: TaskAction,
    /// Present for `new_task`/`subtask`/`parallel_task`: the goal text for
    /// the session being created.
    #[serde(default)]
    pub new_goal: Option<String>,
    /// Present for `*_complete`: a short summary to fold into team memory.
    #[serde(default)]
    pub summary: Option<String>,
    /// Present for `new_task`: marks a goal as `information`-typed,
    /// eligible for the Q&A short-circuit, as opposed to ordinary work
    /// (the created session's own `task_type` is always `main`).
    #[serde(default)]
    pub is_information_task: bool,
    /// Present for `subtask`/`parallel_task` when the analyzer names a
    /// parent explicitly rather than defaulting to the current session.
    #[serde(default)]
    pub parent_session_id: Option<String>,
    #[serde(default)]
    pub constraints: Option<Vec<String>>,
    /// Step-id -> reasoning text back-fill.
    #[serde(default)]
    pub step_reasoning: Option<Vec<(String, String)>>,
}

/// Drift severity band, mapped from the analyzer's 0-10 alignment score.
/// Lower scores mean more drifted;
/// a score "improving to >= 5" means the session is back on track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftLevel {
    None,
    Nudge,
    Correction,
    Forced,
}

impl DriftLevel {
    /// Fixed score-to-level table: 8-10 none, 5-7 nudge, 3-4 correction,
    /// 0-2 forced (intervene/halt collapsed into one severe band since
    /// both trigger the same mode=drifted treatment).
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=2 => DriftLevel::Forced,
            3..=4 => DriftLevel::Correction,
            5..=7 => DriftLevel::Nudge,
            _ => DriftLevel::None,
        }
    }

    /// Severe levels set `mode=drifted`, `waiting_for_recovery=true`, and
    /// increment escalation; mild levels only store the correction text.
    pub fn is_severe(self) -> bool {
        matches!(self, DriftLevel::Correction | DriftLevel::Forced)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftResult {
    pub score: u8,
    pub level: DriftLevel,
    pub diagnostic: String,
}

impl DriftResult {
    pub fn new(score: u8, diagnostic: impl Into<String>) -> Self {
        Self { score, level: DriftLevel::from_score(score), diagnostic: diagnostic.into() }
    }
}

/// Verdict from the recovery-alignment check after a forced-recovery
/// message was injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentVerdict {
    Aligned,
    StillDrifting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_level_boundaries() {
        assert_eq!(DriftLevel::from_score(0), DriftLevel::Forced);
        assert_eq!(DriftLevel::from_score(2), DriftLevel::Forced);
        assert_eq!(DriftLevel::from_score(3), DriftLevel::Correction);
        assert_eq!(DriftLevel::from_score(4), DriftLevel::Correction);
        assert_eq!(DriftLevel::from_score(5), DriftLevel::Nudge);
        assert_eq!(DriftLevel::from_score(7), DriftLevel::Nudge);
        assert_eq!(DriftLevel::from_score(8), DriftLevel::None);
        assert_eq!(DriftLevel::from_score(10), DriftLevel::None);
    }

    #[test]
    fn drift_result_new_derives_level() {
        let r = DriftResult::new(1, "ignored a failing test, kept editing");
        assert_eq!(r.level, DriftLevel::Forced);
        assert_eq!(r.score, 1);
    }

    #[test]
    fn severe_levels_are_correction_and_forced_only() {
        assert!(DriftLevel::Forced.is_severe());
        assert!(DriftLevel::Correction.is_severe());
        assert!(!DriftLevel::Nudge.is_severe());
        assert!(!DriftLevel::None.is_severe());
    }

    #[test]
    fn task_verdict_round_trips_through_json() {
        let v = TaskVerdict {
            action: TaskAction::NewTask,
            new_goal: Some("refactor auth".into()),
            summary: None,
            is_information_task: false,
            parent_session_id: None,
            constraints: None,
            step_reasoning: None,
        };
        let json = serde_json::to_string(&v).unwrap();
        let back: TaskVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back.action, TaskAction::NewTask);
        assert_eq!(back.new_goal.as_deref(), Some("refactor auth"));
    }

    #[test]
    fn task_action_serializes_snake_case() {
        let json = serde_json::to_string(&TaskAction::ParallelTask).unwrap();
        assert_eq!(json, "\"parallel_task\"");
    }
}
