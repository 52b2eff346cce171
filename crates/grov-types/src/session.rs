// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Main,
    Subtask,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Normal,
    Drifted,
    Forced,
}

/// A logical unit of work tracked across one or more upstream turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_path: String,
    pub original_goal: String,
    pub status: SessionStatus,
    pub task_type: TaskType,
    pub parent_session_id: Option<String>,
    /// Sum of cache-creation + cache-read tokens for the most recent turn.
    /// Output and non-cached-input tokens are deliberately excluded.
    pub context_tokens: u64,
    pub mode: SessionMode,
    pub waiting_for_recovery: bool,
    pub escalation_count: u8,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub pending_correction: Option<String>,
    pub pending_forced_recovery: Option<String>,
    pub pending_clear_summary: Option<String>,
    pub final_response: Option<String>,
    pub prompt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Construct a brand-new active session for a project. Used both for
    /// the lazily-created placeholder and for orchestrator-driven
    /// `new_task`/`subtask`/`parallel_task` creation.
    pub fn new_active(project_path: impl Into<String>, original_goal: impl Into<String>, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_path: project_path.into(),
            original_goal: original_goal.into(),
            status: SessionStatus::Active,
            task_type,
            parent_session_id: None,
            context_tokens: 0,
            mode: SessionMode::Normal,
            waiting_for_recovery: false,
            escalation_count: 0,
            last_checked_at: None,
            pending_correction: None,
            pending_forced_recovery: None,
            pending_clear_summary: None,
            final_response: None,
            prompt_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = SessionStatus::Completed;
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_abandoned(&mut self) {
        self.status = SessionStatus::Abandoned;
        self.updated_at = Utc::now();
    }

    pub fn reactivate(&mut self) {
        self.status = SessionStatus::Active;
        self.completed_at = None;
        self.updated_at = Utc::now();
    }

    /// Reset drift state back to `normal`: both pending corrections clear
    /// and escalation resets to 0.
    pub fn clear_drift_state(&mut self) {
        self.mode = SessionMode::Normal;
        self.waiting_for_recovery = false;
        self.escalation_count = 0;
        self.pending_correction = None;
        self.pending_forced_recovery = None;
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after_secs: i64) -> bool {
        self.status == SessionStatus::Active
            && (now - self.updated_at).num_seconds() >= stale_after_secs
    }

    pub fn is_completed_expired(&self, now: DateTime<Utc>, retention_secs: i64) -> bool {
        self.status == SessionStatus::Completed
            && self
                .completed_at
                .map(|c| (now - c).num_seconds() >= retention_secs)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_active_session_has_unique_id_and_normal_mode() {
        let a = Session::new_active("proj", "goal", TaskType::Main);
        let b = Session::new_active("proj", "goal", TaskType::Main);
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, SessionStatus::Active);
        assert_eq!(a.mode, SessionMode::Normal);
        assert_eq!(a.escalation_count, 0);
    }

    #[test]
    fn mark_completed_sets_status_and_timestamp() {
        let mut s = Session::new_active("proj", "goal", TaskType::Main);
        assert!(s.completed_at.is_none());
        s.mark_completed();
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn reactivate_clears_completed_at() {
        let mut s = Session::new_active("proj", "goal", TaskType::Main);
        s.mark_completed();
        s.reactivate();
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.completed_at.is_none());
    }

    #[test]
    fn clear_drift_state_resets_everything() {
        let mut s = Session::new_active("proj", "goal", TaskType::Main);
        s.mode = SessionMode::Drifted;
        s.waiting_for_recovery = true;
        s.escalation_count = 2;
        s.pending_correction = Some("fix this".into());
        s.pending_forced_recovery = Some("recover".into());
        s.clear_drift_state();
        assert_eq!(s.mode, SessionMode::Normal);
        assert!(!s.waiting_for_recovery);
        assert_eq!(s.escalation_count, 0);
        assert!(s.pending_correction.is_none());
        assert!(s.pending_forced_recovery.is_none());
    }

    #[test]
    fn is_stale_false_for_fresh_session() {
        let s = Session::new_active("proj", "goal", TaskType::Main);
        assert!(!s.is_stale(Utc::now(), 3600));
    }

    #[test]
    fn is_stale_true_after_threshold() {
        let mut s = Session::new_active("proj", "goal", TaskType::Main);
        s.updated_at = Utc::now() - chrono::Duration::seconds(3601);
        assert!(s.is_stale(Utc::now(), 3600));
    }

    #[test]
    fn is_completed_expired_requires_completed_status() {
        let mut s = Session::new_active("proj", "goal", TaskType::Main);
        s.completed_at = Some(Utc::now() - chrono::Duration::days(2));
        // still active, not completed => not expired regardless of timestamp
        assert!(!s.is_completed_expired(Utc::now(), 86_400));
        s.mark_completed();
        s.completed_at = Some(Utc::now() - chrono::Duration::days(2));
        assert!(s.is_completed_expired(Utc::now(), 86_400));
    }
}
