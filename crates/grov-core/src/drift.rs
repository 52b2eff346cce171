// SPDX-License-Identifier: Apache-2.0
//! Drift state machine: score-gated correction levels, escalation cap, and
//! the recovery-alignment handshake.
use std::sync::Arc;

use grov_analyzers::{check_recovery_alignment, Analyzers, DriftInput};
use grov_store::DriftLogRepository;
use grov_types::{AlignmentVerdict, DriftLevel, DriftLogEntry, DriftResult, Session, SessionMode, Step};
use tracing::info;

pub const MAX_ATTEMPTS: u8 = 2;
const DRIFT_LOG_THRESHOLD: u8 = 5;

/// Whether this turn is even eligible for a drift check.
pub fn should_check_drift(session: &Session, recent_steps: &[Step], drift_check_interval: u32) -> bool {
    let has_goal = !session.original_goal.trim().is_empty();
    let has_edit_or_write = recent_steps.iter().any(Step::is_edit_or_write);
    let interval_hit = drift_check_interval > 0 && session.prompt_count % drift_check_interval == 0;
    has_goal && has_edit_or_write && interval_hit
}

pub struct DriftCheckOutcome {
    pub result: DriftResult,
    /// True when score < 5: caller should write a `DriftLogEntry` instead
    /// of the normal step record.
    pub log_not_step: bool,
}

pub struct DriftMachine<D> {
    analyzers: Arc<dyn Analyzers>,
    drift_log: Arc<D>,
}

impl<D: DriftLogRepository> DriftMachine<D> {
    pub fn new(analyzers: Arc<dyn Analyzers>, drift_log: Arc<D>) -> Self {
        Self { analyzers, drift_log }
    }

    /// Run one drift check: query the analyzer, apply the score to
    /// `session`'s mode/escalation/pending_correction, and record a
    /// drift-log entry when the score is low.
    pub async fn check(&self, session: &mut Session, recent_steps: &[Step], latest_user_message: &str) -> anyhow::Result<DriftCheckOutcome> {
        let result = self
            .analyzers
            .check_drift(DriftInput { session_state: session, recent_steps, latest_user_message })
            .await?;

        self.apply(session, &result);

        let log_not_step = result.score < DRIFT_LOG_THRESHOLD;
        if log_not_step {
            let entry = DriftLogEntry::new(session.id.clone(), result.score, result.diagnostic.clone());
            self.drift_log.insert(&entry).await?;
        }

        Ok(DriftCheckOutcome { result, log_not_step })
    }

    fn apply(&self, session: &mut Session, result: &DriftResult) {
        info!(session_id = %session.id, score = result.score, level = ?result.level, "drift check");

        if session.mode != SessionMode::Normal && result.score >= DRIFT_LOG_THRESHOLD {
            session.clear_drift_state();
            return;
        }

        if result.level != DriftLevel::None && session.escalation_count >= MAX_ATTEMPTS {
            session.clear_drift_state();
            return;
        }

        match result.level {
            DriftLevel::None => {}
            DriftLevel::Nudge => {
                session.pending_correction = Some(format_correction(result));
            }
            DriftLevel::Correction | DriftLevel::Forced => {
                session.mode = SessionMode::Drifted;
                session.waiting_for_recovery = true;
                session.escalation_count = session.escalation_count.saturating_add(1);
                session.pending_correction = Some(format_correction(result));
            }
        }
    }

    /// When `waiting_for_recovery` is true and the next response contains
    /// actions, call the (pure, synchronous) alignment oracle and update
    /// escalation accordingly.
    pub fn check_recovery(&self, session: &mut Session, action_summary: &str) {
        if !session.waiting_for_recovery {
            return;
        }
        let plan = session.pending_correction.clone();
        let (verdict, _diagnostic) = check_recovery_alignment(action_summary, plan.as_deref(), session);
        match verdict {
            AlignmentVerdict::Aligned => session.clear_drift_state(),
            AlignmentVerdict::StillDrifting => {
                if session.escalation_count >= MAX_ATTEMPTS {
                    session.clear_drift_state();
                } else {
                    session.escalation_count = session.escalation_count.saturating_add(1);
                }
            }
        }
    }
}

fn format_correction(result: &DriftResult) -> String {
    format!("Course correction needed: {}", result.diagnostic)
}
