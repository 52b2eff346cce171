// SPDX-License-Identifier: Apache-2.0
use grov_types::{AlignmentVerdict, Session};

/// A pure, synchronous check of whether an action taken while
/// `waiting_for_recovery` matches the recovery plan that was injected. No
/// network call is involved.
pub fn check_recovery_alignment(action_summary: &str, recovery_plan: Option<&str>, session: &Session) -> (AlignmentVerdict, String) {
    let Some(plan) = recovery_plan.or(session.pending_forced_recovery.as_deref()) else {
        return (AlignmentVerdict::Aligned, "no recovery plan was pending".to_string());
    };

    let plan_words: Vec<&str> = plan.split_whitespace().filter(|w| w.len() > 4).collect();
    if plan_words.is_empty() {
        return (AlignmentVerdict::Aligned, "recovery plan had no distinguishing terms".to_string());
    }

    let action_lower = action_summary.to_ascii_lowercase();
    let matched = plan_words.iter().filter(|w| action_lower.contains(&w.to_ascii_lowercase())).count();
    let ratio = matched as f64 / plan_words.len() as f64;

    if ratio >= 0.25 {
        (AlignmentVerdict::Aligned, format!("action overlaps {matched}/{} recovery-plan terms", plan_words.len()))
    } else {
        (AlignmentVerdict::StillDrifting, format!("action overlaps only {matched}/{} recovery-plan terms", plan_words.len()))
    }
}
