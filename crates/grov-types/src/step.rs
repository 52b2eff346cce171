// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Edit,
    Write,
    Bash,
    Read,
    Glob,
    Grep,
    Task,
    Other,
}

/// One append-only record of an assistant action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub session_id: String,
    pub action_type: ActionType,
    pub files: Vec<String>,
    pub folders: Vec<String>,
    pub command: Option<String>,
    /// `None` after dedup back-fill: later actions that share the same
    /// reasoning as a prior action store `None` instead of repeating it.
    pub reasoning: Option<String>,
    pub drift_score: Option<u8>,
    pub is_validated: bool,
    pub is_key_decision: bool,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn new(session_id: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            action_type,
            files: Vec::new(),
            folders: Vec::new(),
            command: None,
            reasoning: None,
            drift_score: None,
            is_validated: false,
            is_key_decision: false,
            timestamp: Utc::now(),
        }
    }

    pub fn is_edit_or_write(&self) -> bool {
        matches!(self.action_type, ActionType::Edit | ActionType::Write)
    }
}

/// Written when a drift score dictates the action be recorded but not
/// validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftLogEntry {
    pub id: String,
    pub session_id: String,
    pub score: u8,
    pub diagnostic: String,
    pub timestamp: DateTime<Utc>,
}

impl DriftLogEntry {
    pub fn new(session_id: impl Into<String>, score: u8, diagnostic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            score,
            diagnostic: diagnostic.into(),
            timestamp: Utc::now(),
        }
    }
}
