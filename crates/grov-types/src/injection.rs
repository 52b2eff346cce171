// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a request relates to the session it was matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    First,
    Retry,
    Continuation,
    NewConversation,
}

/// One entry in the pending-vs-committed injection history buffer, used
/// for byte-stable replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum InjectionRecord {
    /// A memory preview block injected into the system prompt, at the
    /// original index of the last user message it was attached to.
    Preview { position: usize, text: String, memory_ids: Vec<String> },
    /// A tool-definition + expansion round-trip recorded so a retry can
    /// replay the same bytes without re-calling the expand tool.
    ToolCycle { position: usize, tool_definition: String, expanded_text: String },
}

impl InjectionRecord {
    pub fn position(&self) -> usize {
        match self {
            InjectionRecord::Preview { position, .. } => *position,
            InjectionRecord::ToolCycle { position, .. } => *position,
        }
    }
}

/// Per-session bookkeeping of what has been committed into the byte
/// stream versus what is still pending confirmation from upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInjectionState {
    pub committed: Vec<InjectionRecord>,
    pub pending: Vec<InjectionRecord>,
    pub last_committed_at: Option<DateTime<Utc>>,
}

impl SessionInjectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a record as pending; it only becomes part of replay history
    /// once `commit` is called after a successful upstream response.
    pub fn stage(&mut self, record: InjectionRecord) {
        self.pending.push(record);
    }

    /// Move all pending records into committed history: a response
    /// actually reaching the client confirms the bytes it saw.
    pub fn commit(&mut self) {
        self.committed.append(&mut self.pending);
        self.last_committed_at = Some(Utc::now());
    }

    /// Drop pending records without committing: a failed or retried
    /// request must not poison replay history with bytes the upstream
    /// never actually saw.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }
}
