// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// One entry of the conversation history as handed to the task analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub role: String,
    pub text: String,
}

/// Token usage reported by the upstream response. Context-tracking relies
/// only on `cache_creation_tokens + cache_read_tokens`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl Usage {
    pub fn context_tokens(&self) -> u64 {
        self.cache_creation_tokens + self.cache_read_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Edit,
    Write,
    Bash,
    Read,
    Glob,
    Grep,
    Task,
    Other,
}

/// One assistant action parsed out of a response's content blocks.
#[derive(Debug, Clone)]
pub struct ParsedAction {
    pub kind: ActionKind,
    pub files: Vec<String>,
    pub folders: Vec<String>,
    pub command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Static, adapter-specific configuration consumed by the injection engine.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub expand_tool_name: &'static str,
    pub expand_tool_definition: serde_json::Value,
}
