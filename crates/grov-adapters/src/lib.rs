// SPDX-License-Identifier: Apache-2.0
//! Per-wire-protocol agent adapters. Each adapter
//! encapsulates one upstream protocol's object shape and raw-byte
//! injection anchors; the core only ever talks to the `AgentAdapter`
//! trait object handed back by the registry.

mod adapter;
mod claude;
mod codex;
mod error;
mod registry;
mod sse;
mod types;

pub use adapter::AgentAdapter;
pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use error::AdapterError;
pub use registry::AdapterRegistry;
pub use types::{ActionKind, AdapterSettings, HistoryItem, ParsedAction, ToolUseBlock, Usage};
