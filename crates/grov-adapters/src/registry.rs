// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use crate::adapter::AgentAdapter;
use crate::claude::ClaudeAdapter;
use crate::codex::CodexAdapter;
use crate::error::AdapterError;

/// Maps an incoming request path to the one adapter that claims it. Built
/// once at startup and immutable afterwards.
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    /// The registry shipped with both supported protocols registered.
    pub fn with_builtin_adapters() -> Self {
        Self {
            adapters: vec![Arc::new(ClaudeAdapter::new()), Arc::new(CodexAdapter::new())],
        }
    }

    pub fn for_path(&self, path: &str) -> Result<Arc<dyn AgentAdapter>, AdapterError> {
        self.adapters
            .iter()
            .find(|a| a.claims_path(path))
            .cloned()
            .ok_or_else(|| AdapterError::NoAdapter(path.to_string()))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin_adapters()
    }
}
