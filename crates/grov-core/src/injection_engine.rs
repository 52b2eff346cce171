// SPDX-License-Identifier: Apache-2.0
//! Memory-injection engine: per-project preview building, reconstruction,
//! and the tool-expansion loop.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use grov_adapters::AgentAdapter;
use grov_memory::MemoryService;
use grov_types::{InjectionRecord, Memory, RequestKind, SessionInjectionState};
use tokio::sync::Mutex;

/// The static, byte-stable contract describing the expand tool to the
/// model. Never reword: any change breaks the upstream prefix cache for
/// every in-flight session.
pub const EXPAND_TOOL_DESCRIPTION: &str = "\
When a message contains a block starting with `[PROJECT KNOWLEDGE BASE`, \
follow this procedure: (1) read only the most recent such block in the \
latest user message, ignoring any earlier copies further up the \
conversation; (2) immediately call the expand tool, passing the IDs \
listed in that block and no others; (3) analyze the expanded content \
once it is returned as a tool result; (4) decide whether the expanded \
knowledge already answers the request, or whether you still need to \
inspect the code before responding.";

const MAX_MEMORIES: usize = 3;
const MAX_EXPANSION_ITERATIONS: u32 = 5;

pub struct PreviewBuild {
    pub text: String,
    pub memories: Vec<Memory>,
}

/// Format the age-bucketed preview block for a set of memories.
pub fn build_preview(memories: &[Memory], now: chrono::DateTime<Utc>) -> String {
    if memories.is_empty() {
        return "[PROJECT KNOWLEDGE BASE: No relevant entries for this query]".to_string();
    }
    let mut out = format!("[PROJECT KNOWLEDGE BASE: {} verified entries - CURRENT]\n", memories.len());
    for m in memories {
        out.push_str(&format!(
            "#{}: \"{}\" -> {} ({})\n",
            m.short_id(),
            m.goal,
            m.summary,
            m.age_bucket(now)
        ));
    }
    out.push_str("Use grov_expand with these IDs to get full knowledge.");
    out
}

/// Detect the request type relative to the previously observed message
/// count.
pub fn detect_request_kind(last_message_count: Option<usize>, current_message_count: usize, last_is_user_with_tool_result: bool) -> RequestKind {
    match last_message_count {
        Some(n) if n == current_message_count => RequestKind::Retry,
        Some(n) if current_message_count + 1 < n => RequestKind::NewConversation,
        _ if last_is_user_with_tool_result => RequestKind::Continuation,
        _ => RequestKind::First,
    }
}

struct ProjectState {
    injection: SessionInjectionState,
    last_message_count: Option<usize>,
    memory_cache: HashMap<String, Memory>,
}

impl ProjectState {
    fn new() -> Self {
        Self { injection: SessionInjectionState::new(), last_message_count: None, memory_cache: HashMap::new() }
    }

    /// Resolve an id given as either a full id or an 8-char prefix, in
    /// either direction.
    fn get_cached_memory(&self, id: &str) -> Option<&Memory> {
        self.memory_cache.get(id).or_else(|| {
            self.memory_cache.values().find(|m| m.id.starts_with(id) || id.starts_with(m.short_id()))
        })
    }
}

/// Owns one `SessionInjectionState` per project path and runs the
/// preview/reconstruction/expansion machinery over it.
pub struct InjectionEngine {
    memory_service: Arc<dyn MemoryService>,
    projects: Mutex<HashMap<String, ProjectState>>,
}

impl InjectionEngine {
    pub fn new(memory_service: Arc<dyn MemoryService>) -> Self {
        Self { memory_service, projects: Mutex::new(HashMap::new()) }
    }

    /// Build the preview for a first request, cache the returned memories,
    /// and stage a pending `preview` record at `position`.
    pub async fn build_first_request_preview(
        &self,
        project_path: &str,
        user_prompt: &str,
        current_files: &[String],
        position: usize,
    ) -> anyhow::Result<PreviewBuild> {
        let memories = self.memory_service.fetch_team_memories(project_path, user_prompt, current_files, MAX_MEMORIES).await?;
        let text = build_preview(&memories, Utc::now());

        let mut projects = self.projects.lock().await;
        let state = projects.entry(project_path.to_string()).or_insert_with(ProjectState::new);
        for m in &memories {
            state.memory_cache.insert(m.id.clone(), m.clone());
        }
        state.injection.commit();
        let memory_ids = memories.iter().map(|m| m.id.clone()).collect();
        state.injection.stage(InjectionRecord::Preview { position, text: text.clone(), memory_ids });
        Ok(PreviewBuild { text, memories })
    }

    /// Record the observed message count for request-type detection on
    /// the next request.
    pub async fn observe_message_count(&self, project_path: &str, count: usize) {
        let mut projects = self.projects.lock().await;
        let state = projects.entry(project_path.to_string()).or_insert_with(ProjectState::new);
        state.last_message_count = Some(count);
    }

    pub async fn last_message_count(&self, project_path: &str) -> Option<usize> {
        let projects = self.projects.lock().await;
        projects.get(project_path).and_then(|s| s.last_message_count)
    }

    pub async fn clear_project(&self, project_path: &str) {
        let mut projects = self.projects.lock().await;
        projects.remove(project_path);
    }

    /// True iff a committed or pending record already occupies this
    /// position.
    pub async fn has_tool_cycle_at_position(&self, project_path: &str, position: usize) -> bool {
        let projects = self.projects.lock().await;
        match projects.get(project_path) {
            None => false,
            Some(state) => state
                .injection
                .committed
                .iter()
                .chain(state.injection.pending.iter())
                .any(|record| record.position() == position && matches!(record, InjectionRecord::ToolCycle { .. })),
        }
    }

    /// Reconstruct an object-level body by appending each committed
    /// preview's text back onto the user message at its adjusted position.
    pub async fn reconstruct(&self, project_path: &str, adapter: &dyn AgentAdapter, body: &mut serde_json::Value) {
        let projects = self.projects.lock().await;
        let Some(state) = projects.get(project_path) else { return };
        let mut messages = adapter.get_messages(body).to_vec();
        for record in &state.injection.committed {
            if let InjectionRecord::Preview { position, text, .. } = record {
                if let Some(msg) = messages.get_mut(*position) {
                    if msg.get("role").and_then(|r| r.as_str()) == Some("user") {
                        let mut single = body.clone();
                        adapter.set_messages(&mut single, vec![msg.clone()]);
                        if adapter.inject_delta(&mut single, text).is_ok() {
                            if let Some(new_msg) = adapter.get_messages(&single).first() {
                                *msg = new_msg.clone();
                            }
                        }
                    }
                }
            }
        }
        adapter.set_messages(body, messages);
    }

    /// Resolve expand-tool ids to memory bodies and join them into a
    /// single tool-result string.
    pub async fn expand_ids(&self, project_path: &str, ids: &[String]) -> String {
        let projects = self.projects.lock().await;
        let Some(state) = projects.get(project_path) else {
            return "No cached memories are available to expand.".to_string();
        };
        let mut parts = Vec::new();
        for id in ids {
            match state.get_cached_memory(id) {
                Some(m) => parts.push(m.expanded_body()),
                None => parts.push(format!("Memory {id} was not found.")),
            }
        }
        parts.join("\n---\n")
    }

    /// Stage a `tool_cycle` record at `position` unless one already
    /// exists there.
    pub async fn record_tool_cycle(&self, project_path: &str, position: usize, tool_definition: String, expanded_text: String) {
        if self.has_tool_cycle_at_position(project_path, position).await {
            return;
        }
        let mut projects = self.projects.lock().await;
        let state = projects.entry(project_path.to_string()).or_insert_with(ProjectState::new);
        state.injection.stage(InjectionRecord::ToolCycle { position, tool_definition, expanded_text });
        state.injection.commit();
    }

    pub fn max_expansion_iterations(&self) -> u32 {
        MAX_EXPANSION_ITERATIONS
    }
}
