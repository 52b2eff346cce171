// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

use crate::error::AdapterError;
use crate::types::{AdapterSettings, HistoryItem, ParsedAction, ToolUseBlock, Usage};
use grov_injector::InjectResult;

/// One upstream wire protocol, immutable after registration and owned by
/// the registry. Every operation is total on well-formed inputs; on
/// malformed inputs it returns an `AdapterError` and leaves its argument
/// untouched.
pub trait AgentAdapter: Send + Sync {
    /// Human-readable name, used in logs and the registry.
    fn name(&self) -> &'static str;

    /// True if this adapter's endpoint matches the given request path
    /// (`/v1/messages` vs `/v1/responses`).
    fn claims_path(&self, path: &str) -> bool;

    /// Upstream base path this adapter forwards to, joined with the
    /// configured upstream base URL by the caller.
    fn upstream_path(&self) -> &'static str;

    fn extract_project_path(&self, body: &Value) -> Option<String>;

    /// A session id the client itself supplies, if the wire protocol
    /// carries one; most protocols don't and the core derives one from
    /// the project path instead.
    fn extract_session_id(&self, _body: &Value) -> Option<String> {
        None
    }

    fn extract_text_content(&self, response: &Value) -> Option<String>;

    /// Best-effort goal extraction from the latest user message, used as
    /// the placeholder goal for a lazily-created session.
    fn extract_goal(&self, body: &Value) -> Option<String> {
        self.get_last_user_content(body)
    }

    fn extract_history(&self, body: &Value) -> Vec<HistoryItem>;

    fn extract_usage(&self, response: &Value) -> Option<Usage>;

    fn is_valid_response(&self, response: &Value) -> bool;

    fn is_subagent_model(&self, body: &Value) -> bool;

    fn is_end_turn(&self, response: &Value) -> bool;

    fn is_tool_use(&self, response: &Value) -> bool;

    fn parse_actions(&self, response: &Value) -> Vec<ParsedAction>;

    fn get_tool_use_blocks(&self, response: &Value) -> Vec<ToolUseBlock>;

    fn find_internal_tool_use(&self, response: &Value, tool_name: &str) -> Option<ToolUseBlock> {
        self.get_tool_use_blocks(response)
            .into_iter()
            .find(|b| b.name == tool_name)
    }

    /// Object-level injection used only for reconstruction bookkeeping,
    /// never for the bytes actually forwarded. Mutates `body` in place.
    fn inject_memory(&self, body: &mut Value, text: &str) -> Result<(), AdapterError>;

    fn inject_delta(&self, body: &mut Value, text: &str) -> Result<(), AdapterError>;

    fn inject_tool(&self, body: &mut Value, tool_def: &Value) -> Result<(), AdapterError>;

    fn get_messages<'a>(&self, body: &'a Value) -> &'a [Value];

    fn set_messages(&self, body: &mut Value, messages: Vec<Value>);

    fn get_last_user_content(&self, body: &Value) -> Option<String>;

    /// Byte-level injections; delegate to `grov_injector` and never
    /// re-serialize.
    fn inject_into_raw_system_prompt(&self, body: &[u8], text: &str) -> InjectResult {
        grov_injector::append_system_text(body, text)
    }

    fn inject_into_raw_user_message(&self, body: &[u8], text: &str) -> InjectResult {
        grov_injector::append_user_delta(body, text)
    }

    fn inject_tool_into_raw_body(&self, body: &[u8], tool_json: &str) -> InjectResult {
        grov_injector::add_tool_definition(body, tool_json)
    }

    /// Preserved response header allow-list.
    fn filter_response_headers(&self, headers: &[(String, String)]) -> Vec<(String, String)> {
        const ALLOW: &[&str] = &[
            "content-type",
            "x-request-id",
            "request-id",
            "x-should-retry",
            "retry-after",
            "retry-after-ms",
        ];
        headers
            .iter()
            .filter(|(k, _)| {
                let k = k.to_ascii_lowercase();
                ALLOW.contains(&k.as_str()) || k.starts_with("anthropic-ratelimit-")
            })
            .cloned()
            .collect()
    }

    /// Build the follow-up request body for a tool-expansion round-trip.
    /// `original_body` is the raw bytes of the
    /// request that produced the tool-call response being answered.
    fn build_continue_body(
        &self,
        original_body: &[u8],
        tool_use_id: &str,
        tool_result_text: &str,
    ) -> Result<Vec<u8>, AdapterError>;

    fn settings(&self) -> AdapterSettings;

    /// Reconstructs the non-streaming response shape from a Server-Sent
    /// Events body, so every other response-inspection method
    /// (`is_end_turn`, `get_tool_use_blocks`, `extract_text_content`,
    /// `extract_usage`) keeps working unchanged whether or not the
    /// upstream streamed. The raw SSE bytes, not this reconstructed value,
    /// are what get forwarded to the client.
    fn decode_sse_response(&self, raw: &[u8]) -> Result<Value, AdapterError>;

    fn response_content_type(&self, is_sse: bool) -> &'static str {
        if is_sse {
            "text/event-stream; charset=utf-8"
        } else {
            "application/json"
        }
    }
}
