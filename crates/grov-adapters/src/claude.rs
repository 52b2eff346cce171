// SPDX-License-Identifier: Apache-2.0
use serde_json::{json, Value};

use crate::adapter::AgentAdapter;
use crate::error::AdapterError;
use crate::types::{ActionKind, AdapterSettings, HistoryItem, ParsedAction, ToolUseBlock, Usage};

pub const EXPAND_TOOL_NAME: &str = "grov_expand";

fn expand_tool_definition() -> Value {
    json!({
        "name": EXPAND_TOOL_NAME,
        "description": "Expand one or more project-knowledge-base entries by their short id.",
        "input_schema": {
            "type": "object",
            "properties": {
                "ids": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["ids"]
        }
    })
}

/// Claude-style messages-with-content-blocks protocol (`POST /v1/messages`).
#[derive(Debug, Default)]
pub struct ClaudeAdapter;

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self
    }

    fn last_user_index(messages: &[Value]) -> Option<usize> {
        messages.iter().rposition(|m| m.get("role").and_then(Value::as_str) == Some("user"))
    }
}

impl AgentAdapter for ClaudeAdapter {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn claims_path(&self, path: &str) -> bool {
        path == "/v1/messages"
    }

    fn upstream_path(&self) -> &'static str {
        "/v1/messages"
    }

    fn extract_project_path(&self, body: &Value) -> Option<String> {
        body.get("metadata")
            .and_then(|m| m.get("project_path"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn extract_text_content(&self, response: &Value) -> Option<String> {
        let blocks = response.get("content")?.as_array()?;
        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn extract_history(&self, body: &Value) -> Vec<HistoryItem> {
        self.get_messages(body)
            .iter()
            .map(|m| {
                let role = m.get("role").and_then(Value::as_str).unwrap_or("user").to_string();
                let text = match m.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Array(blocks)) => blocks
                        .iter()
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    _ => String::new(),
                };
                HistoryItem { role, text }
            })
            .collect()
    }

    fn extract_usage(&self, response: &Value) -> Option<Usage> {
        let u = response.get("usage")?;
        Some(Usage {
            input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
            cache_creation_tokens: u.get("cache_creation_input_tokens").and_then(Value::as_u64).unwrap_or(0),
            cache_read_tokens: u.get("cache_read_input_tokens").and_then(Value::as_u64).unwrap_or(0),
        })
    }

    fn is_valid_response(&self, response: &Value) -> bool {
        response.get("content").map(Value::is_array).unwrap_or(false)
    }

    fn is_subagent_model(&self, body: &Value) -> bool {
        body.get("model")
            .and_then(Value::as_str)
            .map(|m| m.to_ascii_lowercase().contains("haiku"))
            .unwrap_or(false)
    }

    fn is_end_turn(&self, response: &Value) -> bool {
        response.get("stop_reason").and_then(Value::as_str) == Some("end_turn")
    }

    fn is_tool_use(&self, response: &Value) -> bool {
        response.get("stop_reason").and_then(Value::as_str) == Some("tool_use")
    }

    fn parse_actions(&self, response: &Value) -> Vec<ParsedAction> {
        self.get_tool_use_blocks(response)
            .into_iter()
            .map(|b| {
                let kind = match b.name.as_str() {
                    "Edit" | "edit" => ActionKind::Edit,
                    "Write" | "write" => ActionKind::Write,
                    "Bash" | "bash" => ActionKind::Bash,
                    "Read" | "read" => ActionKind::Read,
                    "Glob" | "glob" => ActionKind::Glob,
                    "Grep" | "grep" => ActionKind::Grep,
                    "Task" | "task" => ActionKind::Task,
                    _ => ActionKind::Other,
                };
                let files = b
                    .input
                    .get("file_path")
                    .and_then(Value::as_str)
                    .map(|s| vec![s.to_string()])
                    .unwrap_or_default();
                let command = b.input.get("command").and_then(Value::as_str).map(str::to_string);
                ParsedAction { kind, files, folders: Vec::new(), command }
            })
            .collect()
    }

    fn get_tool_use_blocks(&self, response: &Value) -> Vec<ToolUseBlock> {
        response
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
                    .filter_map(|b| {
                        Some(ToolUseBlock {
                            id: b.get("id")?.as_str()?.to_string(),
                            name: b.get("name")?.as_str()?.to_string(),
                            input: b.get("input").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn inject_memory(&self, body: &mut Value, text: &str) -> Result<(), AdapterError> {
        let system = body
            .as_object_mut()
            .ok_or_else(|| AdapterError::MalformedBody("root is not an object".into()))?
            .entry("system")
            .or_insert_with(|| Value::Array(Vec::new()));
        match system {
            Value::Array(arr) => {
                arr.push(json!({"type": "text", "text": text}));
                Ok(())
            }
            Value::String(s) => {
                let combined = format!("{s}\n\n{text}");
                *system = Value::String(combined);
                Ok(())
            }
            _ => Err(AdapterError::MalformedBody("system field has unsupported shape".into())),
        }
    }

    fn inject_delta(&self, body: &mut Value, text: &str) -> Result<(), AdapterError> {
        let messages = body
            .get_mut("messages")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| AdapterError::MalformedBody("messages field missing or not an array".into()))?;
        let idx = messages
            .iter()
            .rposition(|m| m.get("role").and_then(Value::as_str) == Some("user"))
            .ok_or_else(|| AdapterError::MalformedBody("no user message found".into()))?;
        let msg = &mut messages[idx];
        match msg.get_mut("content") {
            Some(Value::String(s)) => {
                s.push_str(&format!("\n\n{text}"));
                Ok(())
            }
            Some(Value::Array(arr)) => {
                arr.push(json!({"type": "text", "text": format!("\n\n{text}")}));
                Ok(())
            }
            _ => Err(AdapterError::MalformedBody("user message content has unsupported shape".into())),
        }
    }

    fn inject_tool(&self, body: &mut Value, tool_def: &Value) -> Result<(), AdapterError> {
        let obj = body.as_object_mut().ok_or_else(|| AdapterError::MalformedBody("root is not an object".into()))?;
        let tools = obj.entry("tools").or_insert_with(|| Value::Array(Vec::new()));
        tools
            .as_array_mut()
            .ok_or_else(|| AdapterError::MalformedBody("tools field is not an array".into()))?
            .push(tool_def.clone());
        Ok(())
    }

    fn get_messages<'a>(&self, body: &'a Value) -> &'a [Value] {
        body.get("messages").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
    }

    fn set_messages(&self, body: &mut Value, messages: Vec<Value>) {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("messages".to_string(), Value::Array(messages));
        }
    }

    fn get_last_user_content(&self, body: &Value) -> Option<String> {
        let messages = self.get_messages(body);
        let idx = Self::last_user_index(messages)?;
        match messages[idx].get("content") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Array(blocks)) => Some(
                blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        }
    }

    fn build_continue_body(
        &self,
        original_body: &[u8],
        tool_use_id: &str,
        tool_result_text: &str,
    ) -> Result<Vec<u8>, AdapterError> {
        let mut value: Value = serde_json::from_slice(original_body)
            .map_err(|e| AdapterError::MalformedBody(e.to_string()))?;
        let messages = value
            .get_mut("messages")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| AdapterError::MalformedBody("messages field missing".into()))?;
        messages.push(json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": tool_result_text,
            }]
        }));
        serde_json::to_vec(&value).map_err(|e| AdapterError::MalformedBody(e.to_string()))
    }

    fn settings(&self) -> AdapterSettings {
        AdapterSettings {
            expand_tool_name: EXPAND_TOOL_NAME,
            expand_tool_definition: expand_tool_definition(),
        }
    }

    fn decode_sse_response(&self, raw: &[u8]) -> Result<Value, AdapterError> {
        let events = crate::sse::parse_events(raw);
        let mut message = json!({"type": "message", "role": "assistant", "content": []});
        let mut blocks: Vec<Value> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        let mut partial_jsons: Vec<String> = Vec::new();

        for event in &events {
            let Ok(data) = serde_json::from_str::<Value>(&event.data) else { continue };
            match data.get("type").and_then(Value::as_str) {
                Some("message_start") => {
                    if let Some(msg) = data.get("message") {
                        message = msg.clone();
                    }
                }
                Some("content_block_start") => {
                    let index = data.get("index").and_then(Value::as_u64).unwrap_or(blocks.len() as u64) as usize;
                    while blocks.len() <= index {
                        blocks.push(Value::Null);
                        texts.push(String::new());
                        partial_jsons.push(String::new());
                    }
                    blocks[index] = data.get("content_block").cloned().unwrap_or(Value::Null);
                }
                Some("content_block_delta") => {
                    let index = data.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                    let Some(delta) = data.get("delta") else { continue };
                    match delta.get("type").and_then(Value::as_str) {
                        Some("text_delta") => {
                            if let (Some(text), Some(slot)) = (delta.get("text").and_then(Value::as_str), texts.get_mut(index)) {
                                slot.push_str(text);
                            }
                        }
                        Some("input_json_delta") => {
                            if let (Some(partial), Some(slot)) =
                                (delta.get("partial_json").and_then(Value::as_str), partial_jsons.get_mut(index))
                            {
                                slot.push_str(partial);
                            }
                        }
                        _ => {}
                    }
                }
                Some("content_block_stop") => {
                    let index = data.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                    if let Some(block) = blocks.get_mut(index) {
                        if let Some(text) = texts.get(index).filter(|t| !t.is_empty()) {
                            block["text"] = json!(text);
                        }
                        if let Some(parsed) = partial_jsons
                            .get(index)
                            .filter(|p| !p.is_empty())
                            .and_then(|p| serde_json::from_str::<Value>(p).ok())
                        {
                            block["input"] = parsed;
                        }
                    }
                }
                Some("message_delta") => {
                    if let Some(delta) = data.get("delta") {
                        if let Some(reason) = delta.get("stop_reason") {
                            message["stop_reason"] = reason.clone();
                        }
                        if let Some(seq) = delta.get("stop_sequence") {
                            message["stop_sequence"] = seq.clone();
                        }
                    }
                    if let (Some(usage), Some(msg_obj)) = (data.get("usage").and_then(Value::as_object), message.as_object_mut()) {
                        let entry = msg_obj.entry("usage").or_insert_with(|| json!({}));
                        if let Some(entry_obj) = entry.as_object_mut() {
                            for (k, v) in usage {
                                entry_obj.insert(k.clone(), v.clone());
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        blocks.retain(|b| !b.is_null());
        message["content"] = Value::Array(blocks);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Value {
        json!({
            "model": "claude-3-5-sonnet",
            "system": [{"type": "text", "text": "You are a coding agent."}],
            "messages": [
                {"role": "user", "content": "Explain the worker pool"},
            ],
            "max_tokens": 1024,
        })
    }

    #[test]
    fn claims_messages_path_only() {
        let a = ClaudeAdapter::new();
        assert!(a.claims_path("/v1/messages"));
        assert!(!a.claims_path("/v1/responses"));
    }

    #[test]
    fn is_subagent_model_detects_haiku() {
        let a = ClaudeAdapter::new();
        assert!(a.is_subagent_model(&json!({"model": "claude-3-5-haiku-latest"})));
        assert!(!a.is_subagent_model(&json!({"model": "claude-3-5-sonnet-latest"})));
    }

    #[test]
    fn get_last_user_content_from_string() {
        let a = ClaudeAdapter::new();
        let req = sample_request();
        assert_eq!(a.get_last_user_content(&req).as_deref(), Some("Explain the worker pool"));
    }

    #[test]
    fn inject_memory_appends_to_system_array() {
        let a = ClaudeAdapter::new();
        let mut req = sample_request();
        a.inject_memory(&mut req, "preview text").unwrap();
        let system = req.get("system").unwrap().as_array().unwrap();
        assert_eq!(system.len(), 2);
        assert_eq!(system[1]["text"], "preview text");
    }

    #[test]
    fn inject_delta_appends_to_last_user_string_content() {
        let a = ClaudeAdapter::new();
        let mut req = sample_request();
        a.inject_delta(&mut req, "[PROJECT KNOWLEDGE BASE]").unwrap();
        let content = req["messages"][0]["content"].as_str().unwrap();
        assert!(content.ends_with("[PROJECT KNOWLEDGE BASE]"));
        assert!(content.starts_with("Explain the worker pool"));
    }

    #[test]
    fn is_end_turn_and_is_tool_use_are_exclusive() {
        let a = ClaudeAdapter::new();
        let end = json!({"stop_reason": "end_turn", "content": []});
        let tool = json!({"stop_reason": "tool_use", "content": []});
        assert!(a.is_end_turn(&end));
        assert!(!a.is_tool_use(&end));
        assert!(a.is_tool_use(&tool));
        assert!(!a.is_end_turn(&tool));
    }

    #[test]
    fn get_tool_use_blocks_extracts_id_name_input() {
        let a = ClaudeAdapter::new();
        let response = json!({
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Looking this up."},
                {"type": "tool_use", "id": "toolu_1", "name": "grov_expand", "input": {"ids": ["abcdef12"]}},
            ],
        });
        let blocks = a.get_tool_use_blocks(&response);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "grov_expand");
        assert_eq!(blocks[0].input["ids"][0], "abcdef12");
    }

    #[test]
    fn build_continue_body_appends_tool_result_message() {
        let a = ClaudeAdapter::new();
        let body = serde_json::to_vec(&sample_request()).unwrap();
        let out = a.build_continue_body(&body, "toolu_1", "expanded body").unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        let messages = value["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(messages[1]["content"][0]["content"], "expanded body");
    }

    #[test]
    fn extract_usage_sums_cache_fields_separately() {
        let a = ClaudeAdapter::new();
        let response = json!({
            "content": [],
            "usage": {
                "input_tokens": 10,
                "output_tokens": 5,
                "cache_creation_input_tokens": 100,
                "cache_read_input_tokens": 200,
            }
        });
        let usage = a.extract_usage(&response).unwrap();
        assert_eq!(usage.context_tokens(), 300);
    }

    #[test]
    fn decode_sse_response_reconstructs_text_and_usage() {
        let a = ClaudeAdapter::new();
        let raw = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"content\":[],\"usage\":{\"input_tokens\":10}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":2}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let decoded = a.decode_sse_response(raw.as_bytes()).unwrap();
        assert!(a.is_end_turn(&decoded));
        assert_eq!(a.extract_text_content(&decoded).as_deref(), Some("Hello"));
        let usage = a.extract_usage(&decoded).unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 2);
    }

    #[test]
    fn decode_sse_response_reconstructs_tool_use_from_json_delta() {
        let a = ClaudeAdapter::new();
        let raw = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"content\":[],\"usage\":{\"input_tokens\":5}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"grov_expand\",\"input\":{}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"ids\\\":\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"[\\\"abcdef12\\\"]}\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
        );
        let decoded = a.decode_sse_response(raw.as_bytes()).unwrap();
        assert!(a.is_tool_use(&decoded));
        let blocks = a.get_tool_use_blocks(&decoded);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "grov_expand");
        assert_eq!(blocks[0].input["ids"][0], "abcdef12");
    }
}
