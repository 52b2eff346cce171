// SPDX-License-Identifier: Apache-2.0
use serde_json::{json, Value};

use crate::adapter::AgentAdapter;
use crate::error::AdapterError;
use crate::types::{ActionKind, AdapterSettings, HistoryItem, ParsedAction, ToolUseBlock, Usage};
use grov_injector::bracket::{find_outside_strings, skip_string};
use grov_injector::InjectResult;

pub const EXPAND_TOOL_NAME: &str = "grov_expand";

fn expand_tool_definition() -> Value {
    json!({
        "type": "function",
        "name": EXPAND_TOOL_NAME,
        "description": "Expand one or more project-knowledge-base entries by their short id.",
        "parameters": {
            "type": "object",
            "properties": {
                "ids": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["ids"]
        }
    })
}

fn splice(body: &[u8], at: usize, bytes_to_insert: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + bytes_to_insert.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(bytes_to_insert);
    out.extend_from_slice(&body[at..]);
    out
}

/// Codex-style responses-with-input-items protocol (`POST /v1/responses`).
/// Unlike the Claude protocol, the system prompt is carried as a plain
/// `"instructions"` string rather than an array, and turns live under
/// `"input"` rather than `"messages"`; the raw injector is allowed to fall
/// through to a narrower byte-level op (still never a full
/// re-serialization) when the generic anchors don't match this shape.
#[derive(Debug, Default)]
pub struct CodexAdapter;

impl CodexAdapter {
    pub fn new() -> Self {
        Self
    }

    fn last_user_index(items: &[Value]) -> Option<usize> {
        items.iter().rposition(|m| m.get("role").and_then(Value::as_str) == Some("user"))
    }

    /// Append to the `"instructions":"..."` string, the narrower op used
    /// when this protocol's system field isn't an array.
    fn append_instructions_text(body: &[u8], text: &str) -> InjectResult {
        let Some(key_idx) = find_outside_strings(body, br#""instructions":""#) else {
            return InjectResult { bytes: body.to_vec(), applied: false };
        };
        let open_quote = key_idx + r#""instructions":"#.len();
        let close_quote = skip_string(body, open_quote);
        let escaped = grov_injector::escape_json_string(text);
        let insertion = format!("\\n\\n{escaped}");
        InjectResult { bytes: splice(body, close_quote, insertion.as_bytes()), applied: true }
    }

    /// Insert a fresh `"tools":[...]` array just before `"input":`, the
    /// narrower fallback when no `tools` array exists yet.
    fn insert_tools_before_input(body: &[u8], tool_json: &str) -> InjectResult {
        let Some(input_idx) = find_outside_strings(body, br#""input":"#) else {
            return InjectResult { bytes: body.to_vec(), applied: false };
        };
        let insertion = format!(r#""tools":[{tool_json}],"#);
        InjectResult { bytes: splice(body, input_idx, insertion.as_bytes()), applied: true }
    }
}

impl AgentAdapter for CodexAdapter {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn claims_path(&self, path: &str) -> bool {
        path == "/v1/responses"
    }

    fn upstream_path(&self) -> &'static str {
        "/v1/responses"
    }

    fn extract_project_path(&self, body: &Value) -> Option<String> {
        body.get("metadata")
            .and_then(|m| m.get("project_path"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn extract_text_content(&self, response: &Value) -> Option<String> {
        let output = response.get("output")?.as_array()?;
        let text: String = output
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
            .filter_map(|item| item.get("content").and_then(Value::as_array))
            .flatten()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("output_text"))
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
                let text = m
                    .get("content")
                    .and_then(Value::as_array)
                    .map(|blocks| {
                        blocks
                            .iter()
                            .filter_map(|b| b.get("text").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default();
                HistoryItem { role, text }
            })
            .collect()
    }

    fn extract_usage(&self, response: &Value) -> Option<Usage> {
        let u = response.get("usage")?;
        let cached = u.get("input_tokens_details").and_then(|d| d.get("cached_tokens")).and_then(Value::as_u64).unwrap_or(0);
        Some(Usage {
            input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
            cache_creation_tokens: 0,
            cache_read_tokens: cached,
        })
    }

    fn is_valid_response(&self, response: &Value) -> bool {
        response.get("output").map(Value::is_array).unwrap_or(false)
    }

    fn is_subagent_model(&self, body: &Value) -> bool {
        body.get("model")
            .and_then(Value::as_str)
            .map(|m| m.to_ascii_lowercase().contains("mini"))
            .unwrap_or(false)
    }

    fn is_end_turn(&self, response: &Value) -> bool {
        response.get("status").and_then(Value::as_str) == Some("completed")
    }

    fn is_tool_use(&self, response: &Value) -> bool {
        response
            .get("output")
            .and_then(Value::as_array)
            .map(|items| items.iter().any(|i| i.get("type").and_then(Value::as_str) == Some("function_call")))
            .unwrap_or(false)
    }

    fn parse_actions(&self, response: &Value) -> Vec<ParsedAction> {
        self.get_tool_use_blocks(response)
            .into_iter()
            .map(|b| {
                let kind = match b.name.as_str() {
                    "edit" | "apply_patch" => ActionKind::Edit,
                    "write" => ActionKind::Write,
                    "bash" | "shell" => ActionKind::Bash,
                    "read" => ActionKind::Read,
                    "glob" => ActionKind::Glob,
                    "grep" => ActionKind::Grep,
                    "task" => ActionKind::Task,
                    _ => ActionKind::Other,
                };
                let files = b
                    .input
                    .get("path")
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
            .get("output")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.get("type").and_then(Value::as_str) == Some("function_call"))
                    .filter_map(|i| {
                        let args_str = i.get("arguments")?.as_str()?;
                        let input = serde_json::from_str(args_str).unwrap_or(Value::Null);
                        Some(ToolUseBlock {
                            id: i.get("call_id")?.as_str()?.to_string(),
                            name: i.get("name")?.as_str()?.to_string(),
                            input,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn inject_memory(&self, body: &mut Value, text: &str) -> Result<(), AdapterError> {
        let obj = body.as_object_mut().ok_or_else(|| AdapterError::MalformedBody("root is not an object".into()))?;
        match obj.get_mut("instructions") {
            Some(Value::String(s)) => {
                s.push_str(&format!("\n\n{text}"));
                Ok(())
            }
            None => {
                obj.insert("instructions".into(), Value::String(text.to_string()));
                Ok(())
            }
            _ => Err(AdapterError::MalformedBody("instructions field has unsupported shape".into())),
        }
    }

    fn inject_delta(&self, body: &mut Value, text: &str) -> Result<(), AdapterError> {
        let items = body
            .get_mut("input")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| AdapterError::MalformedBody("input field missing or not an array".into()))?;
        let idx = items
            .iter()
            .rposition(|m| m.get("role").and_then(Value::as_str) == Some("user"))
            .ok_or_else(|| AdapterError::MalformedBody("no user item found".into()))?;
        let arr = items[idx]
            .get_mut("content")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| AdapterError::MalformedBody("user item content is not an array".into()))?;
        arr.push(json!({"type": "input_text", "text": format!("\n\n{text}")}));
        Ok(())
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
        body.get("input").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
    }

    fn set_messages(&self, body: &mut Value, messages: Vec<Value>) {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("input".to_string(), Value::Array(messages));
        }
    }

    fn get_last_user_content(&self, body: &Value) -> Option<String> {
        let items = self.get_messages(body);
        let idx = Self::last_user_index(items)?;
        items[idx].get("content").and_then(Value::as_array).map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    fn inject_into_raw_system_prompt(&self, body: &[u8], text: &str) -> InjectResult {
        let generic = grov_injector::append_system_text(body, text);
        if generic.applied {
            return generic;
        }
        Self::append_instructions_text(body, text)
    }

    fn inject_tool_into_raw_body(&self, body: &[u8], tool_json: &str) -> InjectResult {
        let generic = grov_injector::add_tool_definition(body, tool_json);
        if generic.applied {
            return generic;
        }
        Self::insert_tools_before_input(body, tool_json)
    }

    fn build_continue_body(
        &self,
        original_body: &[u8],
        tool_use_id: &str,
        tool_result_text: &str,
    ) -> Result<Vec<u8>, AdapterError> {
        let mut value: Value = serde_json::from_slice(original_body)
            .map_err(|e| AdapterError::MalformedBody(e.to_string()))?;
        let items = value
            .get_mut("input")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| AdapterError::MalformedBody("input field missing".into()))?;
        items.push(json!({
            "type": "function_call_output",
            "call_id": tool_use_id,
            "output": tool_result_text,
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
        for event in events.iter().rev() {
            let Ok(data) = serde_json::from_str::<Value>(&event.data) else { continue };
            let is_terminal = matches!(
                data.get("type").and_then(Value::as_str),
                Some("response.completed") | Some("response.failed") | Some("response.incomplete")
            );
            if is_terminal {
                if let Some(response) = data.get("response") {
                    return Ok(response.clone());
                }
            }
        }
        Err(AdapterError::MalformedBody("no terminal response event in SSE stream".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Value {
        json!({
            "model": "gpt-5-codex",
            "instructions": "You are a coding agent.",
            "input": [
                {"role": "user", "content": [{"type": "input_text", "text": "Explain the worker pool"}]},
            ],
        })
    }

    #[test]
    fn claims_responses_path_only() {
        let a = CodexAdapter::new();
        assert!(a.claims_path("/v1/responses"));
        assert!(!a.claims_path("/v1/messages"));
    }

    #[test]
    fn get_last_user_content_from_input_text_blocks() {
        let a = CodexAdapter::new();
        assert_eq!(a.get_last_user_content(&sample_request()).as_deref(), Some("Explain the worker pool"));
    }

    #[test]
    fn inject_memory_appends_to_instructions_string() {
        let a = CodexAdapter::new();
        let mut req = sample_request();
        a.inject_memory(&mut req, "preview text").unwrap();
        assert_eq!(req["instructions"].as_str().unwrap(), "You are a coding agent.\n\npreview text");
    }

    #[test]
    fn inject_delta_appends_input_text_block() {
        let a = CodexAdapter::new();
        let mut req = sample_request();
        a.inject_delta(&mut req, "[PROJECT KNOWLEDGE BASE]").unwrap();
        let content = req["input"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[1]["text"], "\n\n[PROJECT KNOWLEDGE BASE]");
    }

    #[test]
    fn raw_system_injection_falls_back_to_instructions_anchor() {
        let a = CodexAdapter::new();
        let body = serde_json::to_vec(&sample_request()).unwrap();
        let r = a.inject_into_raw_system_prompt(&body, "extra");
        assert!(r.applied);
        let v: Value = serde_json::from_slice(&r.bytes).unwrap();
        assert!(v["instructions"].as_str().unwrap().ends_with("extra"));
    }

    #[test]
    fn raw_system_injection_preserves_prefix_bytes() {
        let a = CodexAdapter::new();
        let body = serde_json::to_vec(&sample_request()).unwrap();
        let r = a.inject_into_raw_system_prompt(&body, "extra");
        let key_idx = find_outside_strings(&body, br#""instructions":""#).unwrap();
        assert_eq!(&r.bytes[..key_idx], &body[..key_idx]);
    }

    #[test]
    fn raw_tool_injection_falls_back_to_input_anchor_when_tools_absent() {
        let a = CodexAdapter::new();
        let body = serde_json::to_vec(&sample_request()).unwrap();
        let r = a.inject_tool_into_raw_body(&body, r#"{"name":"grov_expand"}"#);
        assert!(r.applied);
        let v: Value = serde_json::from_slice(&r.bytes).unwrap();
        assert_eq!(v["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn is_tool_use_true_when_function_call_present() {
        let a = CodexAdapter::new();
        let response = json!({
            "status": "in_progress",
            "output": [{"type": "function_call", "call_id": "c1", "name": "grov_expand", "arguments": "{\"ids\":[\"abcdef12\"]}"}],
        });
        assert!(a.is_tool_use(&response));
        let blocks = a.get_tool_use_blocks(&response);
        assert_eq!(blocks[0].input["ids"][0], "abcdef12");
    }

    #[test]
    fn decode_sse_response_returns_the_completed_response_object() {
        let a = CodexAdapter::new();
        let raw = concat!(
            "event: response.in_progress\n",
            "data: {\"type\":\"response.in_progress\",\"response\":{\"status\":\"in_progress\"}}\n\n",
            "event: response.output_item.done\n",
            "data: {\"type\":\"response.output_item.done\"}\n\n",
            "event: response.completed\n",
            "data: {\"type\":\"response.completed\",\"response\":{\"status\":\"completed\",\"output\":[{\"type\":\"message\",\"content\":[{\"type\":\"output_text\",\"text\":\"hi\"}]}]}}\n\n",
        );
        let decoded = a.decode_sse_response(raw.as_bytes()).unwrap();
        assert_eq!(decoded["status"], "completed");
        assert_eq!(a.extract_text_content(&decoded).as_deref(), Some("hi"));
    }

    #[test]
    fn decode_sse_response_errors_without_a_terminal_event() {
        let a = CodexAdapter::new();
        let raw = b"event: response.in_progress\ndata: {\"type\":\"response.in_progress\"}\n\n";
        assert!(a.decode_sse_response(raw).is_err());
    }

    #[test]
    fn build_continue_body_appends_function_call_output() {
        let a = CodexAdapter::new();
        let body = serde_json::to_vec(&sample_request()).unwrap();
        let out = a.build_continue_body(&body, "c1", "expanded body").unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        let items = value["input"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["call_id"], "c1");
        assert_eq!(items[1]["output"], "expanded body");
    }
}
