// SPDX-License-Identifier: Apache-2.0
use crate::bracket::{find_matching_close, find_outside_strings, is_empty_span, rfind_outside_strings};
use crate::escape::escape_json_string;

/// Result of a byte-level injection attempt.
///
/// `applied = false` means the anchor token wasn't found; `bytes` is then
/// the untouched original body so callers can always fall back to
/// forwarding it unchanged. Injection failure never errors the client, it
/// just forwards the original bytes.
#[derive(Debug, Clone)]
pub struct InjectResult {
    pub bytes: Vec<u8>,
    pub applied: bool,
}

impl InjectResult {
    fn unchanged(body: &[u8]) -> Self {
        Self { bytes: body.to_vec(), applied: false }
    }
}

/// Insert `bytes_to_insert` at `at`, preserving every byte before `at`.
fn splice(body: &[u8], at: usize, bytes_to_insert: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + bytes_to_insert.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(bytes_to_insert);
    out.extend_from_slice(&body[at..]);
    out
}

/// §4.2.1 — append a text block to the `"system":[...]` array.
pub fn append_system_text(body: &[u8], text: &str) -> InjectResult {
    let Some(key_idx) = find_outside_strings(body, br#""system":["#) else {
        return InjectResult::unchanged(body);
    };
    let open_idx = key_idx + br#""system":"#.len();
    let Some(close_idx) = find_matching_close(body, open_idx, b'[', b']') else {
        return InjectResult::unchanged(body);
    };
    let empty = is_empty_span(body, open_idx, close_idx);
    let escaped = escape_json_string(text);
    let insertion = if empty {
        format!(r#"{{"type":"text","text":"{escaped}"}}"#)
    } else {
        format!(r#",{{"type":"text","text":"{escaped}"}}"#)
    };
    InjectResult { bytes: splice(body, close_idx, insertion.as_bytes()), applied: true }
}

/// §4.2.2 — append text to the last user message's content.
pub fn append_user_delta(body: &[u8], text: &str) -> InjectResult {
    let Some(role_idx) = rfind_outside_strings(body, br#""role":"user""#) else {
        return InjectResult::unchanged(body);
    };
    let Some(rel) = find_outside_strings(&body[role_idx..], br#""content":"#) else {
        return InjectResult::unchanged(body);
    };
    let content_key_idx = role_idx + rel;
    let value_idx = content_key_idx + br#""content":"#.len();
    let Some(first_non_ws) = body[value_idx..]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|p| value_idx + p)
    else {
        return InjectResult::unchanged(body);
    };

    let escaped = escape_json_string(text);
    match body[first_non_ws] {
        b'"' => {
            // String value: insert just before the unescaped closing quote.
            let close_quote = crate::bracket::skip_string(body, first_non_ws);
            let insertion = format!("\\n\\n{escaped}");
            InjectResult { bytes: splice(body, close_quote, insertion.as_bytes()), applied: true }
        }
        b'[' => {
            let Some(close_idx) = find_matching_close(body, first_non_ws, b'[', b']') else {
                return InjectResult::unchanged(body);
            };
            let empty = is_empty_span(body, first_non_ws, close_idx);
            let insertion = if empty {
                format!(r#"{{"type":"text","text":"\n\n{escaped}"}}"#)
            } else {
                format!(r#",{{"type":"text","text":"\n\n{escaped}"}}"#)
            };
            InjectResult { bytes: splice(body, close_idx, insertion.as_bytes()), applied: true }
        }
        _ => InjectResult::unchanged(body),
    }
}

/// §4.2.3 — add a tool definition to `"tools":[...]`, creating the array
/// (just before `"messages":`) if it doesn't exist yet.
pub fn add_tool_definition(body: &[u8], tool_json: &str) -> InjectResult {
    if let Some(key_idx) = find_outside_strings(body, br#""tools":["#) {
        let open_idx = key_idx + br#""tools":"#.len();
        let Some(close_idx) = find_matching_close(body, open_idx, b'[', b']') else {
            return InjectResult::unchanged(body);
        };
        let empty = is_empty_span(body, open_idx, close_idx);
        let insertion = if empty {
            tool_json.to_string()
        } else {
            format!(",{tool_json}")
        };
        return InjectResult { bytes: splice(body, close_idx, insertion.as_bytes()), applied: true };
    }

    let Some(messages_idx) = find_outside_strings(body, br#""messages":"#) else {
        return InjectResult::unchanged(body);
    };
    let insertion = format!(r#""tools":[{tool_json}],"#);
    InjectResult { bytes: splice(body, messages_idx, insertion.as_bytes()), applied: true }
}

/// §4.7 — insert a minimal keep-alive turn before the closing `]` of the
/// `messages` array. `max_tokens`/`stream` are untouched by design so the
/// upstream prefix cache still hits.
pub fn insert_keepalive_message(body: &[u8]) -> InjectResult {
    let Some(key_idx) = find_outside_strings(body, br#""messages":["#) else {
        return InjectResult::unchanged(body);
    };
    let open_idx = key_idx + br#""messages":"#.len();
    let Some(close_idx) = find_matching_close(body, open_idx, b'[', b']') else {
        return InjectResult::unchanged(body);
    };
    let empty = is_empty_span(body, open_idx, close_idx);
    let insertion = if empty {
        r#"{"role":"user","content":"."}"#.to_string()
    } else {
        r#",{"role":"user","content":"."}"#.to_string()
    };
    InjectResult { bytes: splice(body, close_idx, insertion.as_bytes()), applied: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).expect("must stay valid JSON")
    }

    #[test]
    fn append_system_text_preserves_prefix_bytes() {
        let body = br#"{"model":"x","system":[{"type":"text","text":"base"}],"messages":[]}"#;
        let r = append_system_text(body, "extra");
        assert!(r.applied);
        let key_idx = find_outside_strings(body, br#""system":["#).unwrap();
        let open_idx = key_idx + r#""system":"#.len();
        assert_eq!(&r.bytes[..open_idx + 1], &body[..open_idx + 1]);
        valid_json(&r.bytes);
    }

    #[test]
    fn append_system_text_into_empty_array() {
        let body = br#"{"system":[],"messages":[]}"#;
        let r = append_system_text(body, "hi");
        assert!(r.applied);
        let v = valid_json(&r.bytes);
        assert_eq!(v["system"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn append_system_text_no_system_field_reports_not_applied() {
        let body = br#"{"messages":[]}"#;
        let r = append_system_text(body, "hi");
        assert!(!r.applied);
        assert_eq!(r.bytes, body);
    }

    #[test]
    fn append_system_text_string_with_bracket_inside_system_entries() {
        let body = br#"{"system":[{"type":"text","text":"contains ] bracket"}],"messages":[]}"#;
        let r = append_system_text(body, "x");
        assert!(r.applied);
        valid_json(&r.bytes);
    }

    #[test]
    fn append_user_delta_string_content() {
        let body = br#"{"messages":[{"role":"user","content":"hello"}]}"#;
        let r = append_user_delta(body, "delta");
        assert!(r.applied);
        let v = valid_json(&r.bytes);
        assert_eq!(v["messages"][0]["content"].as_str().unwrap(), "hello\n\ndelta");
    }

    #[test]
    fn append_user_delta_array_content() {
        let body = br#"{"messages":[{"role":"user","content":[{"type":"text","text":"hi"}]}]}"#;
        let r = append_user_delta(body, "delta");
        assert!(r.applied);
        let v = valid_json(&r.bytes);
        let parts = v["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["text"].as_str().unwrap(), "\n\ndelta");
    }

    #[test]
    fn append_user_delta_uses_last_user_message() {
        let body = br#"{"messages":[
            {"role":"user","content":"first"},
            {"role":"assistant","content":"reply"},
            {"role":"user","content":"second"}
        ]}"#;
        let r = append_user_delta(body, "delta");
        assert!(r.applied);
        let v = valid_json(&r.bytes);
        assert_eq!(v["messages"][0]["content"].as_str().unwrap(), "first");
        assert_eq!(v["messages"][2]["content"].as_str().unwrap(), "second\n\ndelta");
    }

    #[test]
    fn add_tool_definition_creates_array_when_absent() {
        let body = br#"{"model":"x","messages":[]}"#;
        let r = add_tool_definition(body, r#"{"name":"grov_expand"}"#);
        assert!(r.applied);
        let v = valid_json(&r.bytes);
        assert_eq!(v["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn add_tool_definition_appends_to_existing_nonempty() {
        let body = br#"{"tools":[{"name":"a"}],"messages":[]}"#;
        let r = add_tool_definition(body, r#"{"name":"grov_expand"}"#);
        assert!(r.applied);
        let v = valid_json(&r.bytes);
        assert_eq!(v["tools"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn add_tool_definition_appends_to_existing_empty() {
        let body = br#"{"tools":[],"messages":[]}"#;
        let r = add_tool_definition(body, r#"{"name":"grov_expand"}"#);
        assert!(r.applied);
        let v = valid_json(&r.bytes);
        assert_eq!(v["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn insert_keepalive_message_nonempty_messages() {
        let body = br#"{"max_tokens":10,"stream":true,"messages":[{"role":"user","content":"hi"}]}"#;
        let r = insert_keepalive_message(body);
        assert!(r.applied);
        let v = valid_json(&r.bytes);
        assert_eq!(v["messages"].as_array().unwrap().len(), 2);
        assert_eq!(v["max_tokens"].as_i64().unwrap(), 10);
        assert!(v["stream"].as_bool().unwrap());
    }

    #[test]
    fn insert_keepalive_message_preserves_prefix_before_messages_close() {
        let body = br#"{"messages":[{"role":"user","content":"hi"}]}"#;
        let key_idx = find_outside_strings(body, br#""messages":["#).unwrap();
        let open_idx = key_idx + r#""messages":"#.len();
        let close_idx = find_matching_close(body, open_idx, b'[', b']').unwrap();
        let r = insert_keepalive_message(body);
        assert_eq!(&r.bytes[..close_idx], &body[..close_idx]);
    }

    #[test]
    fn missing_anchor_reports_unapplied_and_unchanged_bytes() {
        let body = br#"{"foo":"bar"}"#;
        let r = append_user_delta(body, "x");
        assert!(!r.applied);
        assert_eq!(r.bytes, body);
    }
}
