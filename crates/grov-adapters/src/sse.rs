// SPDX-License-Identifier: Apache-2.0
//! Minimal Server-Sent Events frame parser. Splits a raw response body into
//! `event`/`data` pairs without assuming anything about what's inside a
//! `data:` line; each adapter is responsible for interpreting its own
//! event payloads.

pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Splits `raw` on blank-line event boundaries, joining multi-line `data:`
/// fields with `\n` per the SSE spec. `id:`/`retry:` fields and comment
/// lines (starting with `:`) carry nothing the adapters need and are
/// dropped.
pub fn parse_events(raw: &[u8]) -> Vec<SseEvent> {
    let text = String::from_utf8_lossy(raw);
    let mut events = Vec::new();
    let mut event_name: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();

    for line in text.lines() {
        if line.is_empty() {
            if !data_lines.is_empty() {
                events.push(SseEvent { event: event_name.take(), data: data_lines.join("\n") });
                data_lines.clear();
            } else {
                event_name = None;
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("event:") {
            event_name = Some(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }
    if !data_lines.is_empty() {
        events.push(SseEvent { event: event_name.take(), data: data_lines.join("\n") });
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_data_fields() {
        let raw = b"event: message_start\ndata: {\"type\":\"message_start\"}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";
        let events = parse_events(raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
        assert_eq!(events[0].data, r#"{"type":"message_start"}"#);
        assert_eq!(events[1].event.as_deref(), Some("message_stop"));
    }

    #[test]
    fn joins_multiline_data_fields_with_newline() {
        let raw = b"data: line one\ndata: line two\n\n";
        let events = parse_events(raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn ignores_comment_and_id_lines() {
        let raw = b": keep-alive\nid: 5\ndata: payload\n\n";
        let events = parse_events(raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "payload");
    }

    #[test]
    fn flushes_a_trailing_event_without_final_blank_line() {
        let raw = b"data: trailing";
        let events = parse_events(raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "trailing");
    }
}
