// SPDX-License-Identifier: Apache-2.0

/// Escape a string for embedding inside a JSON string literal.
///
/// Covers exactly the bytes that can appear in ordinary prompt text and
/// break JSON if left raw: backslash, double quote, and the common
/// whitespace control characters. This is intentionally narrower than a
/// full JSON string encoder — the injector only ever embeds plain text
/// produced by the core, never arbitrary attacker-controlled binary data.
pub fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_backslash_and_quote() {
        assert_eq!(escape_json_string(r#"a\b"c"#), r#"a\\b\"c"#);
    }

    #[test]
    fn escapes_newline() {
        assert_eq!(escape_json_string("a\nb"), "a\\nb");
    }

    #[test]
    fn leaves_plain_text_unchanged() {
        assert_eq!(escape_json_string("plain text 123"), "plain text 123");
    }

    #[test]
    fn round_trips_through_serde_json() {
        let raw = "line1\nline2 \"quoted\" and \\backslash\\";
        let escaped = escape_json_string(raw);
        let wrapped = format!("\"{escaped}\"");
        let decoded: String = serde_json::from_str(&wrapped).unwrap();
        assert_eq!(decoded, raw);
    }
}
