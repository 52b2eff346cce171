// SPDX-License-Identifier: Apache-2.0
//! String-aware bracket counting.
//!
//! The injector never re-serializes the request body — it walks the raw
//! bytes, treating anything inside a (possibly escaped) JSON string as
//! opaque, and counts brackets only outside of strings. This is what lets
//! it insert a single value into a `system`/`tools` array or locate the
//! last user message's `content` field without parsing the whole document.

/// Return the index of the closing quote matching the opening quote at
/// `bytes[quote_idx]`. Handles `\"` and other backslash escapes. If the
/// string is unterminated, returns the last index of `bytes`.
pub fn skip_string(bytes: &[u8], quote_idx: usize) -> usize {
    debug_assert_eq!(bytes.get(quote_idx), Some(&b'"'));
    let mut i = quote_idx + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i,
            _ => i += 1,
        }
    }
    bytes.len().saturating_sub(1)
}

/// Starting at `open_idx` (which must point at `bytes[open_idx] == open`),
/// find the index of the matching `close` bracket, treating same-depth
/// brackets inside JSON strings as opaque. Returns `None` if the bracket
/// is never closed.
pub fn find_matching_close(bytes: &[u8], open_idx: usize, open: u8, close: u8) -> Option<usize> {
    if bytes.get(open_idx) != Some(&open) {
        return None;
    }
    let mut depth: i32 = 0;
    let mut i = open_idx;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i) + 1;
                continue;
            }
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Find the first byte offset of `needle` in `haystack`, skipping over
/// JSON string contents so a literal match can't be accidentally found
/// inside unrelated prompt text.
pub fn find_outside_strings(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if haystack[i] == b'"' {
            i = skip_string(haystack, i) + 1;
            continue;
        }
        if &haystack[i..i + needle.len()] == needle {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Find the last byte offset of `needle` outside of JSON strings.
pub fn rfind_outside_strings(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let mut last = None;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if haystack[i] == b'"' {
            i = skip_string(haystack, i) + 1;
            continue;
        }
        if &haystack[i..i + needle.len()] == needle {
            last = Some(i);
        }
        i += 1;
    }
    last
}

/// Returns `true` if the array spanning `[open_idx, close_idx]` (inclusive,
/// indices of the brackets themselves) contains no element — only
/// whitespace between the brackets.
pub fn is_empty_span(bytes: &[u8], open_idx: usize, close_idx: usize) -> bool {
    bytes[open_idx + 1..close_idx]
        .iter()
        .all(|b| b.is_ascii_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_string_handles_escaped_quote() {
        let s = br#""a\"b""#;
        let end = skip_string(s, 0);
        assert_eq!(end, s.len() - 1);
    }

    #[test]
    fn find_matching_close_simple_array() {
        let s = br#"[1,2,3]"#;
        assert_eq!(find_matching_close(s, 0, b'[', b']'), Some(6));
    }

    #[test]
    fn find_matching_close_skips_brackets_in_strings() {
        let s = br#"[1,"a]b",3]"#;
        assert_eq!(find_matching_close(s, 0, b'[', b']'), Some(s.len() - 1));
    }

    #[test]
    fn find_matching_close_nested_arrays() {
        let s = br#"[1,[2,3],4]"#;
        assert_eq!(find_matching_close(s, 0, b'[', b']'), Some(s.len() - 1));
    }

    #[test]
    fn find_outside_strings_ignores_matches_in_strings() {
        let s = br#"{"a":"needle","needle":1}"#;
        let idx = find_outside_strings(s, b"\"needle\":1").unwrap();
        assert_eq!(&s[idx..idx + 10], &b"\"needle\":1"[..]);
    }

    #[test]
    fn rfind_outside_strings_returns_last_match() {
        let s = br#"[{"role":"user"},{"role":"assistant"},{"role":"user"}]"#;
        let idx = rfind_outside_strings(s, b"\"role\":\"user\"").unwrap();
        // the second occurrence starts further in the byte string than the first
        let first = find_outside_strings(s, b"\"role\":\"user\"").unwrap();
        assert!(idx > first);
    }

    #[test]
    fn is_empty_span_true_for_whitespace_only() {
        let s = b"[   ]";
        assert!(is_empty_span(s, 0, 4));
    }

    #[test]
    fn is_empty_span_false_when_content_present() {
        let s = b"[1]";
        assert!(!is_empty_span(s, 0, 2));
    }
}
