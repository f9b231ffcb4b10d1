// Codex parsers: the OpenAI Responses wire format plus Codex-specific
// sanitisation of grep arguments.

use serde_json::Value;

use llm_relay_types::{Error, Message, UnifiedEvent, Usage};

use super::openai::{parse_openai_chunk, parse_openai_response};

/// Parse one streaming chunk from the Codex upstream.
pub fn parse_codex_chunk(raw: &[u8]) -> Result<Vec<UnifiedEvent>, Error> {
    let mut events = parse_openai_chunk(raw)?;
    for event in &mut events {
        if let Some(tc) = event.tool_call.as_mut() {
            tc.args = sanitize_codex_grep_args(&tc.name, &tc.args);
        }
    }
    Ok(events)
}

/// Parse a non-streaming Codex response.
pub fn parse_codex_response(raw: &[u8]) -> Result<(Vec<Message>, Option<Usage>), Error> {
    let (mut messages, usage) = parse_openai_response(raw)?;
    for message in &mut messages {
        for tc in &mut message.tool_calls {
            tc.args = sanitize_codex_grep_args(&tc.name, &tc.args);
        }
    }
    Ok((messages, usage))
}

/// Resolve conflicting grep context flags.
///
/// Codex sometimes emits `-C` together with `-A`/`-B`. Downstream
/// validators (Cursor) are presence-based: a key counts as specified even
/// when its value is 0, so the conflicting keys must be removed, not
/// zeroed. Non-zero `-C` wins over `-A`/`-B`; a zero `-C` is dropped.
pub fn sanitize_codex_grep_args(tool_name: &str, args: &str) -> String {
    let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(args) else {
        return args.to_string();
    };

    let is_known_grep_tool = tool_name == "grep" || tool_name == "ripgrep_raw_search";
    if !is_known_grep_tool && !tool_name.is_empty() {
        return args.to_string();
    }
    // Tool name missing (streaming deltas): only touch args that clearly
    // look like grep args.
    let looks_like_grep = parsed.contains_key("pattern")
        && parsed.contains_key("-C")
        && (parsed.contains_key("-A") || parsed.contains_key("-B"));
    if !is_known_grep_tool && !looks_like_grep {
        return args.to_string();
    }

    let has_c = parsed.contains_key("-C");
    let has_a = parsed.contains_key("-A");
    let has_b = parsed.contains_key("-B");
    if !has_c || (!has_a && !has_b) {
        return args.to_string();
    }

    let c_zero = is_effectively_zero(parsed.get("-C"));

    let mut cleaned = parsed;
    if !c_zero {
        cleaned.remove("-A");
        cleaned.remove("-B");
    } else {
        cleaned.remove("-C");
    }
    Value::Object(cleaned).to_string()
}

fn is_effectively_zero(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        // Models sometimes serialise numbers as strings.
        Some(Value::String(s)) => s == "0" || s == "0.0" || s.is_empty(),
        Some(other) => other.as_i64() == Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(args: &str) -> Value {
        serde_json::from_str(args).unwrap()
    }

    #[test]
    fn test_nonzero_c_drops_a_and_b() {
        let args = json!({"pattern": "x", "-C": 3, "-A": 2, "-B": 0}).to_string();
        let cleaned = parsed(&sanitize_codex_grep_args("grep", &args));
        assert_eq!(cleaned, json!({"pattern": "x", "-C": 3}));
    }

    #[test]
    fn test_zero_c_dropped_keeps_a() {
        let args = json!({"pattern": "x", "-C": 0, "-A": 1}).to_string();
        let cleaned = parsed(&sanitize_codex_grep_args("grep", &args));
        assert_eq!(cleaned, json!({"pattern": "x", "-A": 1}));
    }

    #[test]
    fn test_string_zero_counts_as_zero() {
        let args = json!({"pattern": "x", "-C": "0.0", "-B": 2}).to_string();
        let cleaned = parsed(&sanitize_codex_grep_args("ripgrep_raw_search", &args));
        assert_eq!(cleaned, json!({"pattern": "x", "-B": 2}));
    }

    #[test]
    fn test_unknown_tool_left_alone() {
        let args = json!({"pattern": "x", "-C": 3, "-A": 2}).to_string();
        assert_eq!(sanitize_codex_grep_args("read_file", &args), args);
    }

    #[test]
    fn test_missing_name_with_grep_shape_sanitized() {
        let args = json!({"pattern": "x", "-C": 3, "-A": 2}).to_string();
        let cleaned = parsed(&sanitize_codex_grep_args("", &args));
        assert_eq!(cleaned, json!({"pattern": "x", "-C": 3}));
    }

    #[test]
    fn test_missing_name_without_grep_shape_untouched() {
        let args = json!({"path": "a.txt"}).to_string();
        assert_eq!(sanitize_codex_grep_args("", &args), args);
    }

    #[test]
    fn test_no_conflict_untouched() {
        let args = json!({"pattern": "x", "-C": 3}).to_string();
        assert_eq!(sanitize_codex_grep_args("grep", &args), args);
    }
}
