// Text and raw-JSON plumbing shared by all parsers: UTF-8 sanitisation,
// SSE data-line extraction, JSON normalisation and repair, brace matching,
// and Gemini malformed-function-call recovery.

/// Strip control characters below 0x20 (except `\t`, `\n`, `\r`) and NUL
/// from a string destined for a payload. Valid input is returned borrowed.
pub fn sanitize_text(s: &str) -> String {
    if !has_problematic_chars(s) {
        return s.to_string();
    }
    s.chars()
        .filter(|&c| c == '\t' || c == '\n' || c == '\r' || c >= '\u{20}')
        .collect()
}

fn has_problematic_chars(s: &str) -> bool {
    s.chars()
        .any(|c| c == '\0' || (c < '\u{20}' && c != '\t' && c != '\n' && c != '\r'))
}

/// Strip one SSE `data:` prefix (with or without the space) from a line.
/// Non-SSE input is returned as-is; `event:` lines yield an empty slice.
pub fn extract_sse_data(raw: &[u8]) -> &[u8] {
    let trimmed = trim_ascii(raw);
    if let Some(rest) = trimmed.strip_prefix(b"data:") {
        return trim_ascii(rest);
    }
    if trimmed.starts_with(b"event:") {
        return b"";
    }
    trimmed
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

/// Normalise a tool-call args payload to a valid JSON string.
///
/// Accepts a JSON document or plain text; empty and unparseable input
/// becomes `"{}"`. Complete args only; streaming fragments must bypass
/// this.
pub fn validate_and_normalize_json(args: &str) -> String {
    let trimmed = args.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(_) => trimmed.to_string(),
        Err(_) => "{}".to_string(),
    }
}

/// Repair near-JSON the way lenient readers do: quote bare object keys,
/// convert single-quoted strings, and drop trailing commas. Content already
/// inside double-quoted strings is left alone.
pub fn repair_json(raw: &str) -> String {
    let quoted = quote_unquoted_keys(raw);
    let dequoted = convert_single_quoted_strings(&quoted);
    drop_trailing_commas(&dequoted)
}

// The repair passes walk raw bytes and only insert or remove ASCII, so
// multi-byte UTF-8 sequences pass through untouched.

fn convert_single_quoted_strings(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut in_double = false;
    let mut in_single = false;
    let mut escape = false;
    for &b in bytes {
        if escape {
            out.push(b);
            escape = false;
            continue;
        }
        if b == b'\\' && (in_double || in_single) {
            out.push(b);
            escape = true;
            continue;
        }
        if in_double {
            out.push(b);
            if b == b'"' {
                in_double = false;
            }
            continue;
        }
        if in_single {
            if b == b'\'' {
                out.push(b'"');
                in_single = false;
            } else if b == b'"' {
                out.push(b'\\');
                out.push(b'"');
            } else {
                out.push(b);
            }
            continue;
        }
        match b {
            b'"' => {
                in_double = true;
                out.push(b);
            }
            b'\'' => {
                in_single = true;
                out.push(b'"');
            }
            _ => out.push(b),
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}

fn quote_unquoted_keys(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len() + 8);
    let mut in_string = false;
    let mut escape = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            out.push(b);
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => {
                in_string = true;
                out.push(b);
                i += 1;
            }
            b'{' | b',' => {
                out.push(b);
                i += 1;
                // Look ahead for a bare identifier followed by ':'.
                let mut j = i;
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                let start = j;
                if j < bytes.len() && (bytes[j].is_ascii_alphabetic() || bytes[j] == b'_') {
                    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_')
                    {
                        j += 1;
                    }
                    let mut k = j;
                    while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                        k += 1;
                    }
                    if k < bytes.len() && bytes[k] == b':' {
                        out.extend_from_slice(&bytes[i..start]);
                        out.push(b'"');
                        out.extend_from_slice(&bytes[start..j]);
                        out.push(b'"');
                        i = j;
                        continue;
                    }
                }
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}

fn drop_trailing_commas(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut in_string = false;
    let mut escape = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            out.push(b);
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            out.push(b);
            i += 1;
            continue;
        }
        if b == b',' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j < bytes.len() && (bytes[j] == b'}' || bytes[j] == b']') {
                i += 1;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}

/// Find the index of the bracket matching the one at `start` (`{` or `[`),
/// honouring strings and escapes. Returns `None` when unbalanced.
pub fn find_matching_bracket(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let open = *bytes.get(start)?;
    let close = match open {
        b'{' => b'}',
        b'[' => b']',
        _ => return None,
    };
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        if escape {
            escape = false;
            continue;
        }
        if b == b'\\' && in_string {
            escape = true;
            continue;
        }
        if b == b'"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Recover a function call from a Gemini `MALFORMED_FUNCTION_CALL` message
/// of the shape `… call:namespace:name{…}`.
///
/// Returns `(name, args_json)`. The argument region is brace-balanced and
/// repaired (bare keys quoted, trailing commas dropped); failures return
/// `None` so the caller can fall back to a clean finish.
pub fn parse_malformed_function_call(message: &str) -> Option<(String, String)> {
    let call_idx = message.rfind("call:")?;
    let after = &message[call_idx + "call:".len()..];
    let brace_rel = after.find('{')?;
    let head = &after[..brace_rel];
    // The function name is the last ':'-separated segment before the brace.
    let name = head
        .rsplit(':')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();
    let brace_abs = call_idx + "call:".len() + brace_rel;
    let end = find_matching_bracket(message, brace_abs)?;
    let raw_args = &message[brace_abs..=end];
    let repaired = repair_json(raw_args);
    if serde_json::from_str::<serde_json::Value>(&repaired).is_err() {
        return None;
    }
    Some((name, repaired))
}
