// Identifier generation and the signature-in-ID round-trip codec.

/// Lowercase UUID v4.
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Tool-call ID with the default `call` prefix: `call-<8hex>`.
pub fn gen_tool_call_id() -> String {
    gen_tool_call_id_with_name("call")
}

/// Tool-call ID carrying the function name: `<name>-<8hex>`.
pub fn gen_tool_call_id_with_name(name: &str) -> String {
    format!("{}-{}", name, &generate_uuid()[..8])
}

/// Claude-compatible tool-call ID: `toolu-<8hex>`.
pub fn gen_claude_tool_call_id() -> String {
    gen_tool_call_id_with_name("toolu")
}

const SIG_MARKER: &str = "|sig:";
const SIG_MARKER_LONG: &str = "__thought__";

/// Pack a thought signature into a tool call ID so it survives clients
/// that strip custom fields. Format: `<id>|sig:<signature>`.
pub fn encode_tool_id_with_signature(id: &str, signature: &str) -> String {
    let id = id.trim();
    let signature = signature.trim();
    if signature.is_empty() {
        return id.to_string();
    }
    let id = if id.is_empty() { "tool" } else { id };
    format!("{id}{SIG_MARKER}{signature}")
}

/// Unpack an encoded tool call ID. Both the `|sig:` form and the long
/// `__thought__` form are recognised; plain IDs pass through unchanged.
pub fn decode_tool_id_and_signature(encoded: &str) -> (String, String) {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return (String::new(), String::new());
    }
    if let Some(idx) = encoded.find(SIG_MARKER) {
        let id = encoded[..idx].trim().to_string();
        let sig = encoded[idx + SIG_MARKER.len()..].trim().to_string();
        return (id, sig);
    }
    if let Some(idx) = encoded.find(SIG_MARKER_LONG) {
        let id = encoded[..idx].to_string();
        let sig = encoded[idx + SIG_MARKER_LONG.len()..].to_string();
        return (id, sig);
    }
    (encoded.to_string(), String::new())
}
