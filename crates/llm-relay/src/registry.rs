// Provider-prefixed model IDs: clients display "[Gemini CLI] gemini-2.5-pro"
// and the proxy routes on the decoded (model, provider) pair.

/// Parse a model ID with an optional visual provider prefix.
///
/// `"[Gemini CLI] gemini-2.5-pro"` -> `("gemini-2.5-pro", "gemini-cli")`;
/// `"gemini-2.5-pro"` -> `("gemini-2.5-pro", "")`.
pub fn parse_provider_prefixed_model_id(model_id: &str) -> (String, String) {
    let model_id = model_id.trim();
    if model_id.is_empty() {
        return (String::new(), String::new());
    }
    if !model_id.starts_with('[') {
        return (model_id.to_string(), String::new());
    }

    let Some(idx) = model_id.find(']') else {
        return (model_id.to_string(), String::new());
    };
    if idx <= 1 || idx + 1 >= model_id.len() {
        return (model_id.to_string(), String::new());
    }

    let label = model_id[1..idx].trim();
    let normalized = model_id[idx + 1..].trim();
    if normalized.is_empty() {
        return (model_id.to_string(), String::new());
    }

    (normalized.to_string(), label_to_provider_id(label))
}

/// Format a (provider, model) pair back into the display form.
pub fn format_provider_prefixed_model_id(provider: &str, model_id: &str) -> String {
    let provider = provider.trim();
    let model_id = model_id.trim();
    if provider.is_empty() || model_id.is_empty() {
        return model_id.to_string();
    }
    format!("[{}] {}", provider_id_to_label(provider), model_id)
}

fn provider_id_to_label(provider: &str) -> String {
    match provider.to_ascii_lowercase().as_str() {
        "gemini-cli" => "Gemini CLI".to_string(),
        "antigravity" => "Antigravity".to_string(),
        "vertex" => "Vertex".to_string(),
        "aistudio" => "AI Studio".to_string(),
        "claude" => "Claude".to_string(),
        "codex" => "Codex".to_string(),
        "cline" => "Cline".to_string(),
        "qwen" => "Qwen".to_string(),
        "kiro" => "Kiro".to_string(),
        "openai" | "openai-compatibility" => "OpenAI".to_string(),
        _ => provider.to_string(),
    }
}

fn label_to_provider_id(label: &str) -> String {
    match label.trim().to_ascii_lowercase().as_str() {
        "gemini cli" => "gemini-cli".to_string(),
        "antigravity" => "antigravity".to_string(),
        "vertex" => "vertex".to_string(),
        "ai studio" => "aistudio".to_string(),
        "claude" => "claude".to_string(),
        "codex" => "codex".to_string(),
        "cline" => "cline".to_string(),
        "qwen" => "qwen".to_string(),
        "kiro" => "kiro".to_string(),
        "openai" => "openai".to_string(),
        other => other.replace(' ', "-"),
    }
}

/// Whether a model is a Claude thinking variant routed through the
/// Gemini-family endpoints (Antigravity serves Claude models).
pub fn is_claude_thinking_model(model: &str) -> bool {
    let lower = model.to_ascii_lowercase();
    lower.contains("claude") && (lower.contains("thinking") || lower.contains("extended"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_prefix() {
        let (model, provider) = parse_provider_prefixed_model_id("[Gemini CLI] gemini-2.5-pro");
        assert_eq!(model, "gemini-2.5-pro");
        assert_eq!(provider, "gemini-cli");
    }

    #[test]
    fn test_parse_without_prefix() {
        let (model, provider) = parse_provider_prefixed_model_id("gemini-2.5-pro");
        assert_eq!(model, "gemini-2.5-pro");
        assert_eq!(provider, "");
    }

    #[test]
    fn test_parse_malformed_prefix() {
        let (model, provider) = parse_provider_prefixed_model_id("[] gemini");
        assert_eq!(model, "[] gemini");
        assert_eq!(provider, "");
        let (model, provider) = parse_provider_prefixed_model_id("[Claude]");
        assert_eq!(model, "[Claude]");
        assert_eq!(provider, "");
    }

    #[test]
    fn test_unknown_label_slugged() {
        let (_, provider) = parse_provider_prefixed_model_id("[My Proxy] some-model");
        assert_eq!(provider, "my-proxy");
    }

    #[test]
    fn test_format_roundtrip() {
        let formatted = format_provider_prefixed_model_id("antigravity", "claude-sonnet-4");
        assert_eq!(formatted, "[Antigravity] claude-sonnet-4");
        let (model, provider) = parse_provider_prefixed_model_id(&formatted);
        assert_eq!(model, "claude-sonnet-4");
        assert_eq!(provider, "antigravity");
    }

    #[test]
    fn test_claude_thinking_model() {
        assert!(is_claude_thinking_model("claude-sonnet-4-thinking"));
        assert!(!is_claude_thinking_model("claude-sonnet-4"));
        assert!(!is_claude_thinking_model("gemini-2.5-pro"));
    }
}
