use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::tool::{FunctionCallingConfig, ToolDefinition};

/// The canonical request every inbound protocol parses into and every
/// outbound protocol emits from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    // Generation controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modality: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    /// `auto` | `none` | `required` | `any` | a specific tool name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_choice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_calling: Option<FunctionCallingConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<SafetySetting>,

    // Responses-API-only surface.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_response_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_variables: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt_cache_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,

    /// Free-form provider-specific keys: `session_id`, `project_id`,
    /// `request_type`, `origin`, `google_search`, `idempotency_key`,
    /// `user_agent`, `thinking_budget`, `include_thoughts`, `raw_request`.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl UnifiedRequest {
    /// String-valued metadata key, trimmed; empty string when absent.
    pub fn meta_str(&self, key: &str) -> &str {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("")
    }

    /// Whether thinking output is requested at all.
    pub fn thinking_enabled(&self) -> bool {
        self.thinking
            .as_ref()
            .map(|t| t.include_thoughts || t.budget > 0)
            .unwrap_or(false)
    }
}

/// Reasoning configuration.
///
/// Budget and effort are two views of the same knob; the fixed mapping is
/// `effort_to_budget` / `budget_to_effort` below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// Token budget: 0 = off, -1 = auto.
    #[serde(default)]
    pub budget: i64,
    #[serde(default)]
    pub include_thoughts: bool,
    /// `none|minimal|low|medium|high|xhigh|auto` or empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub effort: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

impl ThinkingConfig {
    /// Effort string -> (budget, include_thoughts).
    pub fn effort_to_budget(effort: &str) -> (i64, bool) {
        match effort {
            "none" => (0, false),
            "auto" => (-1, true),
            "minimal" => (512, true),
            "low" => (1024, true),
            "medium" => (8192, true),
            "high" => (24576, true),
            "xhigh" => (32768, true),
            _ => (-1, true),
        }
    }

    /// Budget -> effort string; `default_for_zero` covers budget <= 0.
    pub fn budget_to_effort(budget: i64, default_for_zero: &str) -> String {
        if budget <= 0 {
            return default_for_zero.to_string();
        }
        if budget <= 1024 {
            return "low".to_string();
        }
        if budget <= 8192 {
            return "medium".to_string();
        }
        "high".to_string()
    }
}

/// A Gemini safety-settings entry carried through verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Image generation knobs (Antigravity image_gen, Gemini image preview).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aspect_ratio: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_size: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effort_budget_mapping() {
        assert_eq!(ThinkingConfig::effort_to_budget("none"), (0, false));
        assert_eq!(ThinkingConfig::effort_to_budget("low"), (1024, true));
        assert_eq!(ThinkingConfig::effort_to_budget("medium"), (8192, true));
        assert_eq!(ThinkingConfig::effort_to_budget("high"), (24576, true));
        assert_eq!(ThinkingConfig::effort_to_budget("weird"), (-1, true));
    }

    #[test]
    fn test_budget_effort_mapping() {
        assert_eq!(ThinkingConfig::budget_to_effort(0, "auto"), "auto");
        assert_eq!(ThinkingConfig::budget_to_effort(-1, "none"), "none");
        assert_eq!(ThinkingConfig::budget_to_effort(800, "auto"), "low");
        assert_eq!(ThinkingConfig::budget_to_effort(1024, "auto"), "low");
        assert_eq!(ThinkingConfig::budget_to_effort(8192, "auto"), "medium");
        assert_eq!(ThinkingConfig::budget_to_effort(9000, "auto"), "high");
    }

    #[test]
    fn test_meta_str() {
        let mut req = UnifiedRequest::default();
        req.metadata
            .insert("session_id".into(), serde_json::json!("  abc  "));
        assert_eq!(req.meta_str("session_id"), "abc");
        assert_eq!(req.meta_str("missing"), "");
    }

    #[test]
    fn test_thinking_enabled() {
        let mut req = UnifiedRequest::default();
        assert!(!req.thinking_enabled());
        req.thinking = Some(ThinkingConfig {
            budget: 1024,
            ..Default::default()
        });
        assert!(req.thinking_enabled());
    }
}
