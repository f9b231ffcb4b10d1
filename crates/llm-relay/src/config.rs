// YAML-addressed payload rules applied over emitter output.
//
// Default rules set a value only when the path is absent; override rules
// always set. Rules match on (model name pattern, protocol), and paths are
// applied under the `request.` root for enveloped formats.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use llm_relay_types::Error;

/// Top-level configuration: payload rules plus room for future sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub payload: PayloadConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadConfig {
    #[serde(default)]
    pub default: Vec<PayloadRule>,
    #[serde(default, rename = "override")]
    pub override_: Vec<PayloadRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadRule {
    #[serde(default)]
    pub models: Vec<ModelMatcher>,
    /// JSON-path (dot separated) -> value to set.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMatcher {
    pub name: String,
    #[serde(default)]
    pub protocol: String,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::configuration(format!("invalid payload config: {e}")))
    }

    /// Apply default+override rules to an emitted payload. Paths are
    /// prefixed with `request.` when `enveloped` (Gemini CLI/Antigravity
    /// wrap the Gemini JSON in an envelope).
    pub fn apply_payload_rules(
        &self,
        model: &str,
        protocol: &str,
        payload: &mut Value,
        enveloped: bool,
    ) {
        let prefix = if enveloped { "request." } else { "" };
        for rule in &self.payload.default {
            if rule.matches(model, protocol) {
                for (path, value) in &rule.params {
                    let full = format!("{prefix}{path}");
                    if get_path(payload, &full).is_none() {
                        set_path(payload, &full, value.clone());
                    }
                }
            }
        }
        for rule in &self.payload.override_ {
            if rule.matches(model, protocol) {
                for (path, value) in &rule.params {
                    let full = format!("{prefix}{path}");
                    set_path(payload, &full, value.clone());
                }
            }
        }
    }
}

impl PayloadRule {
    fn matches(&self, model: &str, protocol: &str) -> bool {
        self.models.iter().any(|m| {
            (m.protocol.is_empty() || m.protocol == protocol) && matches_pattern(&m.name, model)
        })
    }
}

/// `*` wildcard matching: exact, `*`, prefix-`*`, `*`-suffix, `*…*`.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    if pattern == name || pattern == "*" {
        return true;
    }
    if let Some(inner) = pattern
        .strip_prefix('*')
        .and_then(|p| p.strip_suffix('*'))
    {
        return name.contains(inner);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    false
}

/// Read a dot-separated path from a JSON value.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set a dot-separated path in a JSON value, creating intermediate
/// objects. Non-object intermediates are replaced.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) {
    let mut current = value;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        if i == segments.len() - 1 {
            map.insert(segment.to_string(), new_value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("*", "anything"));
        assert!(matches_pattern("gemini-2.5-pro", "gemini-2.5-pro"));
        assert!(matches_pattern("gemini-*", "gemini-2.5-pro"));
        assert!(matches_pattern("*-pro", "gemini-2.5-pro"));
        assert!(matches_pattern("*2.5*", "gemini-2.5-pro"));
        assert!(!matches_pattern("claude-*", "gemini-2.5-pro"));
    }

    #[test]
    fn test_set_and_get_path() {
        let mut payload = json!({"request": {"generationConfig": {"topP": 0.9}}});
        set_path(&mut payload, "request.generationConfig.temperature", json!(0.5));
        assert_eq!(
            get_path(&payload, "request.generationConfig.temperature"),
            Some(&json!(0.5))
        );
        assert_eq!(
            get_path(&payload, "request.generationConfig.topP"),
            Some(&json!(0.9))
        );
        assert!(get_path(&payload, "request.missing.path").is_none());
    }

    #[test]
    fn test_default_rule_does_not_clobber() {
        let yaml = r#"
payload:
  default:
    - models:
        - name: "gemini-*"
          protocol: "gemini"
      params:
        generationConfig.temperature: 0.7
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let mut payload = json!({"request": {"generationConfig": {"temperature": 0.2}}});
        config.apply_payload_rules("gemini-2.5-pro", "gemini", &mut payload, true);
        assert_eq!(
            get_path(&payload, "request.generationConfig.temperature"),
            Some(&json!(0.2))
        );

        let mut empty = json!({"request": {}});
        config.apply_payload_rules("gemini-2.5-pro", "gemini", &mut empty, true);
        assert_eq!(
            get_path(&empty, "request.generationConfig.temperature"),
            Some(&json!(0.7))
        );
    }

    #[test]
    fn test_override_rule_always_sets() {
        let yaml = r#"
payload:
  override:
    - models:
        - name: "*"
      params:
        generationConfig.topK: 40
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let mut payload = json!({"generationConfig": {"topK": 5}});
        config.apply_payload_rules("any-model", "gemini", &mut payload, false);
        assert_eq!(get_path(&payload, "generationConfig.topK"), Some(&json!(40)));
    }

    #[test]
    fn test_protocol_mismatch_skips_rule() {
        let yaml = r#"
payload:
  override:
    - models:
        - name: "*"
          protocol: "claude"
      params:
        max_tokens: 1
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let mut payload = json!({});
        config.apply_payload_rules("m", "gemini", &mut payload, false);
        assert!(get_path(&payload, "max_tokens").is_none());
    }
}
