use serde::{Deserialize, Serialize};

/// Token accounting, normalised across providers.
///
/// When a provider reports cached tokens, `prompt_tokens` excludes them
/// (the Gemini parser subtracts `cachedContentTokenCount` before storing).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub thoughts_token_count: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cached_tokens: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub audio_tokens: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub accepted_prediction_tokens: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rejected_prediction_tokens: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Opaque per-turn response metadata carried alongside the IR messages so
/// emitters can reuse upstream identity and native finish labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_id: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub create_time: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub native_finish_reason: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub thoughts_token_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_details_omitted() {
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            ..Default::default()
        };
        let json = serde_json::to_string(&usage).unwrap();
        assert!(!json.contains("cached_tokens"));
        assert!(!json.contains("thoughts_token_count"));
    }

    #[test]
    fn test_meta_roundtrip() {
        let meta = ResponseMeta {
            response_id: "resp_1".into(),
            native_finish_reason: "STOP".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: ResponseMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back.response_id, "resp_1");
        assert_eq!(back.create_time, 0);
    }
}
