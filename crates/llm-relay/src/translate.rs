// The translation façade: entry points that combine parsers, emitters and
// the stream state machine by (source, target) pair, plus auto-dispatch by
// provider name.

use serde_json::Value;

use llm_relay_types::{
    Error, Message, ResponseMeta, ThinkingConfig, UnifiedEvent, UnifiedRequest, Usage,
};

use crate::config::Config;
use crate::from_ir;
use crate::stream::UnifiedStreamState;
use crate::to_ir;
use crate::to_ir::antigravity::ToolSchemaContext;

/// A wire protocol endpoint, as named in provider configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    OpenAI,
    /// OpenAI Responses API.
    Responses,
    Claude,
    Gemini,
    GeminiCli,
    Antigravity,
    AiStudio,
    Codex,
    Cline,
    Ollama,
    Kiro,
}

impl Format {
    pub fn from_provider(name: &str) -> Option<Self> {
        Some(match name {
            "openai" => Format::OpenAI,
            "openai-responses" | "responses" => Format::Responses,
            "claude" => Format::Claude,
            "gemini" => Format::Gemini,
            "gemini-cli" => Format::GeminiCli,
            "antigravity" => Format::Antigravity,
            "aistudio" => Format::AiStudio,
            "codex" => Format::Codex,
            "cline" => Format::Cline,
            "ollama" => Format::Ollama,
            "kiro" => Format::Kiro,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::OpenAI => "openai",
            Format::Responses => "openai-responses",
            Format::Claude => "claude",
            Format::Gemini => "gemini",
            Format::GeminiCli => "gemini-cli",
            Format::Antigravity => "antigravity",
            Format::AiStudio => "aistudio",
            Format::Codex => "codex",
            Format::Cline => "cline",
            Format::Ollama => "ollama",
            Format::Kiro => "kiro",
        }
    }

    /// Whether the emitted request wraps the payload in an envelope whose
    /// inner document lives under `request.`.
    pub fn enveloped(&self) -> bool {
        matches!(self, Format::GeminiCli | Format::Antigravity)
    }
}

/// Parse a client request in `from` format into the IR, applying the model
/// override and metadata (including thinking overrides).
pub fn parse_request_to_ir(
    from: Format,
    model: &str,
    payload: &[u8],
    metadata: Option<serde_json::Map<String, Value>>,
) -> Result<UnifiedRequest, Error> {
    let mut req = match from {
        Format::OpenAI | Format::Cline => to_ir::openai::parse_openai_request(payload)?,
        Format::Responses | Format::Codex => to_ir::openai::parse_responses_request(payload)?,
        Format::Claude => to_ir::claude::parse_claude_request(payload)?,
        Format::Ollama => to_ir::ollama::parse_ollama_request(payload)?,
        Format::Gemini | Format::AiStudio => to_ir::gemini::parse_gemini_request(payload)?,
        Format::GeminiCli | Format::Antigravity => {
            let root: Value = serde_json::from_slice(payload)?;
            match root.get("request") {
                Some(inner) => {
                    to_ir::gemini::parse_gemini_request(&serde_json::to_vec(inner)?)?
                }
                None => to_ir::gemini::parse_gemini_request(payload)?,
            }
        }
        Format::Kiro => {
            return Err(Error::unsupported_translation("kiro", "ir"));
        }
    };

    if !model.is_empty() {
        req.model = model.to_string();
    }
    if let Some(metadata) = metadata {
        for (k, v) in metadata {
            req.metadata.insert(k, v);
        }
        apply_thinking_overrides(&mut req);
    }

    Ok(req)
}

/// `metadata.thinking_budget` / `metadata.include_thoughts` override the
/// parsed thinking config.
fn apply_thinking_overrides(req: &mut UnifiedRequest) {
    let budget = req
        .metadata
        .get("thinking_budget")
        .and_then(Value::as_i64);
    let include = req
        .metadata
        .get("include_thoughts")
        .and_then(Value::as_bool);
    if budget.is_none() && include.is_none() {
        return;
    }
    let thinking = req.thinking.get_or_insert_with(ThinkingConfig::default);
    if let Some(budget) = budget {
        thinking.budget = budget;
    }
    if let Some(include) = include {
        thinking.include_thoughts = include;
    }
}

/// Emit the IR request in `to` format.
pub fn emit_request(to: Format, req: &UnifiedRequest) -> Result<Vec<u8>, Error> {
    match to {
        Format::Gemini | Format::AiStudio => from_ir::gemini::convert_gemini_request(req),
        Format::GeminiCli => from_ir::gemini::convert_gemini_cli_request(req),
        Format::Antigravity => from_ir::antigravity::convert_antigravity_request(req),
        Format::Claude => from_ir::claude::convert_claude_request(req),
        Format::OpenAI | Format::Cline => from_ir::openai::convert_openai_request(req),
        Format::Responses => from_ir::openai::convert_openai_request_fmt(
            req,
            from_ir::openai::OpenAIRequestFormat::ResponsesApi,
        ),
        Format::Codex => from_ir::codex::convert_codex_request(req),
        Format::Kiro => from_ir::kiro::convert_kiro_request(req),
        Format::Ollama => Err(Error::unsupported_translation("ir", "ollama")),
    }
}

/// Translate a client request into an upstream request: parse, apply
/// overrides, emit, then post-process with payload rules.
pub fn translate_request(
    config: Option<&Config>,
    from: Format,
    to: Format,
    model: &str,
    payload: &[u8],
    streaming: bool,
    metadata: Option<serde_json::Map<String, Value>>,
) -> Result<Vec<u8>, Error> {
    let req = parse_request_to_ir(from, model, payload, metadata)?;
    let emitted = emit_request(to, &req)?;

    let mut value: Value = serde_json::from_slice(&emitted)?;

    if streaming && matches!(to, Format::Claude | Format::OpenAI | Format::Cline | Format::Codex | Format::Responses)
    {
        if let Some(obj) = value.as_object_mut() {
            obj.insert("stream".into(), Value::Bool(true));
        }
    }

    if let Some(config) = config {
        config.apply_payload_rules(model, protocol_label(to), &mut value, to.enveloped());
    }

    Ok(serde_json::to_vec(&value)?)
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
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

fn protocol_label(format: Format) -> &'static str {
    match format {
        Format::Gemini | Format::GeminiCli | Format::Antigravity | Format::AiStudio => "gemini",
        Format::Claude => "claude",
        Format::OpenAI | Format::Cline | Format::Responses | Format::Codex => "openai",
        Format::Ollama => "ollama",
        Format::Kiro => "kiro",
    }
}

/// Parse an upstream non-streaming response by provider name.
pub fn parse_response_auto(
    provider: &str,
    payload: &[u8],
) -> Result<(Vec<Message>, Option<Usage>, ResponseMeta), Error> {
    match provider {
        "gemini-cli" | "antigravity" => {
            to_ir::antigravity::parse_antigravity_response_meta(payload, None)
        }
        "gemini" | "aistudio" => to_ir::gemini::parse_gemini_response_meta(payload, None),
        "claude" => {
            let (messages, usage) = to_ir::claude::parse_claude_response(payload)?;
            Ok((messages, usage, ResponseMeta::default()))
        }
        "openai" | "cline" | "ollama" => {
            let (messages, usage) = to_ir::openai::parse_openai_response(payload)?;
            Ok((messages, usage, ResponseMeta::default()))
        }
        "codex" => {
            let (messages, usage) = to_ir::codex::parse_codex_response(payload)?;
            Ok((messages, usage, ResponseMeta::default()))
        }
        "kiro" => {
            let (messages, usage) = to_ir::kiro::parse_kiro_response(payload)?;
            Ok((messages, usage, ResponseMeta::default()))
        }
        other => Err(Error::unsupported_translation(other, "ir")),
    }
}

/// Translate an upstream non-streaming response into the client format.
pub fn translate_response_non_stream_auto(
    provider: &str,
    to: Format,
    payload: &[u8],
    model: &str,
) -> Result<Vec<u8>, Error> {
    // Same-protocol passthrough.
    if provider == "claude" && to == Format::Claude {
        return Ok(payload.to_vec());
    }

    let (messages, usage, meta) = parse_response_auto(provider, payload)?;

    let message_id = if meta.response_id.is_empty() {
        format!("chatcmpl-{model}")
    } else {
        meta.response_id.clone()
    };

    match to {
        Format::OpenAI | Format::Cline => from_ir::openai::to_openai_chat_completion(
            &messages,
            usage.as_ref(),
            model,
            &message_id,
            Some(&meta),
        ),
        Format::Responses | Format::Codex => from_ir::openai::to_responses_api_response(
            &messages,
            usage.as_ref(),
            model,
            Some(&meta),
        ),
        Format::Claude => from_ir::claude::to_claude_response(
            &messages,
            usage.as_ref(),
            model,
            &format!("msg-{model}"),
        ),
        Format::Ollama => from_ir::ollama::to_ollama_chat_response(&messages, usage.as_ref(), model),
        Format::Gemini | Format::AiStudio => {
            from_ir::gemini::to_gemini_response(&messages, usage.as_ref(), model)
        }
        other => Err(Error::unsupported_translation(provider, other.as_str())),
    }
}

/// Per-stream translation context for one upstream response.
pub struct StreamTranslator {
    provider: String,
    target: Format,
    model: String,
    message_id: String,
    state: UnifiedStreamState,
    claude_parser: to_ir::claude::ClaudeChunkState,
    kiro_parser: to_ir::kiro::KiroStreamState,
    schema_ctx: Option<ToolSchemaContext>,
    session_id: String,
    kiro_finished: bool,
}

impl StreamTranslator {
    pub fn new(provider: &str, target: Format, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            target,
            model: model.to_string(),
            message_id: format!("chatcmpl-{model}"),
            state: UnifiedStreamState::new(),
            claude_parser: to_ir::claude::ClaudeChunkState::new(),
            kiro_parser: to_ir::kiro::KiroStreamState::new(),
            schema_ctx: None,
            session_id: String::new(),
            kiro_finished: false,
        }
    }

    /// Attach a tool-schema context built from the original client
    /// request (Antigravity argument normalisation).
    pub fn with_schema_context(mut self, original_request: &[u8]) -> Self {
        self.schema_ctx = ToolSchemaContext::from_request_json(original_request);
        self
    }

    /// Attach the conversation's session id so valid thought signatures
    /// observed on this stream refresh the continuity cache.
    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = session_id.trim().to_string();
        self
    }

    /// Translate one upstream chunk into zero or more client chunks.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        // OpenAI upstream to a Codex client is a byte passthrough: the
        // upstream SSE is already correct and must never be re-parsed.
        if self.provider == "openai" && self.target == Format::Codex {
            let trimmed = trim_ascii_whitespace(chunk);
            if trimmed.is_empty() || trimmed == b"data: [DONE]" || trimmed == b"[DONE]" {
                return Ok(Vec::new());
            }
            return Ok(vec![trimmed.to_vec()]);
        }

        let events = self.parse_events(chunk)?;
        if !self.session_id.is_empty() {
            for event in &events {
                let sig = event
                    .thought_signature
                    .as_deref()
                    .or_else(|| {
                        event
                            .tool_call
                            .as_ref()
                            .and_then(|tc| tc.thought_signature.as_deref())
                    })
                    .unwrap_or("");
                if !sig.is_empty() && sig != crate::cache::SKIP_THOUGHT_SIGNATURE_VALIDATOR {
                    crate::cache::cache_session_thought_signature(&self.session_id, sig);
                }
            }
        }
        self.convert(events)
    }

    fn parse_events(&mut self, chunk: &[u8]) -> Result<Vec<UnifiedEvent>, Error> {
        match self.provider.as_str() {
            "gemini-cli" | "antigravity" => to_ir::antigravity::parse_antigravity_chunk_with_context(
                chunk,
                self.schema_ctx.as_ref(),
            ),
            "gemini" | "aistudio" => {
                to_ir::gemini::parse_gemini_chunk_with_context(chunk, self.schema_ctx.as_ref())
            }
            "claude" => self.claude_parser.process_chunk(chunk),
            "openai" | "cline" | "ollama" => to_ir::openai::parse_openai_chunk(chunk),
            "codex" => to_ir::codex::parse_codex_chunk(chunk),
            "kiro" => self.kiro_parser.process_chunk(chunk),
            other => Err(Error::unsupported_translation(other, "ir")),
        }
    }

    fn convert(&mut self, events: Vec<UnifiedEvent>) -> Result<Vec<Vec<u8>>, Error> {
        self.state
            .convert_events(events, self.target, &self.model, &self.message_id)
    }

    /// Kiro streams carry no finish frame; synthesize one when the
    /// upstream body ends.
    pub fn finalize(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        if self.provider != "kiro" || self.kiro_finished {
            return Ok(Vec::new());
        }
        self.kiro_finished = true;
        let reason = self.kiro_parser.determine_finish_reason();
        let usage = self.kiro_parser.usage.clone();
        let finish = UnifiedEvent::finish(reason, usage);
        self.convert(vec![finish])
    }

    pub fn finish_sent(&self) -> bool {
        self.state.finish_sent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_round() {
        for name in [
            "gemini-cli",
            "antigravity",
            "gemini",
            "aistudio",
            "claude",
            "openai",
            "codex",
            "cline",
            "ollama",
        ] {
            let format = Format::from_provider(name).unwrap();
            assert_eq!(format.as_str(), name);
        }
        assert!(Format::from_provider("unknown").is_none());
    }

    #[test]
    fn test_openai_to_gemini_request() {
        let payload = json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"}
            ]
        });
        let bytes = translate_request(
            None,
            Format::OpenAI,
            Format::Gemini,
            "gemini-2.5-pro",
            payload.to_string().as_bytes(),
            false,
            None,
        )
        .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_claude_to_openai_request_stream_flag() {
        let payload = json!({
            "model": "claude-sonnet-4",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "hi"}]
        });
        let bytes = translate_request(
            None,
            Format::Claude,
            Format::OpenAI,
            "gpt-4o",
            payload.to_string().as_bytes(),
            true,
            None,
        )
        .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "gpt-4o");
    }

    #[test]
    fn test_metadata_thinking_override() {
        let payload = json!({
            "model": "x",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let mut metadata = serde_json::Map::new();
        metadata.insert("thinking_budget".into(), json!(2048));
        metadata.insert("include_thoughts".into(), json!(true));
        let req = parse_request_to_ir(
            Format::OpenAI,
            "m",
            payload.to_string().as_bytes(),
            Some(metadata),
        )
        .unwrap();
        let thinking = req.thinking.unwrap();
        assert_eq!(thinking.budget, 2048);
        assert!(thinking.include_thoughts);
    }

    #[test]
    fn test_unsupported_pair_is_typed_error() {
        let err = emit_request(
            Format::Ollama,
            &UnifiedRequest::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, llm_relay_types::ErrorKind::UnsupportedTranslation);
    }

    #[test]
    fn test_gemini_response_to_openai() {
        let payload = json!({
            "responseId": "r-9",
            "candidates": [{"content": {"parts": [{"text": "out"}]},
                "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 2, "candidatesTokenCount": 1,
                "totalTokenCount": 3}
        });
        let bytes = translate_response_non_stream_auto(
            "gemini",
            Format::OpenAI,
            payload.to_string().as_bytes(),
            "gemini-2.5-pro",
        )
        .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["id"], "r-9");
        assert_eq!(body["choices"][0]["message"]["content"], "out");
        assert_eq!(body["choices"][0]["native_finish_reason"], "STOP");
    }

    #[test]
    fn test_claude_passthrough() {
        let payload = br#"{"content":[{"type":"text","text":"x"}]}"#;
        let bytes =
            translate_response_non_stream_auto("claude", Format::Claude, payload, "m").unwrap();
        assert_eq!(bytes, payload);
    }

    #[test]
    fn test_codex_passthrough_stream() {
        let mut translator = StreamTranslator::new("openai", Format::Codex, "m");
        let chunk = b"event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"x\"}\n\n";
        let out = translator.process_chunk(chunk).unwrap();
        assert_eq!(out.len(), 1);
        // Raw bytes forwarded, trailing whitespace trimmed, not re-framed.
        assert!(out[0].starts_with(b"event: response.output_text.delta"));

        assert!(translator.process_chunk(b"data: [DONE]").unwrap().is_empty());
    }

    #[test]
    fn test_stream_observes_thought_signatures() {
        let sig = "q".repeat(64);
        let mut translator = StreamTranslator::new("gemini", Format::OpenAI, "gemini-2.5-pro")
            .with_session_id("sess-observe");
        let chunk = json!({
            "candidates": [{"content": {"parts": [
                {"text": "deep", "thought": true, "thoughtSignature": sig}
            ]}}]
        });
        translator
            .process_chunk(chunk.to_string().as_bytes())
            .unwrap();
        assert_eq!(
            crate::cache::get_session_thought_signature("sess-observe"),
            sig
        );
    }

    #[test]
    fn test_kiro_finalize_synthesizes_finish() {
        let mut translator = StreamTranslator::new("kiro", Format::OpenAI, "m");
        let chunk = json!({"assistantResponseEvent": {"content": "hello"}});
        let chunks = translator.process_chunk(chunk.to_string().as_bytes()).unwrap();
        assert_eq!(chunks.len(), 1);
        let finish = translator.finalize().unwrap();
        assert_eq!(finish.len(), 1);
        let body: Value = serde_json::from_slice(&finish[0]).unwrap();
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        // Finalize twice is a no-op.
        assert!(translator.finalize().unwrap().is_empty());
    }
}
