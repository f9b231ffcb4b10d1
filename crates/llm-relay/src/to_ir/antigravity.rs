// Antigravity v1internal parsers. Antigravity wraps Gemini payloads in an
// envelope `{"response": {...}, "traceId": "..."}`; unwrap and delegate.
//
// Antigravity also has a known quirk: the model may ignore the declared
// parameter schema and return renamed or string-typed arguments. The
// ToolSchemaContext built from the original client request lets the parser
// normalise names and argument types on the way back.

use std::collections::HashMap;

use serde_json::Value;

use llm_relay_types::{Error, Message, ResponseMeta, UnifiedEvent, Usage};

use super::gemini::{parse_gemini_chunk_with_context, parse_gemini_response_meta};
use super::openai::str_at;
use crate::util::args::{fix_tool_call_args, normalize_function_name, reverse_transform_args};
use crate::util::text::extract_sse_data;

/// Tool name -> parameter schema, extracted from the original request.
#[derive(Debug, Default, Clone)]
pub struct ToolSchemaContext {
    schemas: HashMap<String, Value>,
}

impl ToolSchemaContext {
    /// Build from the raw client request. Understands the OpenAI nested
    /// shape, the flat Responses shape, and Gemini functionDeclarations.
    pub fn from_request_json(original_request: &[u8]) -> Option<Self> {
        let root: Value = serde_json::from_slice(original_request).ok()?;
        let tools = root.get("tools")?.as_array()?;
        let mut schemas = HashMap::new();
        for tool in tools {
            if let Some(decls) = tool.get("functionDeclarations").and_then(Value::as_array) {
                for decl in decls {
                    insert_schema(&mut schemas, decl, "parameters");
                }
                continue;
            }
            if let Some(function) = tool.get("function") {
                insert_schema(&mut schemas, function, "parameters");
                continue;
            }
            if tool.get("input_schema").is_some() {
                insert_schema(&mut schemas, tool, "input_schema");
                continue;
            }
            insert_schema(&mut schemas, tool, "parameters");
        }
        if schemas.is_empty() {
            return None;
        }
        Some(Self { schemas })
    }

    /// Map a possibly mangled function name back to a declared one. Exact
    /// matches win; otherwise the Gemini-normalised form of a declared
    /// name is accepted.
    pub fn resolve_name(&self, name: &str) -> String {
        if self.schemas.contains_key(name) {
            return name.to_string();
        }
        for declared in self.schemas.keys() {
            if normalize_function_name(declared) == name {
                return declared.clone();
            }
        }
        name.to_string()
    }

    /// Normalise argument types: first undo the everything-is-a-string
    /// encoding, then coerce against the declared schema. Unparseable
    /// args pass through untouched.
    pub fn fix_args(&self, name: &str, args: &str) -> String {
        let Ok(parsed) = serde_json::from_str::<Value>(args) else {
            return args.to_string();
        };
        let mut transformed = reverse_transform_args(parsed);
        if let (Some(schema), Value::Object(args_map)) = (
            self.schemas.get(name).and_then(Value::as_object),
            &mut transformed,
        ) {
            fix_tool_call_args(args_map, schema);
        }
        transformed.to_string()
    }
}

fn insert_schema(schemas: &mut HashMap<String, Value>, obj: &Value, schema_key: &str) {
    let name = str_at(obj, "name");
    if name.is_empty() {
        return;
    }
    if let Some(schema) = obj.get(schema_key) {
        schemas.insert(name.to_string(), schema.clone());
    }
}

/// Parse a non-streaming Antigravity response.
pub fn parse_antigravity_response(
    raw: &[u8],
) -> Result<(Vec<Message>, Option<Usage>), Error> {
    let (messages, usage, _) = parse_antigravity_response_meta(raw, None)?;
    Ok((messages, usage))
}

/// Parse a non-streaming Antigravity response with metadata and an
/// optional schema context.
pub fn parse_antigravity_response_meta(
    raw: &[u8],
    schema_ctx: Option<&ToolSchemaContext>,
) -> Result<(Vec<Message>, Option<Usage>, ResponseMeta), Error> {
    let root: Value = serde_json::from_slice(raw)?;
    if let Some(inner) = root.get("response") {
        let inner_raw = serde_json::to_vec(inner)?;
        return parse_gemini_response_meta(&inner_raw, schema_ctx);
    }
    parse_gemini_response_meta(raw, schema_ctx)
}

/// Parse one Antigravity streaming chunk.
pub fn parse_antigravity_chunk(raw: &[u8]) -> Result<Vec<UnifiedEvent>, Error> {
    parse_antigravity_chunk_with_context(raw, None)
}

/// Parse one Antigravity streaming chunk with a schema context.
pub fn parse_antigravity_chunk_with_context(
    raw: &[u8],
    schema_ctx: Option<&ToolSchemaContext>,
) -> Result<Vec<UnifiedEvent>, Error> {
    let data = extract_sse_data(raw);
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data == b"[DONE]" {
        return parse_gemini_chunk_with_context(data, schema_ctx);
    }
    let root: Value = serde_json::from_slice(data)?;
    if let Some(inner) = root.get("response") {
        let inner_raw = serde_json::to_vec(inner)?;
        return parse_gemini_chunk_with_context(&inner_raw, schema_ctx);
    }
    parse_gemini_chunk_with_context(data, schema_ctx)
}
