// Tool-call argument fixups: null stripping, placeholder removal, reverse
// type coercion for string-typed providers, schema-driven type fixing, and
// Gemini function-name normalisation.

use serde_json::{Map, Value};

/// Recursively delete explicit nulls from maps and arrays. Gemini rejects
/// null-valued parameters that some clients (Roo/Kilo) send.
pub fn remove_nulls_from_tool_input(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                out.insert(k, remove_nulls_from_tool_input(v));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(
            arr.into_iter()
                .filter(|v| !v.is_null())
                .map(remove_nulls_from_tool_input)
                .collect(),
        ),
        other => other,
    }
}

/// Recursively delete keys whose string value is the literal `[undefined]`
/// (Cherry Studio injects these as placeholders).
pub fn deep_clean_undefined(data: &mut Map<String, Value>) {
    let keys: Vec<String> = data
        .iter()
        .filter(|(_, v)| v.as_str() == Some("[undefined]"))
        .map(|(k, _)| k.clone())
        .collect();
    for k in keys {
        data.remove(&k);
    }
    for (_, v) in data.iter_mut() {
        match v {
            Value::Object(nested) => deep_clean_undefined(nested),
            Value::Array(arr) => deep_clean_undefined_array(arr),
            _ => {}
        }
    }
}

fn deep_clean_undefined_array(arr: &mut [Value]) {
    for item in arr.iter_mut() {
        match item {
            Value::Object(nested) => deep_clean_undefined(nested),
            Value::Array(nested) => deep_clean_undefined_array(nested),
            _ => {}
        }
    }
}

/// Undo Gemini's everything-is-a-string argument encoding.
///
/// `"true"`/`"false"` become booleans, `"null"` becomes null, strings that
/// look like JSON arrays/objects are parsed, numeric strings are parsed
/// (integer preferred). Strings with a leading zero other than `"0"` and
/// `"0.x"` are kept verbatim (ZIP codes, version strings).
pub fn reverse_transform_args(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, reverse_transform_args(v)))
                .collect(),
        ),
        Value::Array(arr) => {
            Value::Array(arr.into_iter().map(reverse_transform_args).collect())
        }
        Value::String(s) => reverse_transform_string(s),
        other => other,
    }
}

fn reverse_transform_string(s: String) -> Value {
    match s.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }

    let trimmed = s.trim();
    if (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('{') && trimmed.ends_with('}'))
    {
        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            return reverse_transform_args(parsed);
        }
        return Value::String(s);
    }

    if has_protected_leading_zero(&s) {
        return Value::String(s);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if s.contains('.') {
        if let Ok(f) = s.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(s)
}

/// `"0"` and `"0.x"` are genuine numbers; any other leading-zero string
/// must survive untouched.
fn has_protected_leading_zero(s: &str) -> bool {
    s.len() > 1 && s.starts_with('0') && !s.starts_with("0.")
}

/// Walk `args` and `schema.properties` in parallel, coercing string values
/// to the declared `number|integer|boolean|string` types. Recurses into
/// object and array children. Leading-zero strings are protected.
pub fn fix_tool_call_args(args: &mut Map<String, Value>, schema: &Map<String, Value>) {
    let Some(Value::Object(props)) = schema.get("properties") else {
        return;
    };
    for (k, v) in args.iter_mut() {
        if let Some(Value::Object(prop_schema)) = props.get(k) {
            fix_single_arg(v, prop_schema);
        }
    }
}

fn fix_single_arg(val: &mut Value, schema: &Map<String, Value>) {
    // Nested objects.
    if let Some(Value::Object(props)) = schema.get("properties") {
        if let Value::Object(map) = val {
            for (k, v) in map.iter_mut() {
                if let Some(Value::Object(child)) = props.get(k) {
                    fix_single_arg(v, child);
                }
            }
        }
        return;
    }

    let type_val = schema
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_lowercase();

    // Arrays.
    if type_val == "array" {
        if let (Some(Value::Object(items)), Value::Array(arr)) = (schema.get("items"), &mut *val) {
            for item in arr.iter_mut() {
                fix_single_arg(item, items);
            }
        }
        return;
    }

    // Primitive corrections.
    match type_val.as_str() {
        "number" | "integer" => {
            if let Value::String(s) = val {
                if has_protected_leading_zero(s) {
                    return;
                }
                if let Ok(i) = s.parse::<i64>() {
                    *val = Value::Number(i.into());
                } else if let Ok(f) = s.parse::<f64>() {
                    if let Some(n) = serde_json::Number::from_f64(f) {
                        *val = Value::Number(n);
                    }
                }
            }
        }
        "boolean" => match &*val {
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => *val = Value::Bool(true),
                "false" | "0" | "no" | "off" => *val = Value::Bool(false),
                _ => {}
            },
            Value::Number(n) => {
                if n.as_f64() == Some(1.0) {
                    *val = Value::Bool(true);
                } else if n.as_f64() == Some(0.0) {
                    *val = Value::Bool(false);
                }
            }
            _ => {}
        },
        "string" => {
            if !val.is_string() && !val.is_null() {
                *val = Value::String(constraint_string(val));
            }
        }
        _ => {}
    }
}

fn constraint_string(val: &Value) -> String {
    match val {
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Maximum length Gemini accepts for a function name.
pub const MAX_FUNCTION_NAME_LENGTH: usize = 64;

/// Force a function name into Gemini's `[A-Za-z_][A-Za-z0-9_.-]{0,63}`.
/// Illegal characters become underscores; an illegal first character gets
/// an underscore prefix.
pub fn normalize_function_name(name: &str) -> String {
    if name.is_empty() {
        return "_unnamed_function".to_string();
    }

    let mut result: String = name
        .chars()
        .take(MAX_FUNCTION_NAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let starts_ok = result
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !starts_ok {
        result.insert(0, '_');
        result.truncate(MAX_FUNCTION_NAME_LENGTH);
    }
    result
}

const NETWORKING_TOOL_NAMES: &[&str] = &[
    "web_search",
    "google_search",
    "web_search_20250305",
    "google_search_retrieval",
    "googleSearch",
    "googleSearchRetrieval",
];

/// Whether a tool name is a web-search/grounding tool handled via
/// `googleSearch` rather than a function declaration.
pub fn is_networking_tool_name(name: &str) -> bool {
    NETWORKING_TOOL_NAMES.contains(&name)
}

/// Whether any tool in the set is a networking tool.
pub fn detects_networking_tool(tools: &[llm_relay_types::ToolDefinition]) -> bool {
    tools.iter().any(|t| is_networking_tool_name(&t.name))
}
