// JSON Schema cleaning, three flavours:
//   - basic: strip keywords Gemini rejects, flatten nullable type arrays
//   - enhanced: additionally resolve $ref, merge allOf, collapse unions,
//     migrate validation keywords into the description, whitelist keys
//   - claude: const->enum, first-branch union collapse, broad keyword
//     strip, additionalProperties:false + draft-07 $schema
//
// All three are in-place rewrites over serde_json maps.

use serde_json::{Map, Value};

type Schema = Map<String, Value>;

const GEMINI_UNSUPPORTED: &[&str] = &[
    "strict",
    "input_examples",
    "$schema",
    "$id",
    "$defs",
    "definitions",
    "additionalProperties",
    "patternProperties",
    "unevaluatedProperties",
    "minProperties",
    "maxProperties",
    "dependentRequired",
    "dependentSchemas",
    "if",
    "then",
    "else",
    "not",
    "contentEncoding",
    "contentMediaType",
    "deprecated",
    "readOnly",
    "writeOnly",
    "examples",
    "$comment",
    "$vocabulary",
    "$anchor",
    "$dynamicRef",
    "$dynamicAnchor",
    "propertyNames",
];

/// Remove keywords Gemini does not support and flatten `[T, null]` type
/// arrays to the first non-null entry. Recurses into `properties`, `items`
/// and union branches.
pub fn clean_json_schema(schema: &mut Schema) {
    for kw in GEMINI_UNSUPPORTED {
        schema.remove(*kw);
    }

    if let Some(Value::Object(props)) = schema.get_mut("properties") {
        for (_, v) in props.iter_mut() {
            if let Value::Object(prop) = v {
                clean_json_schema(prop);
            }
        }
    }
    if let Some(Value::Object(items)) = schema.get_mut("items") {
        clean_json_schema(items);
    }
    for key in ["allOf", "anyOf", "oneOf"] {
        if let Some(Value::Array(arr)) = schema.get_mut(key) {
            for item in arr.iter_mut() {
                if let Value::Object(sub) = item {
                    clean_json_schema(sub);
                }
            }
        }
    }

    if let Some(Value::Array(types)) = schema.get("type") {
        let first_non_null = types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .map(str::to_string);
        if let Some(t) = first_non_null {
            schema.insert("type".into(), Value::String(t));
        }
    }
}

// ---------------------------------------------------------------------------
// Enhanced cleaning
// ---------------------------------------------------------------------------

/// The full compatibility rewrite used for Gemini-family tool parameters.
pub fn clean_json_schema_enhanced(schema: &mut Schema) {
    let mut defs: Schema = Map::new();
    collect_all_defs(&Value::Object(schema.clone()), &mut defs);

    schema.remove("$defs");
    schema.remove("definitions");

    flatten_refs(schema, &defs);
    clean_enhanced_recursive(schema);
}

fn collect_all_defs(value: &Value, defs: &mut Schema) {
    match value {
        Value::Object(map) => {
            for source in ["$defs", "definitions"] {
                if let Some(Value::Object(d)) = map.get(source) {
                    for (k, v) in d {
                        defs.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
            }
            for (k, v) in map {
                if k != "$defs" && k != "definitions" {
                    collect_all_defs(v, defs);
                }
            }
        }
        Value::Array(arr) => {
            for item in arr {
                collect_all_defs(item, defs);
            }
        }
        _ => {}
    }
}

fn flatten_refs(map: &mut Schema, defs: &Schema) {
    if let Some(Value::String(ref_path)) = map.remove("$ref") {
        let ref_name = ref_path.rsplit('/').next().unwrap_or("").to_string();
        if let Some(Value::Object(def)) = defs.get(&ref_name) {
            for (k, v) in def {
                map.entry(k.clone()).or_insert_with(|| v.clone());
            }
            flatten_refs(map, defs);
        } else {
            map.insert("type".into(), Value::String("string".into()));
            let hint = format!("(Unresolved $ref: {ref_path})");
            let desc = map
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            if !desc.contains(&hint) {
                let combined = if desc.is_empty() {
                    hint
                } else {
                    format!("{desc} {hint}")
                };
                map.insert("description".into(), Value::String(combined));
            }
        }
    }

    for (_, v) in map.iter_mut() {
        match v {
            Value::Object(child) => flatten_refs(child, defs),
            Value::Array(arr) => {
                for item in arr.iter_mut() {
                    if let Value::Object(child) = item {
                        flatten_refs(child, defs);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Returns true when the schema is effectively nullable (so the parent can
/// drop it from `required`).
fn clean_enhanced_recursive(schema: &mut Schema) -> bool {
    let mut nullable = false;

    merge_all_of(schema);

    // Recurse into children first.
    if schema.get("properties").map(Value::is_object) == Some(true) {
        let mut nullable_keys: Vec<String> = Vec::new();
        if let Some(Value::Object(props)) = schema.get_mut("properties") {
            for (k, v) in props.iter_mut() {
                if let Value::Object(prop) = v {
                    if clean_enhanced_recursive(prop) {
                        nullable_keys.push(k.clone());
                    }
                }
            }
        }
        if !nullable_keys.is_empty() {
            if let Some(Value::Array(req)) = schema.get("required") {
                let kept: Vec<Value> = req
                    .iter()
                    .filter(|r| {
                        r.as_str()
                            .map(|s| !nullable_keys.iter().any(|k| k == s))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    schema.remove("required");
                } else {
                    schema.insert("required".into(), Value::Array(kept));
                }
            }
        }
    } else if schema.get("items").map(Value::is_object) == Some(true) {
        if let Some(Value::Object(items)) = schema.get_mut("items") {
            clean_enhanced_recursive(items);
        }
    } else {
        for (_, v) in schema.iter_mut() {
            match v {
                Value::Object(child) => {
                    clean_enhanced_recursive(child);
                }
                Value::Array(arr) => {
                    for item in arr.iter_mut() {
                        if let Value::Object(child) = item {
                            clean_enhanced_recursive(child);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // Clean union branches before merging.
    for key in ["anyOf", "oneOf"] {
        if let Some(Value::Array(arr)) = schema.get_mut(key) {
            for branch in arr.iter_mut() {
                if let Value::Object(sub) = branch {
                    clean_enhanced_recursive(sub);
                }
            }
        }
    }

    // Merge the best union branch into this schema.
    let type_str = schema
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    if type_str.is_empty() || type_str == "object" {
        let union = schema
            .remove("anyOf")
            .or_else(|| schema.remove("oneOf"))
            .and_then(|v| match v {
                Value::Array(arr) => Some(arr),
                _ => None,
            });
        if let Some(arr) = union {
            if let Some(Value::Object(best)) = extract_best_schema_from_union(&arr) {
                merge_union_branch(schema, best);
            }
        }
    }

    let looks_like_schema = ["type", "properties", "items", "enum", "anyOf", "oneOf", "allOf"]
        .iter()
        .any(|k| schema.contains_key(*k));
    if !looks_like_schema {
        return nullable;
    }

    migrate_constraints(schema);

    // Whitelist output keys.
    const ALLOWED: &[&str] = &[
        "type",
        "description",
        "properties",
        "required",
        "items",
        "enum",
        "title",
    ];
    let keys: Vec<String> = schema.keys().cloned().collect();
    for k in keys {
        if !ALLOWED.contains(&k.as_str()) {
            schema.remove(&k);
        }
    }

    // Empty objects gain a synthetic reason property.
    if schema.get("type").and_then(Value::as_str) == Some("object") {
        let empty = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(Map::is_empty)
            .unwrap_or(true);
        if empty {
            schema.insert(
                "properties".into(),
                serde_json::json!({
                    "reason": {"type": "string", "description": "Reason for calling this tool"}
                }),
            );
            schema.insert("required".into(), serde_json::json!(["reason"]));
        }
    }

    // Align required with present properties.
    if let Some(Value::Array(req)) = schema.get("required").cloned() {
        let props = schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let kept: Vec<Value> = req
            .iter()
            .filter(|r| r.as_str().map(|s| props.contains_key(s)).unwrap_or(false))
            .cloned()
            .collect();
        if kept.is_empty() {
            schema.remove("required");
        } else {
            schema.insert("required".into(), Value::Array(kept));
        }
    }

    // Type normalisation: lowercase, pick first non-null from arrays.
    if let Some(type_val) = schema.get("type").cloned() {
        let mut selected = String::new();
        match type_val {
            Value::String(t) => {
                let lower = t.to_ascii_lowercase();
                if lower == "null" {
                    nullable = true;
                } else {
                    selected = lower;
                }
            }
            Value::Array(arr) => {
                for item in arr {
                    if let Some(s) = item.as_str() {
                        let lower = s.to_ascii_lowercase();
                        if lower == "null" {
                            nullable = true;
                        } else if selected.is_empty() {
                            selected = lower;
                        }
                    }
                }
            }
            _ => {}
        }
        if selected.is_empty() {
            selected = "string".into();
        }
        schema.insert("type".into(), Value::String(selected));
    }

    if nullable {
        let desc = schema
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if !desc.contains("nullable") {
            let combined = if desc.is_empty() {
                "(nullable)".to_string()
            } else {
                format!("{desc} (nullable)")
            };
            schema.insert("description".into(), Value::String(combined));
        }
    }

    // Stringify enum values.
    if let Some(Value::Array(vals)) = schema.get("enum").cloned() {
        let stringified: Vec<Value> = vals
            .iter()
            .map(|v| match v {
                Value::String(_) => v.clone(),
                Value::Null => Value::String("null".into()),
                other => Value::String(constraint_value_string(other)),
            })
            .collect();
        schema.insert("enum".into(), Value::Array(stringified));
    }

    nullable
}

fn merge_union_branch(schema: &mut Schema, branch: &Schema) {
    for (k, v) in branch {
        match k.as_str() {
            "properties" => {
                if !schema.contains_key("properties") {
                    schema.insert("properties".into(), Value::Object(Map::new()));
                }
                if let (Some(Value::Object(target)), Value::Object(source)) =
                    (schema.get_mut("properties"), v)
                {
                    for (pk, pv) in source {
                        target.entry(pk.clone()).or_insert_with(|| pv.clone());
                    }
                }
            }
            "required" => {
                let mut merged: Vec<Value> = schema
                    .get("required")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                if let Value::Array(source) = v {
                    for r in source {
                        if let Some(s) = r.as_str() {
                            if !merged.iter().any(|m| m.as_str() == Some(s)) {
                                merged.push(r.clone());
                            }
                        }
                    }
                }
                schema.insert("required".into(), Value::Array(merged));
            }
            _ => {
                schema.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }
}

fn merge_all_of(schema: &mut Schema) {
    let all_of = match schema.remove("allOf") {
        Some(Value::Array(arr)) if !arr.is_empty() => arr,
        Some(other) => {
            schema.insert("allOf".into(), other);
            return;
        }
        None => return,
    };

    let mut merged_props: Schema = Map::new();
    let mut merged_required: Vec<String> = Vec::new();

    for sub in &all_of {
        let Value::Object(sub) = sub else { continue };
        if let Some(Value::Object(props)) = sub.get("properties") {
            for (k, v) in props {
                merged_props.insert(k.clone(), v.clone());
            }
        }
        if let Some(Value::Array(req)) = sub.get("required") {
            for r in req {
                if let Some(s) = r.as_str() {
                    if !merged_required.iter().any(|m| m == s) {
                        merged_required.push(s.to_string());
                    }
                }
            }
        }
        for (k, v) in sub {
            if k != "properties" && k != "required" && k != "allOf" {
                schema.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }

    if !merged_props.is_empty() {
        if !schema.contains_key("properties") {
            schema.insert("properties".into(), Value::Object(Map::new()));
        }
        if let Some(Value::Object(existing)) = schema.get_mut("properties") {
            for (k, v) in merged_props {
                existing.entry(k).or_insert(v);
            }
        }
    }

    if !merged_required.is_empty() {
        let mut combined: Vec<Value> = schema
            .get("required")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for r in merged_required {
            if !combined.iter().any(|m| m.as_str() == Some(r.as_str())) {
                combined.push(Value::String(r));
            }
        }
        schema.insert("required".into(), Value::Array(combined));
    }
}

/// Score union branches: object > array > scalar > null.
fn score_schema_option(val: &Value) -> i32 {
    let Some(obj) = val.as_object() else { return 0 };
    let type_val = obj.get("type").and_then(Value::as_str).unwrap_or("");
    if obj.contains_key("properties") || type_val == "object" {
        return 3;
    }
    if obj.contains_key("items") || type_val == "array" {
        return 2;
    }
    if !type_val.is_empty() && type_val != "null" {
        return 1;
    }
    0
}

fn extract_best_schema_from_union(union: &[Value]) -> Option<&Value> {
    let mut best: Option<&Value> = None;
    let mut best_score = -1;
    for item in union {
        let score = score_schema_option(item);
        if score > best_score {
            best_score = score;
            best = Some(item);
        }
    }
    best
}

const CONSTRAINT_LABELS: &[(&str, &str)] = &[
    ("minLength", "minLen"),
    ("maxLength", "maxLen"),
    ("pattern", "pattern"),
    ("minimum", "min"),
    ("maximum", "max"),
    ("multipleOf", "multipleOf"),
    ("exclusiveMinimum", "exclMin"),
    ("exclusiveMaximum", "exclMax"),
    ("minItems", "minItems"),
    ("maxItems", "maxItems"),
    ("propertyNames", "propertyNames"),
    ("format", "format"),
];

fn migrate_constraints(schema: &mut Schema) {
    let mut hints: Vec<String> = Vec::new();
    for (field, label) in CONSTRAINT_LABELS {
        if let Some(val) = schema.get(*field) {
            if !val.is_null() {
                hints.push(format!("{label}: {}", constraint_value_string(val)));
            }
        }
    }
    if hints.is_empty() {
        return;
    }
    let suffix = format!(" [Constraint: {}]", hints.join(", "));
    let desc = schema
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    if !desc.contains(&suffix) {
        schema.insert("description".into(), Value::String(format!("{desc}{suffix}")));
    }
}

fn constraint_value_string(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Claude cleaning
// ---------------------------------------------------------------------------

const CLAUDE_UNSUPPORTED: &[&str] = &[
    "allOf",
    "not",
    "any_of",
    "one_of",
    "all_of",
    "$ref",
    "$defs",
    "definitions",
    "$id",
    "$anchor",
    "$dynamicRef",
    "$dynamicAnchor",
    "$schema",
    "$vocabulary",
    "$comment",
    "if",
    "then",
    "else",
    "dependentSchemas",
    "dependentRequired",
    "unevaluatedItems",
    "unevaluatedProperties",
    "contentEncoding",
    "contentMediaType",
    "contentSchema",
    "dependencies",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minContains",
    "maxContains",
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minProperties",
    "maxProperties",
    "default",
];

/// Prepare a schema for the Claude API: basic cleaning, const->enum,
/// first-branch union collapse, broad keyword strip, then force
/// `additionalProperties: false` and a draft-07 `$schema`.
pub fn clean_json_schema_for_claude(schema: &mut Schema) {
    clean_json_schema(schema);
    clean_claude_recursive(schema);
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema.insert(
        "$schema".into(),
        Value::String("http://json-schema.org/draft-07/schema#".into()),
    );
}

fn clean_claude_recursive(schema: &mut Schema) {
    if let Some(const_val) = schema.remove("const") {
        schema.insert("enum".into(), Value::Array(vec![const_val]));
    }

    for key in ["anyOf", "oneOf"] {
        if let Some(Value::Array(arr)) = schema.remove(key) {
            if let Some(Value::Object(first)) = arr.first() {
                for (k, v) in first {
                    schema.insert(k.clone(), v.clone());
                }
            }
        }
    }

    if let Some(Value::String(t)) = schema.get("type").cloned() {
        schema.insert("type".into(), Value::String(t.to_ascii_lowercase()));
    }

    for kw in CLAUDE_UNSUPPORTED {
        schema.remove(*kw);
    }

    if let Some(Value::Object(props)) = schema.get_mut("properties") {
        for (_, v) in props.iter_mut() {
            if let Value::Object(prop) = v {
                clean_claude_recursive(prop);
            }
        }
    }
    match schema.get_mut("items") {
        Some(Value::Object(items)) => clean_claude_recursive(items),
        Some(Value::Array(items)) => {
            for item in items.iter_mut() {
                if let Value::Object(sub) = item {
                    clean_claude_recursive(sub);
                }
            }
        }
        _ => {}
    }
    if let Some(Value::Array(prefix)) = schema.get_mut("prefixItems") {
        for item in prefix.iter_mut() {
            if let Value::Object(sub) = item {
                clean_claude_recursive(sub);
            }
        }
    }
    for key in ["additionalProperties", "patternProperties", "propertyNames", "contains"] {
        if let Some(Value::Object(sub)) = schema.get_mut(key) {
            if key == "patternProperties" {
                for (_, v) in sub.iter_mut() {
                    if let Value::Object(prop) = v {
                        clean_claude_recursive(prop);
                    }
                }
            } else {
                clean_claude_recursive(sub);
            }
        }
    }
}
