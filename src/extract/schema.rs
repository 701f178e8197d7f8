//! Strict validation of LLM output against the record schema.
//!
//! The response must be a single JSON object with exactly the keys of
//! [`ExtractedRecord`]. A single surrounding Markdown code fence is
//! tolerated; any other text outside the object is a parse error.

use serde_json::{Map, Value};

use crate::error::ExtractionError;
use crate::models::ExtractedRecord;

pub const STRING_FIELDS: [&str; 6] = [
    "title",
    "summary_tldr",
    "summary",
    "root_cause",
    "actions",
    "prevention",
];
pub const LIST_FIELDS: [&str; 2] = ["tags", "category"];

/// Above this many labels a list is considered wildly out of bounds.
pub const MAX_LIST_LEN: usize = 20;
/// Longest accepted tag or category, in characters.
pub const MAX_LABEL_CHARS: usize = 64;

/// Parse and validate a raw LLM response.
pub fn parse_record(response: &str) -> Result<ExtractedRecord, ExtractionError> {
    let body = strip_fence(response.trim());
    let value: Value =
        serde_json::from_str(body).map_err(|e| ExtractionError::Parse(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(ExtractionError::Parse("top-level value is not an object".into()));
    };

    if let Some(extra) = obj
        .keys()
        .find(|k| !STRING_FIELDS.contains(&k.as_str()) && !LIST_FIELDS.contains(&k.as_str()))
    {
        return Err(ExtractionError::SchemaViolation(format!(
            "unexpected key `{extra}`"
        )));
    }

    Ok(ExtractedRecord {
        title: string_field(&obj, "title")?,
        summary_tldr: string_field(&obj, "summary_tldr")?,
        summary: string_field(&obj, "summary")?,
        root_cause: string_field(&obj, "root_cause")?,
        actions: string_field(&obj, "actions")?,
        prevention: string_field(&obj, "prevention")?,
        tags: list_field(&obj, "tags")?,
        category: list_field(&obj, "category")?,
    })
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop an info string such as `json` on the opening fence line.
    match rest.find('\n') {
        Some(pos) if !rest[..pos].trim_start().starts_with('{') => rest[pos + 1..].trim(),
        _ => rest.trim(),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Result<String, ExtractionError> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(other) => Err(ExtractionError::SchemaViolation(format!(
            "`{key}` must be a string, got {}",
            type_name(other)
        ))),
        None => Err(ExtractionError::SchemaViolation(format!(
            "missing field `{key}`"
        ))),
    }
}

fn list_field(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>, ExtractionError> {
    let items = match obj.get(key) {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ExtractionError::SchemaViolation(format!(
                "`{key}` must be a list, got {}",
                type_name(other)
            )))
        }
        None => {
            return Err(ExtractionError::SchemaViolation(format!(
                "missing field `{key}`"
            )))
        }
    };
    if items.len() > MAX_LIST_LEN {
        return Err(ExtractionError::SchemaViolation(format!(
            "`{key}` has {} entries (max {MAX_LIST_LEN})",
            items.len()
        )));
    }

    let mut labels = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(s) = item else {
            return Err(ExtractionError::SchemaViolation(format!(
                "`{key}` entries must be strings, got {}",
                type_name(item)
            )));
        };
        let s = s.trim();
        if s.is_empty() {
            continue;
        }
        if s.chars().count() > MAX_LABEL_CHARS {
            return Err(ExtractionError::SchemaViolation(format!(
                "`{key}` entry longer than {MAX_LABEL_CHARS} characters"
            )));
        }
        labels.push(s.to_string());
    }
    Ok(labels)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
