//! Recovery of function calls written as plain text
//!
//! Models without native function calling often answer with text such as
//! `lookup('Paris')` or a JSON object `{"name": "lookup", "arguments": {...}}`.
//! The extractor recognises both forms for the functions a manifest declares.
//! Not finding a call is a normal outcome and yields `None`.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

use crate::agents::domain::{FunctionCall, Manifest, Message, Role};

fn call_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(([^()]*)\)").ok())
        .as_ref()
}

fn json_block_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Extract a function call from response text
///
/// `last_message` is the message the model answered. When it is already the
/// result of the same function, the call is not extracted again so that a
/// model quoting its input cannot loop.
pub fn extract_function_call(
    last_message: Option<&Message>,
    manifest: &Manifest,
    text: &str,
) -> Option<FunctionCall> {
    let names = manifest.function_names();
    if names.is_empty() {
        return None;
    }

    let call = extract_json_call(text, &names).or_else(|| extract_call_expression(text, manifest, &names))?;

    if let Some(message) = last_message {
        if message.role == Role::Function && message.name.as_deref() == Some(call.name.as_str()) {
            tracing::debug!(function = %call.name, "Skipping extraction of a call answering its own result");
            return None;
        }
    }

    Some(call)
}

fn extract_json_call(text: &str, names: &[&str]) -> Option<FunctionCall> {
    let trimmed = text.trim();
    let mut candidates: Vec<&str> = json_block_pattern()
        .map(|pattern| {
            pattern
                .captures_iter(text)
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect()
        })
        .unwrap_or_default();
    if trimmed.starts_with('{') {
        candidates.push(trimmed);
    }

    candidates.into_iter().find_map(|candidate| {
        let value: Value = serde_json::from_str(candidate).ok()?;
        let name = value
            .get("name")
            .or_else(|| value.get("function"))
            .and_then(Value::as_str)?;
        if !names.contains(&name) {
            return None;
        }

        let arguments = match value.get("arguments") {
            Some(Value::String(raw)) => serde_json::from_str(raw).ok()?,
            Some(obj @ Value::Object(_)) => obj.clone(),
            None => Value::Object(Map::new()),
            Some(_) => return None,
        };
        Some(FunctionCall::new(name, arguments))
    })
}

fn extract_call_expression(text: &str, manifest: &Manifest, names: &[&str]) -> Option<FunctionCall> {
    call_pattern()?.captures_iter(text).find_map(|captures| {
        let name = captures.get(1)?.as_str();
        if !names.contains(&name) {
            return None;
        }
        let raw_args = captures.get(2).map(|m| m.as_str()).unwrap_or("");
        let parameters = parameter_order(manifest.function(name));
        let arguments = parse_arguments(raw_args, &parameters)?;
        Some(FunctionCall::new(name, arguments))
    })
}

/// Positional parameter order: `required` first, then the remaining properties
fn parameter_order(schema: Option<&Value>) -> Vec<String> {
    let Some(parameters) = schema.and_then(|s| s.get("parameters")) else {
        return Vec::new();
    };

    let mut order: Vec<String> = parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    if let Some(properties) = parameters.get("properties").and_then(Value::as_object) {
        for key in properties.keys() {
            if !order.contains(key) {
                order.push(key.clone());
            }
        }
    }

    order
}

fn parse_arguments(raw: &str, parameters: &[String]) -> Option<Value> {
    let mut arguments = Map::new();

    for (index, piece) in split_top_level(raw).into_iter().enumerate() {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }

        match split_keyword(piece) {
            Some((key, value)) => {
                arguments.insert(unquote(key.trim()).to_string(), parse_scalar(value.trim()));
            }
            None => {
                let key = parameters.get(index)?;
                arguments.insert(key.clone(), parse_scalar(piece));
            }
        }
    }

    Some(Value::Object(arguments))
}

/// Split on commas that are not inside quotes
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => {
                pieces.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&raw[start..]);
    pieces
}

/// `key=value` outside quotes
fn split_keyword(piece: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    for (i, c) in piece.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, '=') => return Some((&piece[..i], &piece[i + 1..])),
            _ => {}
        }
    }
    None
}

fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if s.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') && bytes[s.len() - 1] == bytes[0] {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn parse_scalar(raw: &str) -> Value {
    let unquoted = unquote(raw);
    if unquoted.len() != raw.len() {
        return Value::String(unquoted.to_string());
    }

    match raw {
        "true" | "True" => Value::Bool(true),
        "false" | "False" => Value::Bool(false),
        "null" | "None" => Value::Null,
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Number(i.into())
            } else if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(n)
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}
