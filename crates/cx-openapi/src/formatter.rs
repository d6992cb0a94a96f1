//! Prompt renderings of specification documents.
//!
//! Two views are produced: a one-line synopsis per operation, shown to the
//! classifier when it picks an endpoint, and a verbose rendering of a single
//! operation used when it builds the request.

use crate::types::{HttpMethod, Operation, SpecDocument};
use serde_json::{Map, Value};
use std::fmt;

/// Synopsis descriptions are cut to this many characters, ellipsis included.
pub const SYNOPSIS_LIMIT: usize = 200;

/// Operation descriptions are cut to this many characters, ellipsis included.
pub const DESCRIPTION_LIMIT: usize = 4000;

/// Everything from this marker on is internal documentation.
pub const NOTE_MARKER: &str = ":::note";

const MAX_EXAMPLE_DEPTH: usize = 8;
const ELLIPSIS: &str = "...";

/// One line in the operation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSynopsis {
    pub method: HttpMethod,
    pub path: String,
    pub summary: String,
}

impl fmt::Display for OperationSynopsis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}  {}", self.method, self.path, self.summary)
    }
}

/// Every operation of `doc` in document order.
pub fn list_operations(doc: &SpecDocument) -> Vec<OperationSynopsis> {
    doc.operations()
        .map(|(path, method, op)| {
            let text = op
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .or(op.summary.as_deref())
                .unwrap_or("No description");
            let single_line = strip_note(text)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");

            OperationSynopsis {
                method,
                path: path.to_string(),
                summary: truncate(&single_line, SYNOPSIS_LIMIT),
            }
        })
        .collect()
}

/// One synopsis per line.
pub fn render_synopses(synopses: &[OperationSynopsis]) -> String {
    synopses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Verbose rendering of one operation, or a "No operation found" line.
pub fn format_operation(doc: &SpecDocument, path: &str, method: HttpMethod) -> String {
    match doc.operation(path, method) {
        Some(operation) => render_operation(path, method, operation),
        None => format!("No operation found for {} {}", method, path),
    }
}

fn render_operation(path: &str, method: HttpMethod, op: &Operation) -> String {
    let mut out = format!("{} {}\n", method, path);

    if let Some(summary) = op.summary.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("Summary: {}\n", summary));
    }
    let description = op
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("No description");
    out.push_str(&format!(
        "Description: {}\n",
        truncate(description.trim(), DESCRIPTION_LIMIT)
    ));

    out.push_str("\nParameters:\n");
    if op.parameters.is_empty() {
        out.push_str("- none\n");
    }
    for param in &op.parameters {
        out.push_str(&format!(
            "- {} ({}, {}): {}\n",
            param.name,
            param.location,
            if param.required { "required" } else { "optional" },
            param.description.as_deref().unwrap_or("No description")
        ));
    }

    out.push_str("\nResponses:\n");
    let mut any_success = false;
    for (status, response) in &op.responses {
        if status.starts_with('2') {
            any_success = true;
            out.push_str(&format!("- {}: {}\n", status, response.description));
        }
    }
    if !any_success {
        out.push_str("- none documented\n");
    }

    out.push_str("\nRequest body:\n");
    out.push_str(&render_request_body(op));
    out
}

fn render_request_body(op: &Operation) -> String {
    let Some(body) = &op.request_body else {
        return "No request body\n".to_string();
    };

    let mut out = String::new();
    if let Some(description) = body.description.as_deref().filter(|d| !d.is_empty()) {
        out.push_str(&format!("{}\n", description));
    }

    let Some(media) = body.preferred_media_type() else {
        out.push_str("No request body schema\n");
        return out;
    };

    let literal: Vec<(String, &Value)> = media
        .examples
        .iter()
        .filter_map(|(key, example)| {
            let summary = example.summary.clone().unwrap_or_else(|| key.clone());
            example.value.as_ref().map(|value| (summary, value))
        })
        .chain(
            media
                .example
                .as_ref()
                .map(|value| ("Example".to_string(), value)),
        )
        .collect();

    if !literal.is_empty() {
        for (summary, value) in literal {
            out.push_str(&format!("Example: {}\n{}\n", summary, pretty(value)));
        }
    } else if let Some(schema) = &media.schema {
        out.push_str(&format!(
            "Example (generated from schema):\n{}\n",
            pretty(&synthesize_example(schema))
        ));
    } else {
        out.push_str("No request body schema\n");
    }
    out
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Representative value for a schema.
///
/// Prefers `example`, then `default`; objects recurse into their properties,
/// arrays hold one synthesized item, `allOf` parts are merged, `oneOf` and
/// `anyOf` use their first branch, enums their first value. Anything else,
/// and anything nested too deeply, becomes an empty string.
pub fn synthesize_example(schema: &Value) -> Value {
    synthesize_at(schema, 0)
}

fn synthesize_at(schema: &Value, depth: usize) -> Value {
    if depth > MAX_EXAMPLE_DEPTH {
        return Value::String(String::new());
    }
    let Some(obj) = schema.as_object() else {
        return Value::String(String::new());
    };

    if let Some(example) = obj.get("example") {
        return example.clone();
    }
    if let Some(default) = obj.get("default") {
        return default.clone();
    }

    if let Some(parts) = obj.get("allOf").and_then(Value::as_array) {
        let mut merged = Map::new();
        let mut last = None;
        for part in parts {
            match synthesize_at(part, depth + 1) {
                Value::Object(fields) => merged.extend(fields),
                other => last = Some(other),
            }
        }
        return if merged.is_empty() {
            last.unwrap_or_else(|| Value::String(String::new()))
        } else {
            Value::Object(merged)
        };
    }

    for key in ["oneOf", "anyOf"] {
        if let Some(first) = obj.get(key).and_then(Value::as_array).and_then(|v| v.first()) {
            return synthesize_at(first, depth + 1);
        }
    }

    if let Some(properties) = obj.get("properties").and_then(Value::as_object) {
        return Value::Object(
            properties
                .iter()
                .map(|(name, prop)| (name.clone(), synthesize_at(prop, depth + 1)))
                .collect(),
        );
    }

    match obj.get("type").and_then(Value::as_str) {
        Some("array") => {
            let item = obj
                .get("items")
                .map(|items| synthesize_at(items, depth + 1))
                .unwrap_or_else(|| Value::String(String::new()));
            Value::Array(vec![item])
        }
        Some("object") => Value::Object(Map::new()),
        _ => obj
            .get("enum")
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())),
    }
}

/// Text before the first note marker, trimmed.
pub fn strip_note(text: &str) -> &str {
    match text.find(NOTE_MARKER) {
        Some(idx) => text[..idx].trim(),
        None => text.trim(),
    }
}

/// Cut `text` to at most `limit` characters, ellipsis included.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Map a concrete path such as `/v2/carts/abc/items` onto the documented
/// template for `method`.
///
/// An exact match wins. Otherwise the template with the fewest placeholders
/// is chosen, and ties between different templates yield `None`.
pub fn match_template(doc: &SpecDocument, method: HttpMethod, concrete: &str) -> Option<String> {
    let candidates = || {
        doc.paths
            .iter()
            .filter(move |item| item.operations.iter().any(|(m, _)| *m == method))
            .map(|item| item.path.as_str())
    };

    let concrete = normalize_path(concrete);
    if let Some(exact) = candidates().find(|template| *template == concrete) {
        return Some(exact.to_string());
    }

    let wanted: Vec<&str> = concrete.split('/').collect();
    let mut best: Option<(usize, &str)> = None;
    let mut tied = false;

    for template in candidates() {
        let segments: Vec<&str> = template.split('/').collect();
        if segments.len() != wanted.len() {
            continue;
        }
        let mut placeholders = 0;
        let matches = segments.iter().zip(&wanted).all(|(t, c)| {
            if is_placeholder(t) {
                placeholders += 1;
                !c.is_empty()
            } else {
                t == c
            }
        });
        if !matches {
            continue;
        }
        match best {
            Some((count, _)) if placeholders > count => {}
            Some((count, _)) if placeholders == count => tied = true,
            _ => {
                best = Some((placeholders, template));
                tied = false;
            }
        }
    }

    match best {
        Some((_, template)) if !tied => Some(template.to_string()),
        _ => None,
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

pub(crate) fn is_placeholder(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}
