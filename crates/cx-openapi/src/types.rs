//! Data structures for dereferenced OpenAPI documents and resolved plans.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// HTTP verbs recognised as operation keys of a path item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    Trace,
}

/// A method string that is not an HTTP verb.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported HTTP method '{0}'")]
pub struct UnsupportedMethod(pub String);

impl HttpMethod {
    /// All verbs in path-item key order.
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Patch,
        HttpMethod::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Key used for this verb inside an OpenAPI path item.
    pub fn path_item_key(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
            HttpMethod::Trace => "trace",
        }
    }

    /// Methods a resolved plan may carry.
    pub fn is_plannable(&self) -> bool {
        matches!(
            self,
            HttpMethod::Get
                | HttpMethod::Post
                | HttpMethod::Put
                | HttpMethod::Delete
                | HttpMethod::Patch
        )
    }

    /// Whether a request body is sent for this method.
    pub fn sends_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnsupportedMethod(trimmed.to_string()))
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Trace => reqwest::Method::TRACE,
        }
    }
}

/// Location where a parameter appears in the request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Path parameter (e.g., /carts/{cartId})
    Path,
    /// Query parameter (e.g., ?filter=eq(sku,ABC))
    Query,
    /// Header parameter (e.g., EP-Channel)
    Header,
    /// Cookie parameter
    Cookie,
    /// Anything else a document declares
    #[serde(other)]
    Other,
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterLocation::Path => write!(f, "path"),
            ParameterLocation::Query => write!(f, "query"),
            ParameterLocation::Header => write!(f, "header"),
            ParameterLocation::Cookie => write!(f, "cookie"),
            ParameterLocation::Other => write!(f, "other"),
        }
    }
}

/// One operation parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: Option<Value>,
}

/// A literal example attached to a media type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExampleDef {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Schema and examples for one request body media type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaTypeDef {
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub example: Option<Value>,
    #[serde(default)]
    pub examples: BTreeMap<String, ExampleDef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestBodyDef {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub content: BTreeMap<String, MediaTypeDef>,
}

impl RequestBodyDef {
    /// The JSON media type if declared, otherwise the first one.
    pub fn preferred_media_type(&self) -> Option<&MediaTypeDef> {
        self.content
            .get("application/json")
            .or_else(|| self.content.values().next())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseDef {
    #[serde(default)]
    pub description: String,
}

/// One method of one path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub request_body: Option<RequestBodyDef>,
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseDef>,
}

/// A path template and its operations in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct PathItem {
    pub path: String,
    pub operations: Vec<(HttpMethod, Operation)>,
}

/// A fully dereferenced OpenAPI document.
///
/// Documents are shared behind `Arc` by the spec cache and never mutated
/// after construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecDocument {
    pub title: String,
    pub version: String,
    pub servers: Vec<String>,
    pub paths: Vec<PathItem>,
}

impl SpecDocument {
    /// Convert a dereferenced OpenAPI 3.x document into the typed model.
    ///
    /// Operations that do not deserialize are skipped with a warning.
    pub fn from_value(doc: &Value) -> Result<Self> {
        let version_tag = doc.get("openapi").and_then(Value::as_str).ok_or_else(|| {
            PipelineError::InvalidSpec("missing 'openapi' version field".to_string())
        })?;
        if !version_tag.starts_with('3') {
            return Err(PipelineError::InvalidSpec(format!(
                "unsupported OpenAPI version '{}'",
                version_tag
            )));
        }

        let paths = doc
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| PipelineError::InvalidSpec("document has no 'paths' object".to_string()))?;

        let info = doc.get("info");
        let title = info
            .and_then(|i| i.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let version = info
            .and_then(|i| i.get("version"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let servers = doc
            .get("servers")
            .and_then(Value::as_array)
            .map(|servers| {
                servers
                    .iter()
                    .filter_map(|s| s.get("url").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut items = Vec::with_capacity(paths.len());
        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                warn!("Skipping non-object path item: {}", path);
                continue;
            };

            let shared_params: Vec<Parameter> = item
                .get("parameters")
                .and_then(|p| serde_json::from_value(p.clone()).ok())
                .unwrap_or_default();

            let mut operations = Vec::new();
            // Document order of the verb keys, non-verb keys ignored
            for (key, raw) in item {
                let Some(method) = HttpMethod::ALL
                    .into_iter()
                    .find(|m| m.path_item_key() == key)
                else {
                    continue;
                };

                match serde_json::from_value::<Operation>(raw.clone()) {
                    Ok(mut operation) => {
                        merge_shared_parameters(&mut operation, &shared_params);
                        operations.push((method, operation));
                    }
                    Err(e) => {
                        warn!("Failed to parse operation {} {}: {}", method, path, e);
                    }
                }
            }

            items.push(PathItem {
                path: path.clone(),
                operations,
            });
        }

        Ok(Self {
            title,
            version,
            servers,
            paths: items,
        })
    }

    /// Look up an operation by path template and method.
    pub fn operation(&self, path: &str, method: HttpMethod) -> Option<&Operation> {
        self.paths
            .iter()
            .find(|item| item.path == path)?
            .operations
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, op)| op)
    }

    /// Every operation in document order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, HttpMethod, &Operation)> {
        self.paths.iter().flat_map(|item| {
            item.operations
                .iter()
                .map(move |(method, op)| (item.path.as_str(), *method, op))
        })
    }

    pub fn operation_count(&self) -> usize {
        self.paths.iter().map(|item| item.operations.len()).sum()
    }
}

/// Path-level parameters apply to every operation unless the operation
/// redeclares the same name and location.
fn merge_shared_parameters(operation: &mut Operation, shared: &[Parameter]) {
    let mut merged: Vec<Parameter> = shared
        .iter()
        .filter(|p| {
            !operation
                .parameters
                .iter()
                .any(|own| own.name == p.name && own.location == p.location)
        })
        .cloned()
        .collect();
    merged.append(&mut operation.parameters);
    operation.parameters = merged;
}

/// The method, path template, body and explanation chosen for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPlan {
    pub method: HttpMethod,
    /// Template path; `{placeholders}` are substituted before execution
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub explanation: String,
}

impl ResolvedPlan {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            explanation: String::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }
}

impl fmt::Display for ResolvedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
