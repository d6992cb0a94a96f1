//! HTTP execution against the commerce API.
//!
//! [`RequestExecutor::execute`] never fails: server answers of any status,
//! transport errors, timeouts and cancellation all come back as a
//! [`ResultEnvelope`] the agent can read.

use crate::error::{PipelineError, Result};
use crate::guard::guarded;
use crate::types::HttpMethod;
use cx_core::SessionContext;
use cx_telemetry::{ApiRequestSpanAttributes, trace_api_request};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Everything needed to send one request besides method and endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Bearer token; without one the body is sent form-encoded
    pub token: Option<String>,
    pub base_url: String,
    pub custom_headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn bearer(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// A response from the server, whatever its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpOutcome {
    pub success: bool,
    pub status: u16,
    #[serde(rename = "statusText")]
    pub status_text: String,
    /// Parsed JSON, `null` for an empty body, or the parse failure reason
    pub data: Value,
}

/// A request that never produced a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportFailure {
    pub success: bool,
    /// Failure kind: `cancelled`, `timeout`, `invalid_request` or `request_failed`
    pub error: String,
    pub message: String,
}

/// Normalized result of one request; the two variants differ in shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultEnvelope {
    Completed(HttpOutcome),
    Failed(TransportFailure),
}

impl ResultEnvelope {
    pub fn transport(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed(TransportFailure {
            success: false,
            error: error.into(),
            message: message.into(),
        })
    }

    fn from_error(err: &PipelineError) -> Self {
        let kind = match err {
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Config(_) => "invalid_request",
            _ => "request_failed",
        };
        Self::transport(kind, err.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(outcome) if outcome.success)
    }

    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Completed(outcome) => Some(outcome.status),
            Self::Failed(_) => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Completed(outcome) => Some(&outcome.data),
            Self::Failed(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Join base URL and endpoint with exactly one `/`.
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    let endpoint = endpoint.strip_prefix('/').unwrap_or(endpoint);
    format!("{}/{}", base, endpoint)
}

/// Sends requests and folds every outcome into a [`ResultEnvelope`].
#[derive(Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip(self, options, session), fields(session = %session.id()))]
    pub async fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
        options: &RequestOptions,
        session: &SessionContext,
    ) -> ResultEnvelope {
        let url = join_url(&options.base_url, endpoint);
        let started = Instant::now();

        let result = guarded(
            session.cancellation(),
            self.timeout,
            "request",
            self.send(method, &url, options),
        )
        .await;

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(err) => {
                error!("{} {} failed: {}", method, url, err);
                ResultEnvelope::from_error(&err)
            }
        };

        trace_api_request(ApiRequestSpanAttributes {
            method: method.to_string(),
            url,
            status: envelope.status(),
            success: envelope.is_success(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
        envelope
    }

    async fn send(&self, method: HttpMethod, url: &str, options: &RequestOptions) -> Result<ResultEnvelope> {
        debug!("==> {} {}", method, url);
        let mut builder = self
            .client
            .request(method.into(), url)
            .header(reqwest::header::ACCEPT, JSON_CONTENT_TYPE);

        builder = match options.bearer() {
            Some(token) => builder
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE),
            None => builder.header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE),
        };

        for (name, value) in &options.custom_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &options.body {
            if !method.sends_body() {
                debug!("Ignoring body for {} request", method);
            } else if options.bearer().is_some() {
                builder = builder.body(serde_json::to_vec(body)?);
            } else {
                builder = builder.body(form_body(body)?);
            }
        }

        let response = builder.send().await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        debug!("<== {} {} ({} bytes)", status.as_u16(), url, bytes.len());

        Ok(ResultEnvelope::Completed(HttpOutcome {
            success: status.is_success(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            data: parse_body(&bytes),
        }))
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Empty bodies become `null`; bodies that are not JSON become the parse
/// error text.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => value,
        Err(e) => Value::String(format!("Response is not valid JSON: {}", e)),
    }
}

/// Form-encode a flat JSON object; scalar values are stringified.
pub(crate) fn form_body(body: &Value) -> Result<String> {
    let Value::Object(map) = body else {
        return Err(PipelineError::config("form body must be a JSON object"));
    };
    let pairs: Vec<(&str, String)> = map
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.as_str(), value)
        })
        .collect();
    serde_urlencoded::to_string(pairs)
        .map_err(|e| PipelineError::config(format!("cannot form-encode body: {}", e)))
}
