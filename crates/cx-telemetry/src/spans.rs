//! Span creation helpers for classifier calls and commerce API requests

use crate::attributes::*;

/// Attributes for tracing an intent classifier call
#[derive(Debug, Clone)]
pub struct ClassifierSpanAttributes {
    pub model: String,
    /// Pipeline stage that issued the call (select, plan, validate, revise)
    pub stage: String,
    pub invocation_id: String,
    pub prompt_chars: usize,
    pub response_json: String,
    pub output_schema: Option<String>,
    pub temperature: Option<f64>,
}

/// Attributes for tracing an HTTP request against the commerce API
#[derive(Debug, Clone)]
pub struct ApiRequestSpanAttributes {
    pub method: String,
    pub url: String,
    /// `None` when the request never got a response
    pub status: Option<u16>,
    pub success: bool,
    pub duration_ms: u64,
}

/// Create and record a span for one classifier round trip.
pub fn trace_classifier_call(attrs: ClassifierSpanAttributes) {
    let span = tracing::info_span!(
        "classify_intent",
        { GEN_AI_OPERATION_NAME } = "chat",
        { GEN_AI_SYSTEM } = SYSTEM_NAME,
        { GEN_AI_REQUEST_MODEL } = %attrs.model,
        { CX_PIPELINE_STAGE } = %attrs.stage,
        { CX_INVOCATION_ID } = %attrs.invocation_id,
        { CX_PROMPT_CHARS } = attrs.prompt_chars,
        { CX_CLASSIFIER_RESPONSE } = %attrs.response_json,
        { CX_OUTPUT_SCHEMA } = tracing::field::Empty,
        { GEN_AI_REQUEST_TEMPERATURE } = tracing::field::Empty,
    );

    if let Some(schema) = &attrs.output_schema {
        span.record(CX_OUTPUT_SCHEMA, schema.as_str());
    }
    if let Some(temperature) = attrs.temperature {
        span.record(GEN_AI_REQUEST_TEMPERATURE, temperature);
    }

    // Enter and immediately exit the span (it's recorded)
    let _guard = span.enter();
}

/// Create and record a span for one commerce API request.
pub fn trace_api_request(attrs: ApiRequestSpanAttributes) {
    let span = tracing::info_span!(
        "commerce_request",
        { HTTP_REQUEST_METHOD } = %attrs.method,
        { URL_FULL } = %attrs.url,
        { HTTP_RESPONSE_STATUS_CODE } = tracing::field::Empty,
        { CX_REQUEST_SUCCESS } = attrs.success,
        { CX_REQUEST_DURATION_MS } = attrs.duration_ms,
    );

    if let Some(status) = attrs.status {
        span.record(HTTP_RESPONSE_STATUS_CODE, status);
    }

    let _guard = span.enter();
}

/// Helper to safely serialize to JSON string
pub fn safe_serialize<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<not serializable>".to_string())
}

/// Helper to safely serialize to pretty JSON string
pub fn safe_serialize_pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "<not serializable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_serialize() {
        let value = serde_json::json!({"method": "GET"});
        let result = safe_serialize(&value);
        assert_eq!(result, r#"{"method":"GET"}"#);
        assert!(safe_serialize_pretty(&value).contains('\n'));
    }

    #[test]
    fn test_classifier_span_attributes() {
        trace_classifier_call(ClassifierSpanAttributes {
            model: "gpt-4o-mini".to_string(),
            stage: "select".to_string(),
            invocation_id: "inv-1".to_string(),
            prompt_chars: 1200,
            response_json: r#"{"method":"GET","path":"/v2/carts"}"#.to_string(),
            output_schema: Some("endpoint_choice".to_string()),
            temperature: Some(0.0),
        });
    }

    #[test]
    fn test_api_request_span_attributes() {
        trace_api_request(ApiRequestSpanAttributes {
            method: "POST".to_string(),
            url: "https://api.example.com/v2/carts/c1/items".to_string(),
            status: Some(201),
            success: true,
            duration_ms: 42,
        });
        trace_api_request(ApiRequestSpanAttributes {
            method: "GET".to_string(),
            url: "http://127.0.0.1:1/v2/carts".to_string(),
            status: None,
            success: false,
            duration_ms: 1,
        });
    }
}
