//! # CX Telemetry
//!
//! Tracing and OpenTelemetry setup for the commerce pipeline.
//!
//! Provides subscriber initialization (human-readable or JSON logs, env
//! filtering, an OpenTelemetry layer) and span helpers that record classifier
//! calls and commerce API requests with stable attribute names.

mod spans;
mod tracer;

pub use spans::{
    ApiRequestSpanAttributes, ClassifierSpanAttributes, safe_serialize, safe_serialize_pretty,
    trace_api_request, trace_classifier_call,
};
pub use tracer::{
    TelemetryOptions, init_telemetry, init_telemetry_with, register_span_processor,
    tracer_provider,
};

/// OpenTelemetry span attribute constants.
///
/// Generative AI names follow the OpenTelemetry semantic conventions; HTTP
/// names follow the HTTP client conventions.
pub mod attributes {
    // Generic AI attributes
    pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";
    pub const GEN_AI_SYSTEM: &str = "gen_ai.system";
    pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";
    pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";

    // HTTP client attributes
    pub const HTTP_REQUEST_METHOD: &str = "http.request.method";
    pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";
    pub const URL_FULL: &str = "url.full";

    // Pipeline attributes
    pub const CX_PIPELINE_STAGE: &str = "cx.pipeline.stage";
    pub const CX_INVOCATION_ID: &str = "cx.invocation_id";
    pub const CX_OUTPUT_SCHEMA: &str = "cx.output_schema";
    pub const CX_PROMPT_CHARS: &str = "cx.prompt_chars";
    pub const CX_CLASSIFIER_RESPONSE: &str = "cx.classifier_response";
    pub const CX_REQUEST_SUCCESS: &str = "cx.request.success";
    pub const CX_REQUEST_DURATION_MS: &str = "cx.request.duration_ms";

    // System name constant
    pub const SYSTEM_NAME: &str = "cx.commerce_agent";
}
