use super::{Content, Result, ToolContext};
use async_trait::async_trait;
use std::sync::Arc;

/// LLM trait - abstraction for language models
#[async_trait]
pub trait LLM: Send + Sync {
    /// Returns the name of the model
    fn name(&self) -> &str;

    /// Generates a single complete response for the request
    async fn generate_content(&self, request: LLMRequest) -> Result<LLMResponse>;
}

/// Tool trait - abstraction for callable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the name of the tool
    fn name(&self) -> &str;

    /// Returns a description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's parameters
    fn schema(&self) -> serde_json::Value;

    /// Indicates whether this is a long-running tool
    fn is_long_running(&self) -> bool {
        false
    }

    /// Executes the tool with given parameters
    async fn execute(
        &self,
        ctx: Arc<dyn ToolContext>,
        params: serde_json::Value,
    ) -> Result<ToolResponse>;
}

/// Request to an LLM
#[derive(Debug, Clone)]
pub struct LLMRequest {
    pub model: String,
    pub contents: Vec<Content>,
    pub config: Option<GenerateConfig>,
}

/// Response from an LLM
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl LLMResponse {
    /// Text of the response content, if any
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().and_then(Content::text)
    }
}

/// Tool execution response
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub result: serde_json::Value,
}

/// Generation configuration
#[derive(Debug, Clone, Default)]
pub struct GenerateConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,

    /// Constrain the reply to JSON matching this schema
    pub response_schema: Option<OutputSchema>,
}

/// Named JSON schema for structured output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}
