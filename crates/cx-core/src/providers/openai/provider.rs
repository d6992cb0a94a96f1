//! OpenAI provider implementation

use super::{OpenAIConfig, types::*};
use crate::{Content, CxConfig, LLMRequest, LLMResponse, Part, Result};
use async_trait::async_trait;
use reqwest::Client;

/// OpenAI chat completions provider
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    pub fn new(api_key: String, config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config,
        }
    }

    /// Build a provider from the `[model]` section of the configuration
    pub fn from_config(config: &CxConfig) -> Result<Self> {
        let api_key = config.openai_api_key()?;
        let openai = match config.model.base_url.as_deref() {
            Some(base_url) if !base_url.is_empty() => {
                OpenAIConfig::with_base_url(config.model.model_name.clone(), base_url)
            }
            _ => OpenAIConfig::new(config.model.model_name.clone()),
        };
        Ok(Self::new(api_key, openai))
    }

    /// Convert Content to OpenAI messages format
    fn convert_contents_to_messages(contents: Vec<Content>) -> Vec<OpenAIMessage> {
        contents
            .into_iter()
            .map(|content| {
                let role = match content.role.as_str() {
                    "user" => "user",
                    "model" => "assistant",
                    "system" => "system",
                    _ => "user",
                };

                let text = content
                    .parts
                    .iter()
                    .map(|Part::Text { text }| text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");

                OpenAIMessage {
                    role: role.to_string(),
                    content: Some(text),
                    refusal: None,
                }
            })
            .collect()
    }

    /// Convert an OpenAI reply to a response; refusals carry no content
    fn convert_choice(choice: &OpenAIChoice) -> LLMResponse {
        let content = choice
            .message
            .content
            .as_ref()
            .map(|text| Content::new_model_text(text.clone()));

        LLMResponse {
            content,
            finish_reason: choice.finish_reason.clone(),
            error_code: choice.message.refusal.as_ref().map(|_| "refusal".to_string()),
            error_message: choice.message.refusal.clone(),
        }
    }

    fn build_request(&self, request: LLMRequest) -> OpenAIRequest {
        let config = request.config.unwrap_or_default();
        let model = if request.model.is_empty() {
            self.config.model.clone()
        } else {
            request.model
        };

        OpenAIRequest {
            model,
            messages: Self::convert_contents_to_messages(request.contents),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            response_format: config.response_schema.map(|schema| ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: schema.name,
                    schema: schema.schema,
                    strict: false,
                },
            }),
        }
    }
}

#[async_trait]
impl crate::LLM for OpenAIProvider {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate_content(&self, request: LLMRequest) -> Result<LLMResponse> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let openai_req = self.build_request(request);

        tracing::debug!(model = %openai_req.model, messages = openai_req.messages.len(), "Sending chat completion");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_req)
            .send()
            .await
            .map_err(|e| crate::Error::LLMError(format!("Request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(crate::Error::LLMError(format!(
                "OpenAI API error {}: {}",
                status, error_text
            )));
        }

        let openai_resp = resp
            .json::<OpenAIResponse>()
            .await
            .map_err(|e| crate::Error::LLMError(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &openai_resp.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Chat completion usage"
            );
        }

        Ok(openai_resp
            .choices
            .first()
            .map(Self::convert_choice)
            .unwrap_or_default())
    }
}
