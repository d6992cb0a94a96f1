//! OpenAI provider
//!
//! Text generation through `/chat/completions`, with optional
//! `json_schema` structured output.

pub mod provider;
pub mod types;

pub use provider::OpenAIProvider;

/// Default OpenAI API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI configuration
#[derive(Clone, Debug)]
pub struct OpenAIConfig {
    /// Model name for text generation
    pub model: String,
    /// Base URL for API requests
    pub base_url: String,
}

impl OpenAIConfig {
    /// Create default configuration
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create configuration with custom base URL (e.g., for a local proxy)
    pub fn with_base_url(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
        }
    }
}

/// Builder for OpenAIProvider
#[derive(Default)]
pub struct OpenAIBuilder {
    api_key: Option<String>,
    config: Option<OpenAIConfig>,
}

impl OpenAIBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API key
    pub fn with_api_key(mut self, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.config = Some(OpenAIConfig::new(model));
        self
    }

    /// Set API key with custom base URL
    pub fn with_api_key_and_base_url(
        mut self,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        self.api_key = Some(api_key.into());
        self.config = Some(OpenAIConfig::with_base_url(model, base_url));
        self
    }

    /// Set custom configuration
    pub fn with_config(mut self, config: OpenAIConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the provider
    pub fn build(self) -> crate::Result<OpenAIProvider> {
        let api_key = self
            .api_key
            .ok_or_else(|| crate::Error::config_error("API key is required"))?;
        let config = self
            .config
            .ok_or_else(|| crate::Error::config_error("Configuration is required"))?;

        Ok(OpenAIProvider::new(api_key, config))
    }
}
