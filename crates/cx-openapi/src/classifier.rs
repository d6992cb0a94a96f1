//! Intent classification boundary.
//!
//! The pipeline only needs "send a system and a user prompt, optionally with
//! an output schema, and get text back". [`LlmClassifier`] provides that over
//! any [`LLM`].

use crate::error::ClassifierError;
use async_trait::async_trait;
use cx_core::{Content, GenerateConfig, LLM, LLMRequest, OutputSchema};
use cx_telemetry::{ClassifierSpanAttributes, trace_classifier_call};
use schemars::JsonSchema;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// One classifier round trip.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    /// Pipeline stage, used for tracing
    pub stage: &'static str,
    /// Session the call belongs to, used for tracing
    pub session_id: String,
    pub system: String,
    pub user: String,
    /// Constrain the reply to JSON matching this schema
    pub output: Option<OutputSchema>,
}

impl ClassificationRequest {
    pub fn new(stage: &'static str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            stage,
            session_id: String::new(),
            system: system.into(),
            user: user.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: OutputSchema) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_stage(mut self, stage: &'static str) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// Something that answers classification prompts.
///
/// `Ok(None)` means the backend answered without content.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<Option<String>, ClassifierError>;
}

/// Classifier backed by a language model, run at temperature 0.
pub struct LlmClassifier {
    llm: Arc<dyn LLM>,
    temperature: f32,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LLM>) -> Self {
        Self {
            llm,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<Option<String>, ClassifierError> {
        let prompt_chars = request.system.len() + request.user.len();
        let schema_name = request.output.as_ref().map(|o| o.name.clone());

        let llm_request = LLMRequest {
            model: self.llm.name().to_string(),
            contents: vec![
                Content::new_system_text(request.system),
                Content::new_user_text(request.user),
            ],
            config: Some(GenerateConfig {
                temperature: Some(self.temperature),
                response_schema: request.output,
                ..Default::default()
            }),
        };

        debug!(stage = request.stage, "Calling intent classifier");
        let response = self
            .llm
            .generate_content(llm_request)
            .await
            .map_err(|e| ClassifierError::Backend(e.to_string()))?;

        if let Some(refusal) = &response.error_message {
            warn!(stage = request.stage, "Classifier refused: {}", refusal);
        }
        let text = response.text();

        trace_classifier_call(ClassifierSpanAttributes {
            model: self.llm.name().to_string(),
            stage: request.stage.to_string(),
            invocation_id: request.session_id,
            prompt_chars,
            response_json: text.clone().unwrap_or_default(),
            output_schema: schema_name,
            temperature: Some(f64::from(self.temperature)),
        });

        Ok(text.filter(|t| !t.trim().is_empty()))
    }
}

/// JSON schema for `T`, inlined and without meta keys, for structured output.
pub fn output_schema<T: JsonSchema>(name: &str) -> OutputSchema {
    let generator = schemars::r#gen::SchemaSettings::draft07()
        .with(|settings| {
            settings.inline_subschemas = true;
            settings.meta_schema = None;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();

    let mut schema = serde_json::to_value(&root).unwrap_or_else(|_| json!({"type": "object"}));
    if let Value::Object(ref mut map) = schema {
        map.remove("title");
        map.remove("definitions");
    }
    OutputSchema::new(name, schema)
}
