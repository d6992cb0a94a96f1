//! The end-to-end resolution and execution pipeline.

use crate::auth::AuthResolver;
use crate::cache::{Clock, SpecCache};
use crate::classifier::{IntentClassifier, LlmClassifier};
use crate::error::{PipelineError, Result};
use crate::executor::{RequestExecutor, ResultEnvelope};
use crate::intent::{Corpus, DEFAULT_CLASSIFIER_TIMEOUT, DEFAULT_TOP_K, IntentResolver};
use crate::placeholders::substitute;
use crate::retriever::Retriever;
use crate::types::{HttpMethod, ResolvedPlan};
use crate::validation::PlanValidator;
use cx_core::{CxConfig, LLM, SessionContext, TokenPolicy};
use cx_telemetry::safe_serialize_pretty;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// What one pipeline run planned, where it sent the request and what came back.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub plan: ResolvedPlan,
    /// The endpoint with placeholders substituted
    pub endpoint: String,
    pub envelope: ResultEnvelope,
}

impl PipelineOutcome {
    /// Explanation followed by the pretty-printed result for the agent.
    pub fn render(&self) -> String {
        let result = match &self.envelope {
            ResultEnvelope::Completed(outcome) => safe_serialize_pretty(&outcome.data),
            failed => safe_serialize_pretty(failed),
        };
        format!("{}\n\nResult: {}", self.plan.explanation, result)
    }
}

/// Query in, executed request out.
///
/// Stages run strictly in order for one query; concurrent runs share only
/// the specification cache and, with [`TokenPolicy::Cached`], the token cache.
pub struct CommercePipeline {
    validator: PlanValidator,
    auth: AuthResolver,
    executor: RequestExecutor,
}

impl CommercePipeline {
    pub fn builder() -> CommercePipelineBuilder {
        CommercePipelineBuilder::new()
    }

    /// Pipeline tuned from configuration, classifying with `llm`.
    pub fn from_config(config: &CxConfig, llm: Arc<dyn LLM>) -> Result<Self> {
        CommercePipelineBuilder::from_config(config)
            .classifier(Arc::new(LlmClassifier::new(llm)))
            .build()
    }

    pub fn resolver(&self) -> &Arc<IntentResolver> {
        self.validator.resolver()
    }

    pub fn specs(&self) -> &Arc<SpecCache> {
        self.resolver().specs()
    }

    /// Plan, validate, authenticate and execute `query`.
    #[instrument(skip(self, session), fields(session = %session.id()))]
    pub async fn run(
        &self,
        query: &str,
        corpus: &Corpus,
        session: &SessionContext,
    ) -> Result<PipelineOutcome> {
        preflight(session)?;

        let plan = self.validator.plan_and_validate(query, corpus, session).await?;
        let endpoint = substitute(&plan.path, session)?;

        let mut options = self
            .auth
            .resolve(session.auth(), session.base_url(), session)
            .await?;
        options.body = plan.body.clone();

        let envelope = self
            .executor
            .execute(plan.method, &endpoint, &options, session)
            .await;
        info!(
            "{} {} finished with status {:?}",
            plan.method,
            endpoint,
            envelope.status()
        );

        Ok(PipelineOutcome {
            plan,
            endpoint,
            envelope,
        })
    }

    /// Authenticate and send a request the caller already planned.
    ///
    /// Placeholders in `endpoint` are substituted from the session.
    pub async fn execute_raw(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
        session: &SessionContext,
    ) -> Result<ResultEnvelope> {
        preflight(session)?;
        let endpoint = substitute(endpoint, session)?;

        let mut options = self
            .auth
            .resolve(session.auth(), session.base_url(), session)
            .await?;
        options.body = body;

        Ok(self
            .executor
            .execute(method, &endpoint, &options, session)
            .await)
    }
}

/// Fail fast, before any classifier call, when the session cannot possibly
/// authenticate.
fn preflight(session: &SessionContext) -> Result<()> {
    let descriptor = session.auth().ok_or_else(|| {
        PipelineError::config(
            "No authentication configured: provide an access token or client keys",
        )
    })?;
    descriptor.validate()?;

    match session.base_url() {
        Some(url) if !url.trim().is_empty() => Ok(()),
        _ => Err(PipelineError::config("No commerce API base URL configured")),
    }
}

/// Builder for [`CommercePipeline`].
pub struct CommercePipelineBuilder {
    classifier: Option<Arc<dyn IntentClassifier>>,
    specs: Option<Arc<SpecCache>>,
    spec_ttl: Option<Duration>,
    retriever: Option<Arc<dyn Retriever>>,
    executor: Option<RequestExecutor>,
    clock: Option<Arc<dyn Clock>>,
    token_policy: TokenPolicy,
    top_k: usize,
    classifier_timeout: Duration,
    request_timeout: Option<Duration>,
    validate_plans: bool,
}

impl CommercePipelineBuilder {
    pub fn new() -> Self {
        Self {
            classifier: None,
            specs: None,
            spec_ttl: None,
            retriever: None,
            executor: None,
            clock: None,
            token_policy: TokenPolicy::default(),
            top_k: DEFAULT_TOP_K,
            classifier_timeout: DEFAULT_CLASSIFIER_TIMEOUT,
            request_timeout: None,
            validate_plans: true,
        }
    }

    /// Builder carrying the `[pipeline]` settings of `config`.
    pub fn from_config(config: &CxConfig) -> Self {
        let pipeline = &config.pipeline;
        Self::new()
            .spec_ttl(pipeline.spec_cache_ttl())
            .token_policy(pipeline.token_policy)
            .top_k(pipeline.retrieval_top_k)
            .classifier_timeout(pipeline.classifier_timeout())
            .request_timeout(pipeline.request_timeout())
            .validate_plans(pipeline.validate_plans)
    }

    pub fn classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Share a specification cache between pipelines. Overrides `spec_ttl`.
    pub fn spec_cache(mut self, specs: Arc<SpecCache>) -> Self {
        self.specs = Some(specs);
        self
    }

    pub fn spec_ttl(mut self, ttl: Duration) -> Self {
        self.spec_ttl = Some(ttl);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn executor(mut self, executor: RequestExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Clock for token expiry; specification caches bring their own.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = policy;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn validate_plans(mut self, enabled: bool) -> Self {
        self.validate_plans = enabled;
        self
    }

    pub fn build(self) -> Result<CommercePipeline> {
        let classifier = self
            .classifier
            .ok_or_else(|| PipelineError::config("An intent classifier is required"))?;

        let specs = match self.specs {
            Some(specs) => specs,
            None => {
                let mut cache = SpecCache::new();
                if let Some(ttl) = self.spec_ttl {
                    cache = cache.with_ttl(ttl);
                }
                Arc::new(cache)
            }
        };

        let mut resolver = IntentResolver::new(classifier, specs)
            .with_top_k(self.top_k)
            .with_classifier_timeout(self.classifier_timeout);
        if let Some(retriever) = self.retriever {
            resolver = resolver.with_retriever(retriever);
        }
        let validator =
            PlanValidator::new(Arc::new(resolver)).with_validation(self.validate_plans);

        let mut executor = self.executor.unwrap_or_default();
        if let Some(timeout) = self.request_timeout {
            executor = executor.with_timeout(timeout);
        }

        let mut auth = AuthResolver::new(executor.clone()).with_policy(self.token_policy);
        if let Some(clock) = self.clock {
            auth = auth.with_clock(clock);
        }

        Ok(CommercePipeline {
            validator,
            auth,
            executor,
        })
    }
}

impl Default for CommercePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::HttpOutcome;
    use crate::testing::ScriptedClassifier;
    use cx_core::AuthDescriptor;
    use serde_json::json;

    fn pipeline(classifier: Arc<ScriptedClassifier>) -> CommercePipeline {
        CommercePipeline::builder()
            .classifier(classifier)
            .validate_plans(false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_classifier() {
        let err = CommercePipeline::builder().build().err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_from_config_applies_pipeline_settings() {
        let mut config = CxConfig::test_defaults();
        config.pipeline.spec_cache_ttl_secs = 60;
        let builder = CommercePipelineBuilder::from_config(&config);
        assert_eq!(builder.spec_ttl, Some(Duration::from_secs(60)));
        assert_eq!(builder.token_policy, TokenPolicy::PerRequest);
        assert!(builder.validate_plans);
    }

    #[tokio::test]
    async fn test_missing_auth_fails_before_classifier() {
        let classifier = Arc::new(ScriptedClassifier::new(["unused"]));
        let session = SessionContext::new().with_base_url("http://localhost:1");

        let err = pipeline(classifier.clone())
            .run("view my cart", &Corpus::retrieval("carts"), &session)
            .await
            .unwrap_err();

        assert!(err.is_config());
        assert_eq!(classifier.call_count(), 0);

        let session = SessionContext::new().with_auth(AuthDescriptor::token("tok"));
        let err = pipeline(classifier.clone())
            .run("view my cart", &Corpus::retrieval("carts"), &session)
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_raw_requires_bound_placeholders() {
        let classifier = Arc::new(ScriptedClassifier::new(Vec::<String>::new()));
        let session = SessionContext::new()
            .with_auth(AuthDescriptor::token("tok"))
            .with_base_url("http://localhost:1");

        let err = pipeline(classifier)
            .execute_raw(HttpMethod::Get, "/v2/carts/{cartId}", None, &session)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvedPlaceholder(..)));
    }

    #[test]
    fn test_render() {
        let outcome = PipelineOutcome {
            plan: ResolvedPlan::new(HttpMethod::Get, "/v2/carts/{cartId}")
                .with_explanation("Fetches the cart"),
            endpoint: "/v2/carts/cart-42".to_string(),
            envelope: ResultEnvelope::Completed(HttpOutcome {
                success: true,
                status: 200,
                status_text: "OK".to_string(),
                data: json!({"data": {"id": "cart-42"}}),
            }),
        };
        let rendered = outcome.render();
        assert!(rendered.starts_with("Fetches the cart\n\nResult: {"));
        assert!(rendered.contains("\"id\": \"cart-42\""));

        let failed = PipelineOutcome {
            envelope: ResultEnvelope::transport("timeout", "request timed out"),
            ..outcome
        };
        assert!(failed.render().contains("\"error\": \"timeout\""));
    }
}
