//! Intent resolution: free-text query to a [`ResolvedPlan`].
//!
//! Two strategies share the same plan contract. With a full specification the
//! classifier first picks one operation from the synopsis list and then fills
//! in the body for that operation. With a retrieval corpus the top matching
//! fragments are shown and a single call produces the plan.

use crate::cache::SpecCache;
use crate::classifier::{ClassificationRequest, IntentClassifier, output_schema};
use crate::error::{ClassifierError, PipelineError, Result};
use crate::formatter::{format_operation, list_operations, match_template, render_synopses};
use crate::guard::guarded;
use crate::placeholders::{literal_segments, retemplate};
use crate::prompts;
use crate::retriever::Retriever;
use crate::types::{HttpMethod, ResolvedPlan};
use cx_core::SessionContext;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default number of fragments requested from the retriever.
pub const DEFAULT_TOP_K: usize = 5;

/// Default deadline for one classifier or retrieval call.
pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the resolver looks up the API description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corpus {
    /// A complete OpenAPI document, by URL or file path
    Specification { source: String },
    /// Specification fragments in the retriever, by category tag
    Retrieval { category: String },
}

impl Corpus {
    pub fn specification(source: impl Into<String>) -> Self {
        Self::Specification {
            source: source.into(),
        }
    }

    pub fn retrieval(category: impl Into<String>) -> Self {
        Self::Retrieval {
            category: category.into(),
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corpus::Specification { source } => write!(f, "spec:{}", source),
            Corpus::Retrieval { category } => write!(f, "retrieval:{}", category),
        }
    }
}

/// Classifier output for operation selection.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EndpointChoice {
    /// HTTP method, e.g. GET or POST
    pub method: String,
    /// Path exactly as listed, e.g. /v2/carts/{cartId}/items
    pub path: String,
}

/// Classifier output for a complete plan.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanReply {
    /// HTTP method: GET, POST, PUT, DELETE or PATCH
    #[serde(alias = "method")]
    pub request_type: String,
    /// Path template to call, placeholders kept as {name}
    #[serde(alias = "path")]
    pub endpoint: String,
    /// JSON request body, for methods that send one
    #[serde(default)]
    pub body: Option<Value>,
    /// Brief explanation of what the request will do
    #[serde(default)]
    pub explanation: String,
}

/// A plan together with the specification text it was derived from.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub plan: ResolvedPlan,
    /// Operation description or retrieved fragments, reused for revision
    pub corpus_text: String,
}

/// Turns queries into plans using an [`IntentClassifier`].
pub struct IntentResolver {
    classifier: Arc<dyn IntentClassifier>,
    specs: Arc<SpecCache>,
    retriever: Option<Arc<dyn Retriever>>,
    top_k: usize,
    classifier_timeout: Duration,
}

impl IntentResolver {
    pub fn new(classifier: Arc<dyn IntentClassifier>, specs: Arc<SpecCache>) -> Self {
        Self {
            classifier,
            specs,
            retriever: None,
            top_k: DEFAULT_TOP_K,
            classifier_timeout: DEFAULT_CLASSIFIER_TIMEOUT,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = timeout;
        self
    }

    pub fn specs(&self) -> &Arc<SpecCache> {
        &self.specs
    }

    pub async fn resolve(
        &self,
        query: &str,
        corpus: &Corpus,
        session: &SessionContext,
    ) -> Result<ResolvedPlan> {
        self.resolve_with_context(query, corpus, session)
            .await
            .map(|resolution| resolution.plan)
    }

    /// Resolve and keep the specification text for a later revision.
    #[instrument(skip(self, session), fields(session = %session.id()))]
    pub async fn resolve_with_context(
        &self,
        query: &str,
        corpus: &Corpus,
        session: &SessionContext,
    ) -> Result<Resolution> {
        let resolution = match corpus {
            Corpus::Specification { source } => {
                self.resolve_from_spec(query, source, session).await?
            }
            Corpus::Retrieval { category } => {
                self.resolve_from_retrieval(query, category, session)
                    .await?
            }
        };
        info!("Resolved plan {}", resolution.plan);
        Ok(resolution)
    }

    async fn resolve_from_spec(
        &self,
        query: &str,
        source: &str,
        session: &SessionContext,
    ) -> Result<Resolution> {
        let doc = self.specs.load(source, session).await?;
        let synopses = list_operations(&doc);
        if synopses.is_empty() {
            return Err(PipelineError::InvalidSpec(format!(
                "'{}' defines no operations",
                source
            )));
        }

        let request = ClassificationRequest::new(
            "select",
            prompts::SELECTION_SYSTEM,
            prompts::selection_user(query, &render_synopses(&synopses), session),
        )
        .with_output(output_schema::<EndpointChoice>("endpoint_choice"))
        .with_session_id(session.id());

        let choice: EndpointChoice =
            parse_reply(self.ask(request, session).await?, "endpoint choice")?;
        let method = plannable_method(&choice.method)?;
        let template = match_template(&doc, method, &choice.path).ok_or_else(|| {
            ClassifierError::UnknownOperation {
                method: choice.method.clone(),
                path: choice.path.clone(),
            }
        })?;
        debug!("Selected operation {} {}", method, template);

        let corpus_text = format_operation(&doc, &template, method);
        let request = plan_request(prompts::plan_user(query, &corpus_text, session), session);
        let reply: PlanReply = parse_reply(self.ask(request, session).await?, "plan")?;

        let mut plan = plan_from_reply(reply)?;
        if plan.method != method {
            warn!(
                "Plan method {} differs from selected operation {} {}, keeping the selection",
                plan.method, method, template
            );
            plan.method = method;
        }
        plan.path = template;

        Ok(Resolution { plan, corpus_text })
    }

    async fn resolve_from_retrieval(
        &self,
        query: &str,
        category: &str,
        session: &SessionContext,
    ) -> Result<Resolution> {
        let retriever = self.retriever.as_ref().ok_or_else(|| {
            PipelineError::config(format!(
                "no retriever configured for corpus '{}'",
                category
            ))
        })?;

        let chunks = guarded(
            session.cancellation(),
            self.classifier_timeout,
            "retrieval",
            retriever.search(query, category, self.top_k),
        )
        .await?;
        if chunks.is_empty() {
            return Err(PipelineError::Retrieval {
                corpus: category.to_string(),
                reason: "no matching specification fragments".to_string(),
            });
        }
        debug!("Retrieved {} fragments for {}", chunks.len(), category);

        let corpus_text = chunks.join("\n\n");
        let request = plan_request(prompts::plan_user(query, &corpus_text, session), session);
        let reply: PlanReply = parse_reply(self.ask(request, session).await?, "plan")?;
        let mut plan = plan_from_reply(reply)?;
        plan.path = retemplate(&plan.path, session, &literal_segments(&corpus_text));

        Ok(Resolution { plan, corpus_text })
    }

    /// One structured revision call.
    ///
    /// The revised path gets the same treatment as a first plan: against a
    /// specification it must name a documented operation and comes back as
    /// that operation's template; against retrieved fragments bound values
    /// are turned back into placeholders.
    pub async fn revise(
        &self,
        query: &str,
        corpus: &Corpus,
        previous: &ResolvedPlan,
        feedback: &str,
        corpus_text: &str,
        session: &SessionContext,
    ) -> Result<ResolvedPlan> {
        let user = prompts::revision_user(feedback, query, previous, corpus_text, session);
        let request = plan_request(user, session).with_stage("revise");
        let reply: PlanReply = parse_reply(self.ask(request, session).await?, "plan")?;
        let mut plan = plan_from_reply(reply)?;

        plan.path = match corpus {
            Corpus::Specification { source } => {
                let doc = self.specs.load(source, session).await?;
                match_template(&doc, plan.method, &plan.path).ok_or_else(|| {
                    ClassifierError::UnknownOperation {
                        method: plan.method.to_string(),
                        path: plan.path.clone(),
                    }
                })?
            }
            Corpus::Retrieval { .. } => {
                retemplate(&plan.path, session, &literal_segments(corpus_text))
            }
        };
        Ok(plan)
    }

    /// Run a classifier call under the session's cancellation and the
    /// classifier deadline.
    pub(crate) async fn ask(
        &self,
        request: ClassificationRequest,
        session: &SessionContext,
    ) -> Result<Option<String>> {
        let stage = request.stage;
        guarded(session.cancellation(), self.classifier_timeout, stage, async {
            self.classifier
                .classify(request)
                .await
                .map_err(PipelineError::from)
        })
        .await
    }
}

fn plan_request(user: String, session: &SessionContext) -> ClassificationRequest {
    ClassificationRequest::new("plan", prompts::PLAN_SYSTEM, user)
        .with_output(output_schema::<PlanReply>("api_plan"))
        .with_session_id(session.id())
}

fn parse_reply<T: DeserializeOwned>(
    reply: Option<String>,
    expected: &'static str,
) -> std::result::Result<T, ClassifierError> {
    let text = reply.ok_or(ClassifierError::NoAnswer)?;
    serde_json::from_str(text.trim()).map_err(|e| ClassifierError::Malformed {
        expected,
        reason: e.to_string(),
    })
}

fn plannable_method(raw: &str) -> std::result::Result<HttpMethod, ClassifierError> {
    let method: HttpMethod = raw.parse().map_err(|e: crate::types::UnsupportedMethod| {
        ClassifierError::Malformed {
            expected: "HTTP method",
            reason: e.to_string(),
        }
    })?;
    if !method.is_plannable() {
        return Err(ClassifierError::Malformed {
            expected: "HTTP method",
            reason: format!("{} is not a supported request type", method),
        });
    }
    Ok(method)
}

fn plan_from_reply(reply: PlanReply) -> Result<ResolvedPlan> {
    let method = plannable_method(&reply.request_type)?;
    if reply.endpoint.trim().is_empty() {
        return Err(ClassifierError::Malformed {
            expected: "plan",
            reason: "endpoint is empty".to_string(),
        }
        .into());
    }

    let mut plan = ResolvedPlan::new(method, reply.endpoint.trim())
        .with_explanation(reply.explanation);
    if let Some(body) = reply.body.filter(|b| !b.is_null()) {
        plan = plan.with_body(body);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::InMemoryRetriever;
    use crate::testing::{CARTS_SPEC, CARTS_SPEC_SOURCE, ScriptedClassifier, StaticSpecFetcher};
    use serde_json::json;

    fn specs() -> Arc<SpecCache> {
        Arc::new(SpecCache::with_fetcher(Arc::new(
            StaticSpecFetcher::new().with_spec(CARTS_SPEC_SOURCE, CARTS_SPEC),
        )))
    }

    fn resolver(classifier: &Arc<ScriptedClassifier>) -> IntentResolver {
        IntentResolver::new(classifier.clone(), specs())
    }

    #[tokio::test]
    async fn test_spec_strategy_selects_then_plans() {
        let classifier = Arc::new(ScriptedClassifier::new([
            r#"{"method":"POST","path":"/v2/carts/cart-42/items"}"#,
            r#"{"requestType":"POST","endpoint":"/v2/carts/cart-42/items",
                "body":{"data":{"type":"cart_item","id":"ABC123","quantity":1}},
                "explanation":"Adds ABC123 to the cart"}"#,
        ]));
        let session = SessionContext::new().with_cart_id("cart-42");

        let resolution = resolver(&classifier)
            .resolve_with_context(
                "add product ABC123 to cart",
                &Corpus::specification(CARTS_SPEC_SOURCE),
                &session,
            )
            .await
            .unwrap();

        let plan = resolution.plan;
        assert_eq!(plan.method, HttpMethod::Post);
        assert_eq!(plan.path, "/v2/carts/{cartId}/items");
        assert_eq!(plan.body.unwrap()["data"]["id"], json!("ABC123"));
        assert_eq!(plan.explanation, "Adds ABC123 to the cart");
        assert!(resolution.corpus_text.contains("POST /v2/carts/{cartId}/items"));

        let requests = classifier.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].stage, "select");
        assert_eq!(
            requests[0].output.as_ref().map(|o| o.name.as_str()),
            Some("endpoint_choice")
        );
        assert!(requests[0].user.contains("GET /v2/carts/{cartId}/items"));
        assert!(requests[0].user.contains("Current cart ID: cart-42"));
        assert_eq!(requests[1].stage, "plan");
        assert!(requests[1].user.contains("Add a product to the cart"));
    }

    #[tokio::test]
    async fn test_unknown_operation_is_error() {
        let classifier = Arc::new(ScriptedClassifier::new([
            r#"{"method":"GET","path":"/v2/orders"}"#,
        ]));

        let err = resolver(&classifier)
            .resolve(
                "list orders",
                &Corpus::specification(CARTS_SPEC_SOURCE),
                &SessionContext::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Classifier(ClassifierError::UnknownOperation { .. })
        ));
        assert_eq!(classifier.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_answer_and_malformed_replies() {
        let corpus = Corpus::specification(CARTS_SPEC_SOURCE);
        let session = SessionContext::new();

        let classifier = Arc::new(ScriptedClassifier::with_replies(vec![None]));
        let err = resolver(&classifier)
            .resolve("view my cart", &corpus, &session)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Classifier(ClassifierError::NoAnswer)));

        let classifier = Arc::new(ScriptedClassifier::new(["GET /v2/carts/{cartId}"]));
        let err = resolver(&classifier)
            .resolve("view my cart", &corpus, &session)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Classifier(ClassifierError::Malformed {
                expected: "endpoint choice",
                ..
            })
        ));

        let classifier = Arc::new(ScriptedClassifier::new([
            r#"{"method":"OPTIONS","path":"/v2/carts"}"#,
        ]));
        let err = resolver(&classifier)
            .resolve("view my cart", &corpus, &session)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Classifier(ClassifierError::Malformed {
                expected: "HTTP method",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_retrieval_strategy() {
        let retriever = Arc::new(InMemoryRetriever::new().with_chunks(
            "promotions-builder",
            [
                "POST /v2/rule-promotions create a promotion with discount rules",
                "GET /v2/rule-promotions list promotions",
            ],
        ));
        let classifier = Arc::new(ScriptedClassifier::new([
            r#"{"method":"POST","path":"/v2/rule-promotions","body":{"data":{"type":"rule_promotion"}},"explanation":"Creates a promotion"}"#,
        ]));

        let resolution = resolver(&classifier)
            .with_retriever(retriever)
            .resolve_with_context(
                "create a promotion",
                &Corpus::retrieval("promotions-builder"),
                &SessionContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(resolution.plan.method, HttpMethod::Post);
        assert_eq!(resolution.plan.path, "/v2/rule-promotions");
        assert!(resolution.corpus_text.starts_with("POST /v2/rule-promotions"));
        assert_eq!(classifier.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retrieval_restores_bound_placeholders() {
        let retriever = Arc::new(
            InMemoryRetriever::new().with_chunks("carts", ["GET /v2/carts/{cartId} get a cart"]),
        );
        let classifier = Arc::new(ScriptedClassifier::new([
            r#"{"requestType":"GET","endpoint":"/v2/carts/cart-42","explanation":"Reads the cart"}"#,
        ]));
        let session = SessionContext::new().with_cart_id("cart-42");

        let plan = resolver(&classifier)
            .with_retriever(retriever)
            .resolve("get my cart", &Corpus::retrieval("carts"), &session)
            .await
            .unwrap();

        assert_eq!(plan.path, "/v2/carts/{cartId}");
        assert!(plan.body.is_none());
    }

    #[tokio::test]
    async fn test_retrieval_failures() {
        let classifier = Arc::new(ScriptedClassifier::new(Vec::<String>::new()));
        let session = SessionContext::new();

        let err = resolver(&classifier)
            .resolve("anything", &Corpus::retrieval("files"), &session)
            .await
            .unwrap_err();
        assert!(err.is_config());

        let retriever = Arc::new(InMemoryRetriever::new().with_chunks("files", ["upload a file"]));
        let err = resolver(&classifier)
            .with_retriever(retriever)
            .resolve("pricebook", &Corpus::retrieval("files"), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval { .. }));
        assert_eq!(classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_session_stops_before_classifier() {
        let retriever = Arc::new(InMemoryRetriever::new().with_chunks("carts", ["GET /v2/carts"]));
        let classifier = Arc::new(ScriptedClassifier::new(["unused"]));
        let session = SessionContext::new();
        session.cancellation().cancel();

        let err = resolver(&classifier)
            .with_retriever(retriever)
            .resolve("get carts", &Corpus::retrieval("carts"), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled("retrieval")));
        assert_eq!(classifier.call_count(), 0);
    }
}
