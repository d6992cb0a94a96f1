//! Agent-facing tools over the pipeline.
//!
//! Tools never return an error to the agent loop: every failure becomes a
//! `{"error": "Error executing request: ..."}` result the model can read and
//! react to.

use crate::error::{PipelineError, Result};
use crate::intent::Corpus;
use crate::pipeline::CommercePipeline;
use crate::types::HttpMethod;
use async_trait::async_trait;
use cx_core::{GrantType, SessionContext, Tool, ToolContext, ToolResponse};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

pub const CARTS_SPEC_URL: &str =
    "https://elasticpath.dev/assets/openapispecs/carts/OpenAPISpec.yaml";
pub const CATALOG_VIEW_SPEC_URL: &str =
    "https://elasticpath.dev/assets/openapispecs/catalog/catalog_view.yaml";
pub const PIM_SPEC_URL: &str = "https://elasticpath.dev/assets/openapispecs/pim/pim.yaml";
pub const FILES_SPEC_URL: &str = "https://elasticpath.dev/assets/openapispecs/files/files.yaml";

/// Who the agent acts for. Shoppers never use confidential credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Shopper,
    Merchandiser,
}

impl Persona {
    fn check_session(&self, session: &SessionContext) -> Result<()> {
        if *self == Persona::Shopper
            && session.auth().and_then(|auth| auth.grant_type()) == Some(GrantType::ClientCredentials)
        {
            return Err(PipelineError::Auth(
                "shopper tools only accept token or implicit authentication".to_string(),
            ));
        }
        Ok(())
    }
}

/// API categories indexed in the retrieval corpus.
pub const API_CATEGORIES: [(&str, &str, &str); 8] = [
    (
        "cart_api",
        "carts",
        "Information about the cart API, add a product to the cart, or update a product from the cart, or checkout the cart",
    ),
    (
        "catalog_api",
        "catalog",
        "Information about the catalog API, add a product to the catalog, or update a product from the catalog, or checkout the catalog",
    ),
    (
        "catalog_admin_api",
        "catalog-admin",
        "Information about the catalog admin API, create a catalog, publish a catalog, retrieves different catalogs, manage catalog attributes",
    ),
    (
        "pim_api",
        "pim",
        "Manage the products, variations, bundles, hierarchies, nodes in Product Experience Manager (PXM)",
    ),
    (
        "file_api",
        "files",
        "Information about the file API, upload a file, download a file, delete a file",
    ),
    (
        "pricebook_api",
        "pricebooks",
        "Information about the pricebook API, create a pricebook, update a pricebook, retrieve a pricebook, delete a pricebook. Pricebooks contain prices for the products in your catalog.",
    ),
    (
        "promotion_api",
        "promotions-builder",
        "Information about the promotion API, create a promotion, update a promotion, retrieve a promotion, delete a promotion. Promotions are used to apply discounts to products in your catalog.",
    ),
    (
        "account_api",
        "accounts",
        "Information about the account API, create an account, update an account, retrieve an account, delete an account. Accounts are used to manage your customers.",
    ),
];

fn error_response(err: impl std::fmt::Display) -> ToolResponse {
    ToolResponse {
        result: json!({ "error": format!("Error executing request: {}", err) }),
    }
}

/// Free-text query tool answered by the pipeline over one corpus.
pub struct CommerceApiTool {
    name: String,
    description: String,
    corpus: Corpus,
    persona: Persona,
    pipeline: Arc<CommercePipeline>,
}

impl CommerceApiTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        corpus: Corpus,
        persona: Persona,
        pipeline: Arc<CommercePipeline>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            corpus,
            persona,
            pipeline,
        }
    }

    /// Retrieval-backed tool for one entry of [`API_CATEGORIES`].
    pub fn for_category(category: &str, persona: Persona, pipeline: Arc<CommercePipeline>) -> Option<Self> {
        API_CATEGORIES
            .iter()
            .find(|(_, tag, _)| *tag == category)
            .map(|(name, tag, description)| {
                Self::new(*name, *description, Corpus::retrieval(*tag), persona, pipeline)
            })
    }

    pub fn cart(pipeline: Arc<CommercePipeline>) -> Self {
        Self::new(
            "cart_agent",
            "Manage shopping cart operations including viewing, adding products, updating quantities, removing items, and checkout",
            Corpus::specification(CARTS_SPEC_URL),
            Persona::Shopper,
            pipeline,
        )
    }

    pub fn catalog_search(pipeline: Arc<CommercePipeline>) -> Self {
        Self::new(
            "search_catalog",
            "Search the catalog for a product, a category/hierarchy/node, or a brand",
            Corpus::specification(CATALOG_VIEW_SPEC_URL),
            Persona::Shopper,
            pipeline,
        )
    }

    pub fn pim(pipeline: Arc<CommercePipeline>) -> Self {
        Self::new(
            "manage_pim",
            "Manage the products, variations, bundles, hierarchies, nodes in Product Experience Manager (PXM)",
            Corpus::specification(PIM_SPEC_URL),
            Persona::Merchandiser,
            pipeline,
        )
    }

    pub fn files(pipeline: Arc<CommercePipeline>) -> Self {
        Self::new(
            "manage_files",
            "Manage the files for a product",
            Corpus::specification(FILES_SPEC_URL),
            Persona::Merchandiser,
            pipeline,
        )
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    async fn run(&self, session: &SessionContext, params: &Value) -> Result<Value> {
        self.persona.check_session(session)?;
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| PipelineError::config("Missing required parameter 'query'"))?;

        let outcome = self.pipeline.run(query, &self.corpus, session).await?;
        Ok(json!({
            "message": outcome.render(),
            "request": format!("{} {}", outcome.plan.method, outcome.endpoint),
            "response": outcome.envelope.to_value(),
        }))
    }
}

#[async_trait]
impl Tool for CommerceApiTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The user query to match the API specification"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        ctx: Arc<dyn ToolContext>,
        params: Value,
    ) -> cx_core::Result<ToolResponse> {
        debug!("Executing commerce tool: {}", self.name);
        match self.run(ctx.session(), &params).await {
            Ok(result) => Ok(ToolResponse { result }),
            Err(err) => {
                warn!("Tool {} failed: {}", self.name, err);
                Ok(error_response(err))
            }
        }
    }
}

/// Raw GET/POST/PUT against an endpoint the agent already knows.
pub struct ExecRequestTool {
    name: &'static str,
    description: &'static str,
    method: HttpMethod,
    persona: Persona,
    pipeline: Arc<CommercePipeline>,
}

impl ExecRequestTool {
    pub fn get(persona: Persona, pipeline: Arc<CommercePipeline>) -> Self {
        Self {
            name: "exec_get_request",
            description: "Execute a GET request to the API",
            method: HttpMethod::Get,
            persona,
            pipeline,
        }
    }

    pub fn post(persona: Persona, pipeline: Arc<CommercePipeline>) -> Self {
        Self {
            name: "exec_post_request",
            description: "Execute a POST request to the API",
            method: HttpMethod::Post,
            persona,
            pipeline,
        }
    }

    pub fn put(persona: Persona, pipeline: Arc<CommercePipeline>) -> Self {
        Self {
            name: "exec_put_request",
            description: "Execute a PUT request to the API",
            method: HttpMethod::Put,
            persona,
            pipeline,
        }
    }

    fn payload(&self, params: &Value) -> Result<Option<Value>> {
        let object = |key: &str| params.get(key).filter(|v| v.is_object()).cloned();
        match self.method {
            HttpMethod::Post => object("body")
                .filter(|body| body.as_object().is_some_and(|m| !m.is_empty()))
                .map(Some)
                .ok_or_else(|| {
                    PipelineError::config("POST requests require a non-empty body object")
                }),
            HttpMethod::Put => object("body")
                .or_else(|| object("data"))
                .map(Some)
                .ok_or_else(|| PipelineError::config("Either 'body' or 'data' must be provided")),
            _ => Ok(None),
        }
    }

    async fn run(&self, session: &SessionContext, params: &Value) -> Result<Value> {
        self.persona.check_session(session)?;
        let endpoint = params
            .get("endpoint")
            .and_then(Value::as_str)
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| PipelineError::config("Missing required parameter 'endpoint'"))?;
        let body = self.payload(params)?;

        let envelope = self
            .pipeline
            .execute_raw(self.method, endpoint, body, session)
            .await?;
        Ok(envelope.to_value())
    }
}

#[async_trait]
impl Tool for ExecRequestTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn schema(&self) -> Value {
        let endpoint = json!({"type": "string", "description": "The API endpoint to call"});
        match self.method {
            HttpMethod::Post => json!({
                "type": "object",
                "properties": {
                    "endpoint": endpoint,
                    "body": {
                        "type": "object",
                        "description": "The body of the POST request - REQUIRED"
                    }
                },
                "required": ["endpoint", "body"]
            }),
            HttpMethod::Put => json!({
                "type": "object",
                "properties": {
                    "endpoint": endpoint,
                    "body": {
                        "type": "object",
                        "description": "The JSON data to send in the PUT request"
                    },
                    "data": {
                        "type": "object",
                        "description": "Alternative name for the JSON data to send in the PUT request"
                    }
                },
                "required": ["endpoint"]
            }),
            _ => json!({
                "type": "object",
                "properties": {"endpoint": endpoint},
                "required": ["endpoint"]
            }),
        }
    }

    async fn execute(
        &self,
        ctx: Arc<dyn ToolContext>,
        params: Value,
    ) -> cx_core::Result<ToolResponse> {
        debug!("Executing {}", self.name);
        match self.run(ctx.session(), &params).await {
            Ok(result) => Ok(ToolResponse { result }),
            Err(err) => {
                warn!("Tool {} failed: {}", self.name, err);
                Ok(error_response(err))
            }
        }
    }
}

/// A named collection of commerce tools.
pub struct CommerceToolset {
    tools: Vec<Arc<dyn Tool>>,
}

impl CommerceToolset {
    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Storefront tools: cart and catalog search plus raw requests.
    pub fn shopper(pipeline: Arc<CommercePipeline>) -> Self {
        let persona = Persona::Shopper;
        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(CommerceApiTool::cart(pipeline.clone())),
            Arc::new(CommerceApiTool::catalog_search(pipeline.clone())),
        ];
        for category in ["carts", "catalog"] {
            if let Some(tool) = CommerceApiTool::for_category(category, persona, pipeline.clone()) {
                tools.push(Arc::new(tool));
            }
        }
        tools.extend(exec_tools(persona, &pipeline));
        Self { tools }
    }

    /// Administrative tools: every API category, PIM and files, raw requests.
    pub fn merchandiser(pipeline: Arc<CommercePipeline>) -> Self {
        let persona = Persona::Merchandiser;
        let mut tools: Vec<Arc<dyn Tool>> = API_CATEGORIES
            .iter()
            .filter_map(|(_, tag, _)| CommerceApiTool::for_category(tag, persona, pipeline.clone()))
            .map(|tool| Arc::new(tool) as Arc<dyn Tool>)
            .collect();
        tools.push(Arc::new(CommerceApiTool::pim(pipeline.clone())));
        tools.push(Arc::new(CommerceApiTool::files(pipeline.clone())));
        tools.extend(exec_tools(persona, &pipeline));
        Self { tools }
    }

    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn exec_tools(persona: Persona, pipeline: &Arc<CommercePipeline>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ExecRequestTool::get(persona, pipeline.clone())),
        Arc::new(ExecRequestTool::post(persona, pipeline.clone())),
        Arc::new(ExecRequestTool::put(persona, pipeline.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClassifier;
    use cx_core::{AuthDescriptor, DefaultToolContext};

    fn pipeline() -> Arc<CommercePipeline> {
        Arc::new(
            CommercePipeline::builder()
                .classifier(Arc::new(ScriptedClassifier::new(Vec::<String>::new())))
                .build()
                .unwrap(),
        )
    }

    fn ctx(session: SessionContext) -> Arc<dyn ToolContext> {
        Arc::new(DefaultToolContext::for_session(session))
    }

    fn error_text(response: &ToolResponse) -> &str {
        response.result["error"].as_str().unwrap_or_default()
    }

    #[test]
    fn test_persona_toolsets() {
        let shopper = CommerceToolset::shopper(pipeline());
        assert_eq!(
            shopper.tool_names(),
            vec![
                "cart_agent",
                "search_catalog",
                "cart_api",
                "catalog_api",
                "exec_get_request",
                "exec_post_request",
                "exec_put_request"
            ]
        );

        let merchandiser = CommerceToolset::merchandiser(pipeline());
        assert_eq!(merchandiser.len(), 8 + 2 + 3);
        assert!(merchandiser.get_tool("promotion_api").is_some());
        assert!(merchandiser.get_tool("manage_pim").is_some());
        assert!(merchandiser.get_tool("cart_agent").is_none());
    }

    #[test]
    fn test_category_tools() {
        let tool = CommerceApiTool::for_category("promotions-builder", Persona::Merchandiser, pipeline())
            .unwrap();
        assert_eq!(tool.name(), "promotion_api");
        assert_eq!(tool.corpus(), &Corpus::retrieval("promotions-builder"));
        assert_eq!(tool.schema()["required"], json!(["query"]));
        assert!(CommerceApiTool::for_category("orders", Persona::Merchandiser, pipeline()).is_none());
    }

    #[tokio::test]
    async fn test_shopper_rejects_client_credentials() {
        let session = SessionContext::new()
            .with_auth(AuthDescriptor::client_credentials("id", "secret"))
            .with_base_url("http://localhost:1");
        let tool = CommerceApiTool::cart(pipeline());

        let response = tool
            .execute(ctx(session), json!({"query": "view my cart"}))
            .await
            .unwrap();
        assert!(error_text(&response).starts_with("Error executing request:"));
        assert!(error_text(&response).contains("shopper tools"));
    }

    #[tokio::test]
    async fn test_errors_become_results() {
        let tool = CommerceApiTool::cart(pipeline());
        let response = tool
            .execute(ctx(SessionContext::new()), json!({}))
            .await
            .unwrap();
        assert!(error_text(&response).contains("query"));

        let response = tool
            .execute(ctx(SessionContext::new()), json!({"query": "view my cart"}))
            .await
            .unwrap();
        assert!(error_text(&response).contains("No authentication configured"));
    }

    #[tokio::test]
    async fn test_exec_request_payload_rules() {
        let session = SessionContext::new()
            .with_auth(AuthDescriptor::token("tok"))
            .with_base_url("http://localhost:1");

        let post = ExecRequestTool::post(Persona::Merchandiser, pipeline());
        let response = post
            .execute(ctx(session.clone()), json!({"endpoint": "/v2/files", "body": {}}))
            .await
            .unwrap();
        assert!(error_text(&response).contains("POST requests require a non-empty body object"));

        let put = ExecRequestTool::put(Persona::Merchandiser, pipeline());
        let response = put
            .execute(ctx(session.clone()), json!({"endpoint": "/v2/files/1"}))
            .await
            .unwrap();
        assert!(error_text(&response).contains("Either 'body' or 'data' must be provided"));

        assert_eq!(
            put.payload(&json!({"data": {"name": "x"}})).unwrap(),
            Some(json!({"name": "x"}))
        );
        assert_eq!(
            ExecRequestTool::get(Persona::Shopper, pipeline())
                .payload(&json!({"body": {"ignored": true}}))
                .unwrap(),
            None
        );
    }
}
