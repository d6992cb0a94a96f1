//! Agent-facing tools over a mock commerce API.

use cx_core::{AuthDescriptor, DefaultToolContext, SessionContext, Tool, ToolContext};
use cx_openapi::testing::ScriptedClassifier;
use cx_openapi::{
    CommerceApiTool, CommercePipeline, CommerceToolset, ExecRequestTool, InMemoryRetriever,
    Persona,
};
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;

fn pipeline(classifier: Arc<ScriptedClassifier>) -> Arc<CommercePipeline> {
    let retriever = InMemoryRetriever::new().with_chunks(
        "promotions-builder",
        [
            "POST /v2/rule-promotions Create a rule promotion with a discount",
            "GET /v2/rule-promotions List rule promotions",
        ],
    );
    Arc::new(
        CommercePipeline::builder()
            .classifier(classifier)
            .retriever(Arc::new(retriever))
            .validate_plans(false)
            .build()
            .unwrap(),
    )
}

fn ctx(session: SessionContext) -> Arc<dyn ToolContext> {
    Arc::new(DefaultToolContext::for_session(session))
}

#[tokio::test]
async fn test_category_tool_runs_retrieval_pipeline() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/oauth/access_token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "client_credentials".into(),
        ))
        .with_status(200)
        .with_body(r#"{"access_token":"admin-token"}"#)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/v2/rule-promotions")
        .match_header("authorization", "Bearer admin-token")
        .match_body(Matcher::PartialJson(json!({"data": {"type": "rule_promotion"}})))
        .with_status(201)
        .with_body(r#"{"data":{"id":"promo-1"}}"#)
        .create_async()
        .await;

    let classifier = Arc::new(ScriptedClassifier::new([
        r#"{"requestType":"POST","endpoint":"/v2/rule-promotions","body":{"data":{"type":"rule_promotion","name":"Summer sale"}},"explanation":"Creates the summer sale promotion"}"#,
    ]));
    let toolset = CommerceToolset::merchandiser(pipeline(classifier));
    let tool = toolset.get_tool("promotion_api").unwrap();

    let session = SessionContext::new()
        .with_auth(AuthDescriptor::client_credentials("admin", "s3cret"))
        .with_base_url(server.url());
    let response = tool
        .execute(ctx(session), json!({"query": "create a summer sale promotion with a discount"}))
        .await
        .unwrap();

    token.assert_async().await;
    create.assert_async().await;
    assert_eq!(response.result["request"], json!("POST /v2/rule-promotions"));
    assert_eq!(response.result["response"]["status"], json!(201));
    assert!(
        response.result["message"]
            .as_str()
            .unwrap()
            .starts_with("Creates the summer sale promotion")
    );
}

#[tokio::test]
async fn test_classifier_failure_is_a_tool_result() {
    let classifier = Arc::new(ScriptedClassifier::with_replies(vec![None]));
    let tool = CommerceApiTool::for_category(
        "promotions-builder",
        Persona::Merchandiser,
        pipeline(classifier),
    )
    .unwrap();

    let session = SessionContext::new()
        .with_auth(AuthDescriptor::token("tok"))
        .with_base_url("http://127.0.0.1:9");
    let response = tool
        .execute(ctx(session), json!({"query": "list promotions"}))
        .await
        .unwrap();

    assert_eq!(
        response.result,
        json!({"error": "Error executing request: No answer from classifier"})
    );
}

#[tokio::test]
async fn test_exec_tools_send_raw_requests() {
    let mut server = mockito::Server::new_async().await;
    let get = server
        .mock("GET", "/v2/carts/cart-42")
        .with_status(200)
        .with_body(r#"{"data":{"id":"cart-42"}}"#)
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/v2/carts/cart-42")
        .match_body(Matcher::Json(json!({"data": {"name": "Renamed"}})))
        .with_status(200)
        .with_body(r#"{"data":{"name":"Renamed"}}"#)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v2/carts/cart-42/items")
        .with_status(400)
        .with_body(r#"{"errors":[{"title":"Invalid quantity"}]}"#)
        .create_async()
        .await;

    let classifier = Arc::new(ScriptedClassifier::new(Vec::<String>::new()));
    let pipeline = pipeline(classifier);
    let session = SessionContext::new()
        .with_cart_id("cart-42")
        .with_auth(AuthDescriptor::token("tok"))
        .with_base_url(server.url());

    let response = ExecRequestTool::get(Persona::Shopper, pipeline.clone())
        .execute(ctx(session.clone()), json!({"endpoint": "/v2/carts/{cartId}"}))
        .await
        .unwrap();
    get.assert_async().await;
    assert_eq!(response.result["success"], json!(true));
    assert_eq!(response.result["data"]["data"]["id"], json!("cart-42"));

    // PUT accepts `data` as an alias for `body`
    let response = ExecRequestTool::put(Persona::Shopper, pipeline.clone())
        .execute(
            ctx(session.clone()),
            json!({"endpoint": "/v2/carts/cart-42", "data": {"data": {"name": "Renamed"}}}),
        )
        .await
        .unwrap();
    put.assert_async().await;
    assert_eq!(response.result["statusText"], json!("OK"));

    let response = ExecRequestTool::post(Persona::Shopper, pipeline)
        .execute(
            ctx(session),
            json!({"endpoint": "/v2/carts/cart-42/items", "body": {"data": {"quantity": -1}}}),
        )
        .await
        .unwrap();
    post.assert_async().await;
    assert_eq!(response.result["success"], json!(false));
    assert_eq!(response.result["status"], json!(400));
}

#[test]
fn test_toolset_lookup() {
    let classifier = Arc::new(ScriptedClassifier::new(Vec::<String>::new()));
    let toolset = CommerceToolset::shopper(pipeline(classifier));

    assert!(!toolset.is_empty());
    assert!(toolset.get_tool("cart_agent").is_some());
    assert!(toolset.get_tool("exec_post_request").is_some());
    assert!(toolset.get_tool("manage_pim").is_none());

    for tool in toolset.tools() {
        assert!(!tool.description().is_empty());
        assert_eq!(tool.schema()["type"], json!("object"));
    }
}
