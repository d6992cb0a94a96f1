//! End-to-end pipeline runs against a mock commerce API.
//!
//! The classifier is scripted and the specification is served from memory,
//! so these tests need no network access or API keys.

use cx_core::{AuthDescriptor, SessionContext};
use cx_openapi::testing::{
    CARTS_SPEC, CARTS_SPEC_SOURCE, MockLLM, ScriptedClassifier, StaticSpecFetcher,
};
use cx_openapi::{
    CommercePipeline, Corpus, HttpMethod, LlmClassifier, PipelineError, ResultEnvelope, SpecCache,
};
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;

const SELECT_ADD_ITEM: &str = r#"{"method":"POST","path":"/v2/carts/{cartId}/items"}"#;
const PLAN_ADD_ITEM: &str = r#"{
    "requestType": "POST",
    "endpoint": "/v2/carts/{cartId}/items",
    "body": {"data": {"type": "cart_item", "id": "ABC123", "quantity": 1}},
    "explanation": "Adds product ABC123 to the cart"
}"#;

fn spec_cache(fetcher: &Arc<StaticSpecFetcher>) -> Arc<SpecCache> {
    Arc::new(SpecCache::with_fetcher(fetcher.clone()))
}

fn carts_fetcher() -> Arc<StaticSpecFetcher> {
    Arc::new(StaticSpecFetcher::new().with_spec(CARTS_SPEC_SOURCE, CARTS_SPEC))
}

#[tokio::test]
async fn test_add_product_to_cart_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/oauth/access_token")
        .match_body("grant_type=implicit&client_id=client-1")
        .with_status(200)
        .with_body(r#"{"access_token":"shopper-token","expires_in":3600}"#)
        .create_async()
        .await;
    let add_item = server
        .mock("POST", "/v2/carts/cart-42/items")
        .match_header("authorization", "Bearer shopper-token")
        .match_body(Matcher::Json(
            json!({"data": {"type": "cart_item", "id": "ABC123", "quantity": 1}}),
        ))
        .with_status(201)
        .with_body(r#"{"data":[{"id":"item-1","sku":"ABC123","quantity":1}]}"#)
        .create_async()
        .await;

    let classifier = Arc::new(ScriptedClassifier::new([
        SELECT_ADD_ITEM,
        PLAN_ADD_ITEM,
        "VALID",
    ]));
    let fetcher = carts_fetcher();
    let pipeline = CommercePipeline::builder()
        .classifier(classifier.clone())
        .spec_cache(spec_cache(&fetcher))
        .build()
        .unwrap();

    let session = SessionContext::new()
        .with_cart_id("cart-42")
        .with_auth(AuthDescriptor::implicit("client-1"))
        .with_base_url(server.url());

    let outcome = pipeline
        .run(
            "add product ABC123 to cart",
            &Corpus::specification(CARTS_SPEC_SOURCE),
            &session,
        )
        .await
        .unwrap();

    token.assert_async().await;
    add_item.assert_async().await;

    assert_eq!(outcome.plan.method, HttpMethod::Post);
    assert_eq!(outcome.plan.path, "/v2/carts/{cartId}/items");
    assert_eq!(outcome.endpoint, "/v2/carts/cart-42/items");
    assert!(outcome.envelope.is_success());
    assert_eq!(outcome.envelope.status(), Some(201));
    assert_eq!(classifier.call_count(), 3);

    let rendered = outcome.render();
    assert!(rendered.starts_with("Adds product ABC123 to the cart\n\nResult: "));
    assert!(rendered.contains("item-1"));
}

#[tokio::test]
async fn test_revision_plan_is_executed() {
    let mut server = mockito::Server::new_async().await;
    let get_cart = server
        .mock("GET", "/v2/carts/cart-42")
        .match_header("authorization", "Bearer tok")
        .match_header("ep-store-id", "store-9")
        .with_status(200)
        .with_body(r#"{"data":{"id":"cart-42"}}"#)
        .create_async()
        .await;

    let classifier = Arc::new(ScriptedClassifier::new([
        r#"{"method":"GET","path":"/v2/carts/{cartId}/items"}"#,
        r#"{"requestType":"GET","endpoint":"/v2/carts/{cartId}/items","explanation":"Lists items"}"#,
        "NEEDS_REVISION: the user asked for the cart itself",
        r#"{"requestType":"GET","endpoint":"/v2/carts/cart-42","explanation":"Fetches the cart"}"#,
    ]));
    let pipeline = CommercePipeline::builder()
        .classifier(classifier.clone())
        .spec_cache(spec_cache(&carts_fetcher()))
        .build()
        .unwrap();

    let session = SessionContext::new()
        .with_cart_id("cart-42")
        .with_auth(AuthDescriptor::token("tok").with_store_id("store-9"))
        .with_base_url(server.url());

    let outcome = pipeline
        .run(
            "view my cart",
            &Corpus::specification(CARTS_SPEC_SOURCE),
            &session,
        )
        .await
        .unwrap();

    get_cart.assert_async().await;
    assert_eq!(outcome.plan.path, "/v2/carts/{cartId}");
    assert_eq!(outcome.endpoint, "/v2/carts/cart-42");
    assert_eq!(outcome.plan.explanation, "Fetches the cart");
    assert_eq!(classifier.call_count(), 4);
    assert!(
        classifier.requests()[3]
            .user
            .contains("the user asked for the cart itself")
    );
}

#[tokio::test]
async fn test_http_errors_are_reported_not_raised() {
    let mut server = mockito::Server::new_async().await;
    let _missing = server
        .mock("GET", "/v2/carts/cart-404")
        .with_status(404)
        .with_body(r#"{"errors":[{"status":404,"title":"Cart not found"}]}"#)
        .create_async()
        .await;

    let classifier = Arc::new(ScriptedClassifier::new([
        r#"{"method":"GET","path":"/v2/carts/{cartId}"}"#,
        r#"{"requestType":"GET","endpoint":"/v2/carts/{cartId}","explanation":"Fetches the cart"}"#,
    ]));
    let pipeline = CommercePipeline::builder()
        .classifier(classifier)
        .spec_cache(spec_cache(&carts_fetcher()))
        .validate_plans(false)
        .build()
        .unwrap();

    let session = SessionContext::new()
        .with_cart_id("cart-404")
        .with_auth(AuthDescriptor::token("tok"))
        .with_base_url(server.url());

    let outcome = pipeline
        .run(
            "view my cart",
            &Corpus::specification(CARTS_SPEC_SOURCE),
            &session,
        )
        .await
        .unwrap();

    let ResultEnvelope::Completed(response) = outcome.envelope else {
        panic!("expected the server's answer");
    };
    assert!(!response.success);
    assert_eq!(response.status, 404);
    assert_eq!(response.status_text, "Not Found");
    assert_eq!(response.data["errors"][0]["title"], json!("Cart not found"));
}

#[tokio::test]
async fn test_unbound_placeholder_stops_before_request() {
    let classifier = Arc::new(ScriptedClassifier::new([
        r#"{"method":"GET","path":"/v2/carts/{cartId}"}"#,
        r#"{"requestType":"GET","endpoint":"/v2/carts/{cartId}","explanation":"Fetches the cart"}"#,
    ]));
    let pipeline = CommercePipeline::builder()
        .classifier(classifier)
        .spec_cache(spec_cache(&carts_fetcher()))
        .validate_plans(false)
        .build()
        .unwrap();

    // No cart id in the session
    let session = SessionContext::new()
        .with_auth(AuthDescriptor::token("tok"))
        .with_base_url("http://127.0.0.1:9");

    let err = pipeline
        .run(
            "view my cart",
            &Corpus::specification(CARTS_SPEC_SOURCE),
            &session,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::UnresolvedPlaceholder(ref name, _) if name == "cartId"
    ));
}

#[tokio::test]
async fn test_spec_is_fetched_once_across_runs() {
    let mut server = mockito::Server::new_async().await;
    let _carts = server
        .mock("POST", "/v2/carts")
        .with_status(201)
        .with_body(r#"{"data":{"id":"new-cart"}}"#)
        .expect(2)
        .create_async()
        .await;

    let plan = r#"{"requestType":"POST","endpoint":"/v2/carts","body":{"data":{"name":"Cart"}},"explanation":"Creates a cart"}"#;
    let select = r#"{"method":"POST","path":"/v2/carts"}"#;
    let classifier = Arc::new(ScriptedClassifier::new([select, plan, select, plan]));
    let fetcher = carts_fetcher();
    let pipeline = CommercePipeline::builder()
        .classifier(classifier)
        .spec_cache(spec_cache(&fetcher))
        .validate_plans(false)
        .build()
        .unwrap();

    let session = SessionContext::new()
        .with_auth(AuthDescriptor::token("tok"))
        .with_base_url(server.url());
    let corpus = Corpus::specification(CARTS_SPEC_SOURCE);

    for _ in 0..2 {
        let outcome = pipeline.run("create a cart", &corpus, &session).await.unwrap();
        assert_eq!(outcome.envelope.status(), Some(201));
    }
    assert_eq!(fetcher.fetch_count(CARTS_SPEC_SOURCE), 1);
    assert_eq!(pipeline.specs().len(), 1);
}

#[tokio::test]
async fn test_llm_classifier_drives_the_pipeline() {
    let mut server = mockito::Server::new_async().await;
    let items = server
        .mock("GET", "/v2/carts/cart-42/items")
        .with_status(200)
        .with_body(r#"{"data":[]}"#)
        .create_async()
        .await;

    let llm = Arc::new(MockLLM::with_responses(vec![
        Some(r#"{"method":"GET","path":"/v2/carts/{cartId}/items"}"#.to_string()),
        Some(
            r#"{"requestType":"GET","endpoint":"/v2/carts/{cartId}/items","explanation":"Lists the items"}"#
                .to_string(),
        ),
        Some("VALID".to_string()),
    ]));
    let pipeline = CommercePipeline::builder()
        .classifier(Arc::new(LlmClassifier::new(llm.clone())))
        .spec_cache(spec_cache(&carts_fetcher()))
        .build()
        .unwrap();

    let session = SessionContext::new()
        .with_cart_id("cart-42")
        .with_auth(AuthDescriptor::token("tok"))
        .with_base_url(server.url());

    let outcome = pipeline
        .run(
            "what is in my cart?",
            &Corpus::specification(CARTS_SPEC_SOURCE),
            &session,
        )
        .await
        .unwrap();

    items.assert_async().await;
    assert!(outcome.envelope.is_success());

    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    let schema = requests[0]
        .config
        .as_ref()
        .and_then(|c| c.response_schema.as_ref())
        .unwrap();
    assert_eq!(schema.name, "endpoint_choice");
    // The validation call is free text
    assert!(
        requests[2]
            .config
            .as_ref()
            .and_then(|c| c.response_schema.as_ref())
            .is_none()
    );
}
