//! Test doubles for the pipeline's injectable seams.
//!
//! Used by the unit tests in this crate and by the workspace integration
//! tests; nothing here touches the network.

use crate::cache::{Clock, SpecFetcher};
use crate::classifier::{ClassificationRequest, IntentClassifier};
use crate::error::{ClassifierError, PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cx_core::{Content, LLM, LLMRequest, LLMResponse};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Source name under which [`CARTS_SPEC`] is usually registered.
pub const CARTS_SPEC_SOURCE: &str = "carts.yaml";

/// A small carts API in the shape of the commerce platform's specification.
pub const CARTS_SPEC: &str = r#"
openapi: 3.0.0
info:
  title: Carts API
  version: '1.0'
paths:
  /v2/carts:
    post:
      summary: Create a cart
      description: Creates a cart for the shopper.
      responses:
        '201':
          description: Cart created
  /v2/carts/{cartId}:
    parameters:
      - $ref: '#/components/parameters/CartId'
    get:
      summary: Get a cart
      description: Retrieve a cart by its identifier.
      responses:
        '200':
          description: OK
  /v2/carts/{cartId}/items:
    parameters:
      - $ref: '#/components/parameters/CartId'
    get:
      summary: Get cart items
      responses:
        '200':
          description: OK
    post:
      summary: Add a product to the cart
      description: |
        Adds a product to the cart by product id.
        :::note
        Custom items are covered elsewhere.
      requestBody:
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/CartItemRequest'
      responses:
        '201':
          description: Item added
        '400':
          description: Bad request
components:
  parameters:
    CartId:
      name: cartId
      in: path
      required: true
      description: The cart identifier
  schemas:
    CartItemRequest:
      type: object
      properties:
        data:
          type: object
          properties:
            type:
              type: string
              example: cart_item
            id:
              type: string
              example: product-id
            quantity:
              type: integer
              example: 1
"#;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = lock(&self.now);
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// Fetcher serving specification text from memory.
#[derive(Default)]
pub struct StaticSpecFetcher {
    specs: HashMap<String, String>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl StaticSpecFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spec(mut self, source: impl Into<String>, content: impl Into<String>) -> Self {
        self.specs.insert(source.into(), content.into());
        self
    }

    /// Number of fetch attempts for `source`, successful or not.
    pub fn fetch_count(&self, source: &str) -> usize {
        lock(&self.fetches).get(source).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SpecFetcher for StaticSpecFetcher {
    async fn fetch(&self, source: &str) -> Result<String> {
        *lock(&self.fetches).entry(source.to_string()).or_default() += 1;
        self.specs
            .get(source)
            .cloned()
            .ok_or_else(|| PipelineError::spec_load(source, "no such document"))
    }
}

/// Classifier that replays a fixed script of replies.
///
/// `None` entries stand for an empty answer. Running past the end of the
/// script is a backend error.
#[derive(Default)]
pub struct ScriptedClassifier {
    replies: Mutex<VecDeque<Option<String>>>,
    requests: Mutex<Vec<ClassificationRequest>>,
}

impl ScriptedClassifier {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_replies(replies.into_iter().map(|r| Some(r.into())).collect())
    }

    pub fn with_replies(replies: Vec<Option<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<ClassificationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> std::result::Result<Option<String>, ClassifierError> {
        lock(&self.requests).push(request);
        lock(&self.replies)
            .pop_front()
            .ok_or_else(|| ClassifierError::Backend("classifier script exhausted".to_string()))
    }
}

/// Language model returning canned responses in order.
///
/// Once the list is exhausted the last response repeats.
pub struct MockLLM {
    responses: Mutex<VecDeque<Option<String>>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<LLMRequest>>,
}

impl MockLLM {
    pub fn new() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_response(text: impl Into<String>) -> Self {
        Self::with_responses(vec![Some(text.into())])
    }

    pub fn with_responses(responses: Vec<Option<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<LLMRequest> {
        lock(&self.requests).clone()
    }
}

impl Default for MockLLM {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLM for MockLLM {
    fn name(&self) -> &str {
        "mock-model"
    }

    async fn generate_content(&self, request: LLMRequest) -> cx_core::Result<LLMResponse> {
        lock(&self.requests).push(request);

        let next = lock(&self.responses).pop_front();
        let text = match next {
            Some(text) => {
                *lock(&self.last) = text.clone();
                text
            }
            None => lock(&self.last).clone(),
        };

        Ok(LLMResponse {
            content: text.map(Content::new_model_text),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        })
    }
}
