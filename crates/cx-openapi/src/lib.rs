//! Endpoint resolution and execution for the commerce agent.
//!
//! Turns a shopper's or merchandiser's free-text request into a concrete
//! commerce API call: the intent classifier picks an operation from an
//! OpenAPI document or from retrieved specification fragments, the plan is
//! checked once and revised at most once, placeholders are filled from the
//! session, credentials are resolved and the request is executed. Every
//! server answer and transport failure comes back as a [`ResultEnvelope`].
//!
//! # Example
//!
//! ```no_run
//! use cx_core::{AuthDescriptor, CxConfig, SessionContext};
//! use cx_core::providers::OpenAIProvider;
//! use cx_openapi::{CommercePipeline, Corpus};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CxConfig::load_or_env()?;
//! let llm = Arc::new(OpenAIProvider::from_config(&config)?);
//! let pipeline = CommercePipeline::from_config(&config, llm)?;
//!
//! let session = SessionContext::new()
//!     .with_cart_id("cart-42")
//!     .with_auth(AuthDescriptor::implicit("client-id"))
//!     .with_base_url(config.commerce_base_url()?);
//!
//! let outcome = pipeline
//!     .run(
//!         "add product ABC123 to cart",
//!         &Corpus::specification(cx_openapi::toolset::CARTS_SPEC_URL),
//!         &session,
//!     )
//!     .await?;
//! println!("{}", outcome.render());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod classifier;
pub mod deref;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod guard;
pub mod intent;
pub mod parser;
pub mod pipeline;
pub mod placeholders;
pub mod prompts;
pub mod retriever;
pub mod testing;
pub mod toolset;
pub mod types;
pub mod validation;

pub use auth::{AuthResolver, TOKEN_ENDPOINT, token_exchange_form};
pub use cache::{Clock, HttpSpecFetcher, SpecCache, SpecFetcher, SystemClock};
pub use classifier::{ClassificationRequest, IntentClassifier, LlmClassifier, output_schema};
pub use error::{ClassifierError, PipelineError, Result};
pub use executor::{
    HttpOutcome, RequestExecutor, RequestOptions, ResultEnvelope, TransportFailure, join_url,
};
pub use formatter::{OperationSynopsis, format_operation, list_operations, match_template};
pub use intent::{Corpus, EndpointChoice, IntentResolver, PlanReply, Resolution};
pub use parser::OpenApiParser;
pub use pipeline::{CommercePipeline, CommercePipelineBuilder, PipelineOutcome};
pub use retriever::{InMemoryRetriever, Retriever};
pub use toolset::{CommerceApiTool, CommerceToolset, ExecRequestTool, Persona};
pub use types::{HttpMethod, Operation, ResolvedPlan, SpecDocument};
pub use validation::{PlanValidator, Verdict};
