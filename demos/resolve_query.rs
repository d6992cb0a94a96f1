//! Resolve a free-text request against a commerce API specification and run it.
//!
//! ## Configuration
//!
//! Reads config.toml (or the environment):
//! ```toml
//! [model]
//! api_key = "${OPENAI_API_KEY}"
//!
//! [commerce]
//! base_url = "https://useast.api.elasticpath.com"
//! client_id = "${EP_CLIENT_ID}"
//! ```
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run --example resolve_query -- "add product ABC123 to cart" --cart-id my-cart
//! ```

use clap::Parser;
use cx_core::providers::OpenAIProvider;
use cx_core::{CxConfig, SessionContext};
use cx_openapi::toolset::CARTS_SPEC_URL;
use cx_openapi::{CommercePipeline, Corpus};
use cx_telemetry::{TelemetryOptions, init_telemetry_with};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(about = "Resolve a request to a commerce API call and execute it")]
struct Args {
    /// What the user asked for
    query: String,

    /// OpenAPI document URL or local path
    #[arg(long, default_value = CARTS_SPEC_URL)]
    spec: String,

    /// Active cart, bound to the {cartId} placeholder
    #[arg(long)]
    cart_id: Option<String>,

    /// Use the configured administrative credentials instead of the implicit grant
    #[arg(long)]
    admin: bool,

    /// Print the plan without authenticating or sending anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = CxConfig::load_or_env()?;

    let mut telemetry = TelemetryOptions {
        json_logs: config.observability.json_logs,
        ..Default::default()
    };
    if let Some(service_name) = &config.observability.service_name {
        telemetry.service_name = service_name.clone();
    }
    init_telemetry_with(telemetry);

    let llm = Arc::new(OpenAIProvider::from_config(&config)?);
    let pipeline = CommercePipeline::from_config(&config, llm)?;

    let auth = if args.admin {
        config.auth_descriptor()?
    } else {
        config.shopper_auth_descriptor()?
    };
    let mut session = SessionContext::new()
        .with_auth(auth)
        .with_base_url(config.commerce_base_url()?);
    if let Some(cart_id) = &args.cart_id {
        session = session.with_cart_id(cart_id);
    }

    let corpus = Corpus::specification(&args.spec);

    if args.dry_run {
        let plan = pipeline
            .resolver()
            .resolve(&args.query, &corpus, &session)
            .await?;
        println!("{} {}", plan.method, plan.path);
        if let Some(body) = &plan.body {
            println!("{}", serde_json::to_string_pretty(body)?);
        }
        println!("\n{}", plan.explanation);
        return Ok(());
    }

    let outcome = pipeline.run(&args.query, &corpus, &session).await?;
    println!("{} {}\n", outcome.plan.method, outcome.endpoint);
    println!("{}", outcome.render());

    Ok(())
}
