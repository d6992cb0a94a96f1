//! Print what the intent classifier sees for an OpenAPI document.
//!
//! Without `--method`/`--path` this lists every operation, one line each.
//! With both it prints the detailed rendering used to plan a request.
//!
//! Run with:
//! ```bash
//! cargo run --example inspect_spec -- --spec ./carts.yaml --method post --path '/v2/carts/{cartId}/items'
//! ```

use clap::Parser;
use cx_core::SessionContext;
use cx_openapi::formatter::render_synopses;
use cx_openapi::toolset::CARTS_SPEC_URL;
use cx_openapi::{HttpMethod, SpecCache, format_operation, list_operations};

#[derive(Parser, Debug)]
#[command(about = "Inspect an OpenAPI document the way the classifier sees it")]
struct Args {
    /// OpenAPI document URL or local path
    #[arg(long, default_value = CARTS_SPEC_URL)]
    spec: String,

    #[arg(long, requires = "path")]
    method: Option<HttpMethod>,

    /// Path template, or a concrete path matching one
    #[arg(long, requires = "method")]
    path: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let specs = SpecCache::new();
    let doc = specs.load(&args.spec, &SessionContext::new()).await?;

    match (args.method, args.path.as_deref()) {
        (Some(method), Some(path)) => {
            let template =
                cx_openapi::match_template(&doc, method, path).unwrap_or_else(|| path.to_string());
            println!("{}", format_operation(&doc, &template, method));
        }
        _ => {
            println!("{} {} ({} operations)\n", doc.title, doc.version, doc.operation_count());
            println!("{}", render_synopses(&list_operations(&doc)));
        }
    }

    Ok(())
}
