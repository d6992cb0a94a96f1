//! LLM provider implementations
//!
//! # Available Providers
//!
//! - **OpenAI**: OpenAI chat completions (and OpenAI-compatible endpoints)
//!
//! # Example
//!
//! ```ignore
//! use cx_core::{CxConfig, providers::OpenAIProvider};
//!
//! let config = CxConfig::load_or_env()?;
//! let provider = OpenAIProvider::from_config(&config)?;
//! let response = provider.generate_content(request).await?;
//! ```

pub mod openai;

pub use openai::{OpenAIBuilder, OpenAIConfig, OpenAIProvider};
