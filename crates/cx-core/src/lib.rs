//! Core traits and types for the commerce agent toolkit
//!
//! This crate provides the foundational abstractions shared by the pipeline
//! and tool crates: errors, configuration, credentials, session context and
//! the LLM/tool traits.

pub mod auth;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod providers;
pub mod traits;

// Re-exports
pub use auth::{AuthDescriptor, GrantType, KeyAuthentication, TokenAuthentication};
pub use config::{CxConfig, TokenPolicy};
pub use content::{Content, Part};
pub use context::{DefaultToolContext, SessionContext, ToolContext};
pub use error::{Error, Result};
pub use traits::{GenerateConfig, LLM, LLMRequest, LLMResponse, OutputSchema, Tool, ToolResponse};
