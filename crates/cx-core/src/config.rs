//! Configuration management for the commerce agent toolkit
//!
//! Loads configuration with priority:
//! 1. config.toml (or specified config file)
//! 2. Environment variables (fallback, `.env` honoured)
//! 3. Defaults

use crate::auth::{AuthDescriptor, GrantType};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Toolkit configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CxConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub commerce: CommerceConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Model/LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model provider (only "openai" is bundled)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key (can reference env var with ${VAR_NAME})
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Base URL for OpenAI-compatible endpoints
    pub base_url: Option<String>,
}

/// Commerce platform connection and credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommerceConfig {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    /// "implicit" or "client_credentials"; inferred from the secret when unset
    pub grant_type: Option<String>,

    /// Pre-minted token; takes precedence over client keys
    pub access_token: Option<String>,
    pub store_id: Option<String>,
    pub organization_id: Option<String>,
}

/// How access tokens obtained from key exchanges are reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    /// Exchange keys for a fresh token on every request
    #[default]
    PerRequest,
    /// Reuse tokens until shortly before they expire
    Cached,
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_spec_cache_ttl_secs")]
    pub spec_cache_ttl_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_classifier_timeout_secs")]
    pub classifier_timeout_secs: u64,

    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    #[serde(default)]
    pub token_policy: TokenPolicy,

    /// Run the validation/revision step after planning
    #[serde(default = "default_true")]
    pub validate_plans: bool,
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracer name reported to OpenTelemetry
    pub service_name: Option<String>,

    /// Emit logs as JSON lines instead of the human-readable format
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model_name: default_model_name(),
            base_url: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            spec_cache_ttl_secs: default_spec_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            classifier_timeout_secs: default_classifier_timeout_secs(),
            retrieval_top_k: default_retrieval_top_k(),
            token_policy: TokenPolicy::default(),
            validate_plans: true,
        }
    }
}

impl PipelineConfig {
    pub fn spec_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.spec_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }
}

impl CxConfig {
    /// Load configuration with the following priority:
    /// 1. config.toml in current directory or a parent
    /// 2. Environment variables (fallback)
    /// 3. Defaults
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p.to_path_buf()
        } else {
            Self::find_config_file()?
        };

        tracing::debug!("Loading configuration from: {:?}", config_path);

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let mut config: CxConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        config.resolve_env_vars();

        Ok(config)
    }

    /// Build configuration purely from the environment (and `.env`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.resolve_env_vars();
        config
    }

    /// Use config.toml when one can be found, the environment otherwise.
    pub fn load_or_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        match Self::find_config_file() {
            Ok(path) => Self::load_from(Some(&path)),
            Err(_) => {
                tracing::debug!("No config.toml found, using environment variables");
                Ok(Self::from_env())
            }
        }
    }

    /// Find config.toml by searching current directory and parents
    fn find_config_file() -> Result<PathBuf> {
        let mut current = env::current_dir()?;

        loop {
            let config_path = current.join("config.toml");
            if config_path.exists() {
                return Ok(config_path);
            }

            if !current.pop() {
                break;
            }
        }

        Err(anyhow!(
            "config.toml not found. Create one with: cp config.toml.example config.toml"
        ))
    }

    /// Resolve ${VAR_NAME} references and fill unset fields from the environment
    fn resolve_env_vars(&mut self) {
        resolve_field(&mut self.model.api_key, "OPENAI_API_KEY");
        resolve_field(&mut self.model.base_url, "OPENAI_BASE_URL");

        if let Some(resolved) = Self::resolve_env_var(&self.model.model_name) {
            self.model.model_name = resolved;
        } else {
            self.model.model_name = default_model_name();
        }
        // AGENT_MODEL overrides the built-in default, never an explicit choice
        if self.model.model_name == default_model_name()
            && let Ok(model) = env::var("AGENT_MODEL")
            && !model.is_empty()
        {
            self.model.model_name = model;
        }

        let commerce = &mut self.commerce;
        resolve_field(&mut commerce.base_url, "EP_BASE_URL");
        resolve_field(&mut commerce.client_id, "EP_CLIENT_ID");
        resolve_field(&mut commerce.client_secret, "EP_CLIENT_SECRET");
        resolve_field(&mut commerce.grant_type, "EP_GRANT_TYPE");
        resolve_field(&mut commerce.access_token, "EP_ACCESS_TOKEN");
        resolve_field(&mut commerce.store_id, "EP_STORE_ID");
        resolve_field(&mut commerce.organization_id, "EP_ORG_ID");
        resolve_field(&mut self.observability.service_name, "OTEL_SERVICE_NAME");
    }

    /// Resolve a single ${VAR_NAME} reference
    fn resolve_env_var(value: &str) -> Option<String> {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            env::var(var_name).ok()
        } else {
            Some(value.to_string())
        }
    }

    /// Credentials for the commerce API.
    ///
    /// A configured access token wins over client keys. Without an explicit
    /// grant type, a client secret selects `client_credentials`.
    pub fn auth_descriptor(&self) -> crate::Result<AuthDescriptor> {
        let commerce = &self.commerce;

        if let Some(token) = non_empty(&commerce.access_token) {
            let mut auth = AuthDescriptor::token(token);
            if let Some(store_id) = non_empty(&commerce.store_id) {
                auth = auth.with_store_id(store_id);
            }
            if let Some(org_id) = non_empty(&commerce.organization_id) {
                auth = auth.with_organization_id(org_id);
            }
            return Ok(auth);
        }

        let client_id = non_empty(&commerce.client_id).ok_or_else(|| {
            crate::Error::config_error(
                "No commerce credentials configured. Set EP_CLIENT_ID (and EP_CLIENT_SECRET \
                 for client_credentials) or EP_ACCESS_TOKEN",
            )
        })?;
        let secret = non_empty(&commerce.client_secret);

        let grant_type = match non_empty(&commerce.grant_type) {
            Some(grant) => grant.parse::<GrantType>()?,
            None if secret.is_some() => GrantType::ClientCredentials,
            None => GrantType::Implicit,
        };

        let auth = match grant_type {
            GrantType::Implicit => AuthDescriptor::implicit(client_id),
            GrantType::ClientCredentials => {
                let secret = secret.ok_or_else(|| {
                    crate::Error::config_error(
                        "EP_CLIENT_SECRET is required for the client_credentials grant",
                    )
                })?;
                AuthDescriptor::client_credentials(client_id, secret)
            }
        };
        auth.validate()?;
        Ok(auth)
    }

    /// Storefront credentials: always the implicit grant, even when a secret
    /// is configured.
    pub fn shopper_auth_descriptor(&self) -> crate::Result<AuthDescriptor> {
        let client_id = non_empty(&self.commerce.client_id)
            .ok_or_else(|| crate::Error::config_error("EP_CLIENT_ID is not set"))?;
        Ok(AuthDescriptor::implicit(client_id))
    }

    /// Commerce API base URL with a clear error message
    pub fn commerce_base_url(&self) -> crate::Result<String> {
        non_empty(&self.commerce.base_url)
            .map(str::to_string)
            .ok_or_else(|| {
                crate::Error::config_error(
                    "Commerce base URL not found. Set [commerce] base_url in config.toml \
                     or export EP_BASE_URL",
                )
            })
    }

    /// OpenAI API key with clear error message
    pub fn openai_api_key(&self) -> crate::Result<String> {
        non_empty(&self.model.api_key)
            .map(str::to_string)
            .ok_or_else(|| {
                crate::Error::config_error(
                    "OpenAI API key not found. Set [model] api_key in config.toml \
                     or export OPENAI_API_KEY",
                )
            })
    }

    /// Create test-friendly defaults (no network credentials required)
    pub fn test_defaults() -> Self {
        Self {
            model: ModelConfig {
                provider: "test".to_string(),
                api_key: Some("test-api-key".to_string()),
                model_name: "test-model".to_string(),
                base_url: None,
            },
            commerce: CommerceConfig {
                base_url: Some("http://localhost:8080".to_string()),
                client_id: Some("test-client".to_string()),
                ..Default::default()
            },
            pipeline: PipelineConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Resolve a `${VAR}` reference in place, or fall back to `env_name` when the
/// field is unset or the reference does not resolve.
fn resolve_field(field: &mut Option<String>, env_name: &str) {
    let resolved = match field.as_deref() {
        Some(value) => CxConfig::resolve_env_var(value),
        None => None,
    };
    *field = resolved
        .filter(|v| !v.is_empty())
        .or_else(|| env::var(env_name).ok().filter(|v| !v.is_empty()));
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_spec_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_classifier_timeout_secs() -> u64 {
    60
}

fn default_retrieval_top_k() -> usize {
    5
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CxConfig::test_defaults();
        assert_eq!(config.model.provider, "test");
        assert_eq!(config.pipeline.spec_cache_ttl(), Duration::from_secs(1800));
        assert_eq!(config.pipeline.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.pipeline.token_policy, TokenPolicy::PerRequest);
        assert!(config.pipeline.validate_plans);
    }

    #[test]
    fn test_resolve_env_var() {
        unsafe {
            env::set_var("CX_TEST_VAR", "test_value");
        }

        let resolved = CxConfig::resolve_env_var("${CX_TEST_VAR}");
        assert_eq!(resolved, Some("test_value".to_string()));

        let not_var = CxConfig::resolve_env_var("plain_value");
        assert_eq!(not_var, Some("plain_value".to_string()));

        let missing = CxConfig::resolve_env_var("${CX_TEST_VAR_MISSING}");
        assert_eq!(missing, None);

        unsafe {
            env::remove_var("CX_TEST_VAR");
        }
    }

    #[test]
    fn test_resolve_field_falls_back_to_env() {
        unsafe {
            env::set_var("CX_TEST_FALLBACK", "from-env");
        }

        let mut unset = None;
        resolve_field(&mut unset, "CX_TEST_FALLBACK");
        assert_eq!(unset.as_deref(), Some("from-env"));

        let mut explicit = Some("explicit".to_string());
        resolve_field(&mut explicit, "CX_TEST_FALLBACK");
        assert_eq!(explicit.as_deref(), Some("explicit"));

        let mut dangling = Some("${CX_TEST_DANGLING}".to_string());
        resolve_field(&mut dangling, "CX_TEST_FALLBACK");
        assert_eq!(dangling.as_deref(), Some("from-env"));

        unsafe {
            env::remove_var("CX_TEST_FALLBACK");
        }
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [model]
            model_name = "gpt-4o"

            [commerce]
            base_url = "https://useast.api.elasticpath.com"
            client_id = "abc"
            client_secret = "def"

            [pipeline]
            token_policy = "cached"
            request_timeout_secs = 5
            validate_plans = false

            [observability]
            service_name = "commerce-agent"
            json_logs = true
        "#;
        let config: CxConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.model_name, "gpt-4o");
        assert_eq!(config.pipeline.token_policy, TokenPolicy::Cached);
        assert_eq!(config.pipeline.request_timeout_secs, 5);
        assert_eq!(config.pipeline.classifier_timeout_secs, 60);
        assert!(!config.pipeline.validate_plans);
        assert_eq!(
            config.observability.service_name.as_deref(),
            Some("commerce-agent")
        );
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_auth_descriptor_selection() {
        let mut config = CxConfig::test_defaults();
        assert_eq!(
            config.auth_descriptor().unwrap(),
            AuthDescriptor::implicit("test-client")
        );

        config.commerce.client_secret = Some("secret".to_string());
        assert_eq!(
            config.auth_descriptor().unwrap(),
            AuthDescriptor::client_credentials("test-client", "secret")
        );

        config.commerce.grant_type = Some("implicit".to_string());
        assert_eq!(
            config.auth_descriptor().unwrap(),
            AuthDescriptor::implicit("test-client")
        );

        config.commerce.access_token = Some("tok".to_string());
        config.commerce.store_id = Some("store".to_string());
        assert_eq!(
            config.auth_descriptor().unwrap(),
            AuthDescriptor::token("tok").with_store_id("store")
        );
    }

    #[test]
    fn test_shopper_descriptor_ignores_secret() {
        let mut config = CxConfig::test_defaults();
        config.commerce.client_secret = Some("secret".to_string());
        assert_eq!(
            config.shopper_auth_descriptor().unwrap(),
            AuthDescriptor::implicit("test-client")
        );
    }

    #[test]
    fn test_missing_values_are_config_errors() {
        let mut config = CxConfig::test_defaults();
        config.commerce.client_id = None;
        assert!(config.auth_descriptor().unwrap_err().is_config());

        config.commerce.client_id = Some("abc".to_string());
        config.commerce.grant_type = Some("client_credentials".to_string());
        assert!(config.auth_descriptor().unwrap_err().is_config());

        config.commerce.base_url = Some("  ".to_string());
        assert!(config.commerce_base_url().unwrap_err().is_config());

        config.model.api_key = None;
        assert!(config.openai_api_key().unwrap_err().is_config());
    }
}
