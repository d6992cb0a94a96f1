//! Credential resolution for commerce API requests.
//!
//! Token descriptors pass straight through. Key descriptors are exchanged at
//! [`TOKEN_ENDPOINT`], once per request by default or cached until shortly
//! before the token expires with [`TokenPolicy::Cached`].

use crate::cache::{Clock, SystemClock};
use crate::error::{PipelineError, Result};
use crate::executor::{RequestExecutor, RequestOptions, ResultEnvelope};
use crate::types::HttpMethod;
use chrono::{DateTime, Utc};
use cx_core::{AuthDescriptor, GrantType, KeyAuthentication, SessionContext, TokenPolicy};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const TOKEN_ENDPOINT: &str = "/oauth/access_token";

pub const STORE_ID_HEADER: &str = "Ep-Store-Id";
pub const ORG_ID_HEADER: &str = "Ep-Org-Id";

/// Cached tokens are dropped this many seconds before they expire.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenGrant {
    #[serde(default)]
    access_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    expires_in: Option<i64>,
    /// Expiry as a unix timestamp
    #[serde(default)]
    expires: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// (base URL, grant type, client id)
type TokenKey = (String, GrantType, String);

/// Turns an [`AuthDescriptor`] into [`RequestOptions`].
pub struct AuthResolver {
    executor: RequestExecutor,
    policy: TokenPolicy,
    tokens: DashMap<TokenKey, CachedToken>,
    clock: Arc<dyn Clock>,
}

impl AuthResolver {
    pub fn new(executor: RequestExecutor) -> Self {
        Self {
            executor,
            policy: TokenPolicy::default(),
            tokens: DashMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_policy(mut self, policy: TokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Build request options for `descriptor` against `base_url`.
    ///
    /// A missing descriptor or base URL is a configuration error raised
    /// before any network traffic.
    pub async fn resolve(
        &self,
        descriptor: Option<&AuthDescriptor>,
        base_url: Option<&str>,
        session: &SessionContext,
    ) -> Result<RequestOptions> {
        let descriptor = descriptor.ok_or_else(|| {
            PipelineError::config(
                "No authentication configured: provide an access token or client keys",
            )
        })?;
        let base_url = base_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PipelineError::config("No commerce API base URL configured"))?;
        descriptor.validate()?;

        match descriptor {
            AuthDescriptor::Token(token) => {
                let mut options =
                    RequestOptions::new(base_url).with_token(token.access_token.clone());
                if let Some(store_id) = token.store_id.as_deref().filter(|s| !s.is_empty()) {
                    options = options.with_header(STORE_ID_HEADER, store_id);
                }
                if let Some(org_id) = token.organization_id.as_deref().filter(|s| !s.is_empty()) {
                    options = options.with_header(ORG_ID_HEADER, org_id);
                }
                Ok(options)
            }
            AuthDescriptor::Keys(keys) => {
                let token = self.token_for(keys, base_url, session).await?;
                Ok(RequestOptions::new(base_url).with_token(token))
            }
        }
    }

    async fn token_for(
        &self,
        keys: &KeyAuthentication,
        base_url: &str,
        session: &SessionContext,
    ) -> Result<String> {
        let key: TokenKey = (base_url.to_string(), keys.grant_type, keys.client_id.clone());

        if self.policy == TokenPolicy::Cached
            && let Some(cached) = self.tokens.get(&key).map(|entry| entry.value().clone())
        {
            if cached.expires_at > self.clock.now() {
                debug!("Reusing cached {} token", keys.grant_type);
                return Ok(cached.token);
            }
            self.tokens.remove(&key);
        }

        let grant = self.exchange(keys, base_url, session).await?;
        let token = grant
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                PipelineError::Auth("token exchange response has no access_token".to_string())
            })?;

        if self.policy == TokenPolicy::Cached {
            match self.expiry(grant.expires_in, grant.expires) {
                Some(expires_at) => {
                    self.tokens.insert(
                        key,
                        CachedToken {
                            token: token.clone(),
                            expires_at,
                        },
                    );
                }
                None => debug!("Token response has no usable expiry, not caching"),
            }
        }
        Ok(token)
    }

    async fn exchange(
        &self,
        keys: &KeyAuthentication,
        base_url: &str,
        session: &SessionContext,
    ) -> Result<TokenGrant> {
        info!("Exchanging {} credentials for an access token", keys.grant_type);
        let options = RequestOptions::new(base_url).with_body(token_exchange_form(keys));
        let envelope = self
            .executor
            .execute(HttpMethod::Post, TOKEN_ENDPOINT, &options, session)
            .await;

        match envelope {
            ResultEnvelope::Completed(outcome) if outcome.success => {
                Ok(serde_json::from_value(outcome.data).map_err(|e| {
                    PipelineError::Auth(format!("unreadable token exchange response: {}", e))
                })?)
            }
            ResultEnvelope::Completed(outcome) => Err(PipelineError::Auth(format!(
                "token exchange returned {} {}: {}",
                outcome.status, outcome.status_text, outcome.data
            ))),
            ResultEnvelope::Failed(failure) => match failure.error.as_str() {
                "cancelled" => Err(PipelineError::Cancelled("token exchange")),
                "timeout" => Err(PipelineError::Timeout {
                    stage: "token exchange",
                    timeout: self.executor.timeout(),
                }),
                _ => Err(PipelineError::Auth(format!(
                    "token exchange failed: {}",
                    failure.message
                ))),
            },
        }
    }

    fn expiry(&self, expires_in: Option<i64>, expires: Option<i64>) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let expires_at = match (expires_in, expires) {
            (Some(secs), _) => now + chrono::Duration::seconds(secs),
            (None, Some(epoch)) => DateTime::from_timestamp(epoch, 0)?,
            (None, None) => return None,
        };
        let expires_at = expires_at - chrono::Duration::seconds(EXPIRY_SKEW_SECS);
        (expires_at > now).then_some(expires_at)
    }
}

/// Form fields for the token exchange. Only `client_credentials` sends the
/// client secret.
pub fn token_exchange_form(keys: &KeyAuthentication) -> Value {
    let mut form = Map::new();
    form.insert(
        "grant_type".to_string(),
        Value::String(keys.grant_type.as_str().to_string()),
    );
    form.insert(
        "client_id".to_string(),
        Value::String(keys.client_id.clone()),
    );
    if keys.grant_type == GrantType::ClientCredentials
        && let Some(secret) = &keys.client_secret
    {
        form.insert("client_secret".to_string(), Value::String(secret.clone()));
    }
    Value::Object(form)
}
