//! Commerce platform credential descriptors
//!
//! A request context carries exactly one [`AuthDescriptor`]: either a token
//! that was minted elsewhere (storefront session, admin console) or a pair of
//! client keys that must be exchanged for a token before the request is sent.
//!
//! # Examples
//!
//! ## Token authentication
//! ```toml
//! [commerce]
//! access_token = "${EP_ACCESS_TOKEN}"
//! store_id = "my-store"
//! ```
//!
//! ## Key authentication
//! ```toml
//! [commerce]
//! grant_type = "client_credentials"
//! client_id = "${EP_CLIENT_ID}"
//! client_secret = "${EP_CLIENT_SECRET}"
//! ```

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials used to authenticate against the commerce API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthDescriptor {
    /// A bearer token that is passed through unchanged
    Token(TokenAuthentication),

    /// Client keys that are exchanged at `/oauth/access_token`
    Keys(KeyAuthentication),
}

/// Token-based credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAuthentication {
    pub access_token: String,

    /// Sent as `Ep-Store-Id` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,

    /// Sent as `Ep-Org-Id` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

/// OAuth grant used for the token exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Public storefront grant; never carries a client secret
    #[default]
    Implicit,
    /// Confidential grant; always carries the client secret
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Implicit => "implicit",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GrantType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "implicit" => Ok(GrantType::Implicit),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            other => Err(Error::config_error(format!(
                "Unsupported grant type '{}'. Must be either 'implicit' or 'client_credentials'",
                other
            ))),
        }
    }
}

/// Key-based credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAuthentication {
    pub grant_type: GrantType,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl AuthDescriptor {
    /// Token authentication without store or organization headers.
    pub fn token(access_token: impl Into<String>) -> Self {
        Self::Token(TokenAuthentication {
            access_token: access_token.into(),
            store_id: None,
            organization_id: None,
        })
    }

    /// Implicit grant for storefront (shopper) access.
    pub fn implicit(client_id: impl Into<String>) -> Self {
        Self::Keys(KeyAuthentication {
            grant_type: GrantType::Implicit,
            client_id: client_id.into(),
            client_secret: None,
        })
    }

    /// Client credentials grant for administrative (merchandiser) access.
    pub fn client_credentials(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::Keys(KeyAuthentication {
            grant_type: GrantType::ClientCredentials,
            client_id: client_id.into(),
            client_secret: Some(secret.into()),
        })
    }

    /// Attach a store id. Has no effect on key-based descriptors.
    pub fn with_store_id(mut self, store_id: impl Into<String>) -> Self {
        if let Self::Token(ref mut token) = self {
            token.store_id = Some(store_id.into());
        }
        self
    }

    /// Attach an organization id. Has no effect on key-based descriptors.
    pub fn with_organization_id(mut self, organization_id: impl Into<String>) -> Self {
        if let Self::Token(ref mut token) = self {
            token.organization_id = Some(organization_id.into());
        }
        self
    }

    /// Grant type of a key-based descriptor, `None` for tokens.
    pub fn grant_type(&self) -> Option<GrantType> {
        match self {
            Self::Token(_) => None,
            Self::Keys(keys) => Some(keys.grant_type),
        }
    }

    /// Reject descriptors that cannot possibly authenticate.
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            Self::Token(token) if token.access_token.trim().is_empty() => {
                Err(Error::config_error("access token is empty"))
            }
            Self::Keys(keys) if keys.client_id.trim().is_empty() => {
                Err(Error::config_error("client id is empty"))
            }
            Self::Keys(KeyAuthentication {
                grant_type: GrantType::ClientCredentials,
                client_secret,
                ..
            }) if client_secret.as_deref().is_none_or(|s| s.is_empty()) => Err(
                Error::config_error("client secret is required for the client_credentials grant"),
            ),
            _ => Ok(()),
        }
    }
}

// Secrets never reach logs through Debug output.
impl fmt::Debug for TokenAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthentication")
            .field("access_token", &"<redacted>")
            .field("store_id", &self.store_id)
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

impl fmt::Debug for KeyAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAuthentication")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
