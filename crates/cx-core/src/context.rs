//! Request-scoped session state
//!
//! Everything a pipeline run needs to know about the conversation it serves
//! travels in a [`SessionContext`]: the active cart, recent turns, values for
//! path placeholders, credentials, the commerce base URL and a cancellation
//! token. Nothing is kept in process-wide state.

use crate::auth::AuthDescriptor;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Tool context provided during tool execution
pub trait ToolContext: Send + Sync {
    fn function_call_id(&self) -> &str;
    fn invocation_id(&self) -> &str;

    /// Session the tool call belongs to
    fn session(&self) -> &SessionContext;
}

/// Request-scoped state threaded through every pipeline stage.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: String,
    cart_id: Option<String>,
    conversation_history: Vec<String>,
    // keyed by normalized name, value keeps the caller's spelling of the name
    bindings: BTreeMap<String, (String, String)>,
    auth: Option<AuthDescriptor>,
    base_url: Option<String>,
    cancellation: CancellationToken,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Empty session with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cart_id: None,
            conversation_history: Vec::new(),
            bindings: BTreeMap::new(),
            auth: None,
            base_url: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Replace the generated id, e.g. with the conversation's thread id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the active cart. Also binds the `cartId` placeholder.
    pub fn with_cart_id(mut self, cart_id: impl Into<String>) -> Self {
        let cart_id = cart_id.into();
        self.bind("cartId", cart_id.clone());
        self.cart_id = Some(cart_id);
        self
    }

    /// Bind a value for `{name}` path placeholders.
    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bind(name, value);
        self
    }

    pub fn with_history<I, S>(mut self, turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conversation_history = turns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth(mut self, auth: AuthDescriptor) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.bindings
            .insert(normalize_binding_name(&name), (name, value.into()));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cart_id(&self) -> Option<&str> {
        self.cart_id.as_deref()
    }

    pub fn conversation_history(&self) -> &[String] {
        &self.conversation_history
    }

    pub fn auth(&self) -> Option<&AuthDescriptor> {
        self.auth.as_ref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Look up a placeholder value. Names match ignoring case, `_` and `-`,
    /// so `cartId`, `cartID` and `cart_id` are the same binding.
    pub fn binding(&self, name: &str) -> Option<&str> {
        self.bindings
            .get(&normalize_binding_name(name))
            .map(|(_, value)| value.as_str())
    }

    /// All bindings as `(name, value)` in name order.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

fn normalize_binding_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Default implementation of ToolContext
#[derive(Debug, Clone)]
pub struct DefaultToolContext {
    function_call_id: String,
    invocation_id: String,
    session: SessionContext,
}

impl DefaultToolContext {
    pub fn new(function_call_id: String, invocation_id: String, session: SessionContext) -> Self {
        Self {
            function_call_id,
            invocation_id,
            session,
        }
    }

    /// Context with freshly generated call and invocation ids.
    pub fn for_session(session: SessionContext) -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            Uuid::new_v4().to_string(),
            session,
        )
    }
}

impl ToolContext for DefaultToolContext {
    fn function_call_id(&self) -> &str {
        &self.function_call_id
    }

    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn session(&self) -> &SessionContext {
        &self.session
    }
}
