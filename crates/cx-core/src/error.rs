use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM request failed: {0}")]
    LLMError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Helper for creating configuration errors
    ///
    /// # Example
    /// ```
    /// use cx_core::Error;
    /// let err = Error::config_error("EP_BASE_URL is not set");
    /// ```
    pub fn config_error(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Helper for creating general errors with a message
    pub fn message(msg: impl Into<String>) -> Self {
        Error::Other(anyhow::anyhow!("{}", msg.into()))
    }

    /// Helper for creating authentication errors
    ///
    /// # Example
    /// ```
    /// use cx_core::Error;
    /// let err = Error::auth_error("client secret is required for client_credentials");
    /// ```
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Error::Auth(msg.into())
    }

    /// Whether this error came from missing or invalid configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
