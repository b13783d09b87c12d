//! Error types for tglogin.

use thiserror::Error;

/// Primary error type for all SDK operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing session id; call init_sign_in first")]
    MissingSessionId,
    #[error("Operation aborted")]
    Aborted,
    #[error("Confirmation retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("Login widget timed out after {waited_ms}ms")]
    WidgetTimeout { waited_ms: u64 },
    #[error("No login surface available: {0}")]
    WidgetUnavailable(String),
    #[error("Invalid login payload: {0}")]
    InvalidPayload(String),
    #[error("Stale login payload: signed {age_secs}s ago")]
    StalePayload { age_secs: i64 },
    #[error("Unsupported two-factor method: {0}")]
    UnsupportedMethod(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// Create an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether a polling loop may absorb this error into its retry budget.
    ///
    /// Covers transient transport failures and server-side errors; everything
    /// else (validation, state, configuration) is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Whether this error is a benign cancellation rather than a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<url::ParseError> for AuthError {
    fn from(error: url::ParseError) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AuthError>;
