//! Endpoint and flow configuration.

use std::time::Duration;

/// Default OAuth page the redirect URL is built against.
pub const DEFAULT_OAUTH_BASE: &str = "https://oauth.telegram.org/auth";

/// Backend endpoint set used by the services.
///
/// Paths are relative to `api_base`; every one can be overridden, which is
/// also how tests point a service at a mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api_base: String,
    pub oauth_base: String,
    pub init_path: String,
    pub confirm_path: String,
    pub widget_auth_path: String,
    pub two_factor_base: String,
    pub sign_in_path: String,
    pub sign_up_path: String,
    pub refresh_path: String,
}

impl Endpoints {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            oauth_base: DEFAULT_OAUTH_BASE.to_string(),
            init_path: "/auth/telegram/init".to_string(),
            confirm_path: "/auth/telegram/confirm".to_string(),
            widget_auth_path: "/auth/telegram".to_string(),
            two_factor_base: "/auth/2fa".to_string(),
            sign_in_path: "/auth/sign-in".to_string(),
            sign_up_path: "/auth/sign-up".to_string(),
            refresh_path: "/auth/refresh".to_string(),
        }
    }

    /// Read the endpoint set from the environment.
    ///
    /// Honors `TGLOGIN_API_BASE` and `TGLOGIN_OAUTH_BASE`; loads a `.env`
    /// file first when present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let api_base =
            std::env::var("TGLOGIN_API_BASE").unwrap_or_else(|_| "http://localhost:8080".into());
        let mut endpoints = Self::new(api_base);
        if let Ok(oauth) = std::env::var("TGLOGIN_OAUTH_BASE") {
            endpoints.oauth_base = oauth;
        }
        endpoints
    }

    pub fn with_oauth_base(mut self, base: impl Into<String>) -> Self {
        self.oauth_base = base.into();
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }

    pub fn two_factor_url(&self, suffix: &str) -> String {
        format!(
            "{}{}{}",
            self.api_base.trim_end_matches('/'),
            self.two_factor_base,
            suffix
        )
    }
}

/// Retry budget for the confirmation polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Issue at most this many confirm calls before giving up.
    Bounded(u32),
    /// Poll until confirmed or aborted.
    Unbounded,
}

impl Default for RetryLimit {
    fn default() -> Self {
        Self::Bounded(10)
    }
}

/// Options governing the orchestrated sign-in flow.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// Delay between confirmation attempts.
    pub poll_interval: Duration,
    /// How many confirmation attempts to make.
    pub retry_limit: RetryLimit,
    /// Link an existing account instead of signing in.
    pub binding: bool,
    /// Begin polling as soon as init yields a session id.
    pub auto_start: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            retry_limit: RetryLimit::default(),
            binding: false,
            auto_start: false,
        }
    }
}

impl FlowOptions {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_limit(mut self, limit: RetryLimit) -> Self {
        self.retry_limit = limit;
        self
    }

    pub fn binding(mut self, binding: bool) -> Self {
        self.binding = binding;
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let endpoints = Endpoints::new("https://api.test/");
        assert_eq!(endpoints.url("/auth/telegram/init"), "https://api.test/auth/telegram/init");
        assert_eq!(
            endpoints.two_factor_url("/verify/telegram"),
            "https://api.test/auth/2fa/verify/telegram"
        );
    }

    #[test]
    fn defaults_match_documented_values() {
        let options = FlowOptions::default();
        assert_eq!(options.poll_interval, Duration::from_secs(3));
        assert_eq!(options.retry_limit, RetryLimit::Bounded(10));
        assert!(!options.binding);
        assert!(!options.auto_start);
    }
}
