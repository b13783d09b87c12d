//! Password sign-in, sign-up and token refresh.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Endpoints;
use crate::error::{AuthError, Result};
use crate::fingerprint::VisitorIdSource;
use crate::service::OutcomeResponse;
use crate::session::AuthOutcome;
use crate::token::TokenPair;

/// New-account details for sign-up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Backend client for classic credential auth.
///
/// Thin request/response wrappers; responses share the outcome shape of the
/// Telegram endpoints, so a password sign-in can also surface a two-factor
/// requirement.
pub struct PasswordAuthService {
    client: reqwest::Client,
    endpoints: Endpoints,
    visitor: Option<Arc<dyn VisitorIdSource>>,
}

impl PasswordAuthService {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            visitor: None,
        }
    }

    pub fn with_visitor_id_source(mut self, source: Arc<dyn VisitorIdSource>) -> Self {
        self.visitor = Some(source);
        self
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let mut request = self.client.post(url);
        if let Some(visitor) = &self.visitor {
            request = request.header("X-Visitor-Id", visitor.visitor_id());
        }
        request
    }

    /// Sign in with email and password.
    ///
    /// Rejected credentials and transport failures map to
    /// [`AuthOutcome::Denied`]; a two-factor requirement passes through.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome {
        let url = self.endpoints.url(&self.endpoints.sign_in_path);
        self.post_outcome(url, &json!({ "email": email, "password": password }))
            .await
    }

    /// Register a new account.
    pub async fn sign_up(&self, account: &NewAccount) -> AuthOutcome {
        let url = self.endpoints.url(&self.endpoints.sign_up_path);
        self.post_outcome(url, account).await
    }

    /// Exchange a refresh token for a fresh token pair.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses, and responses without tokens.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let url = self.endpoints.url(&self.endpoints.refresh_path);
        let resp = self
            .post(url)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::api(
                resp.status().as_u16(),
                "token refresh rejected",
            ));
        }
        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|err| AuthError::InvalidResponse(err.to_string()))?;
        body.tokens
            .ok_or_else(|| AuthError::InvalidResponse("refresh response missing tokens".into()))
    }

    async fn post_outcome<B: Serialize>(&self, url: String, body: &B) -> AuthOutcome {
        let resp = match self.post(url).json(body).send().await {
            Ok(resp) => resp,
            Err(err) => return AuthOutcome::denied(err.to_string()),
        };
        if !resp.status().is_success() {
            return AuthOutcome::denied(format!("rejected with status {}", resp.status()));
        }
        match resp.json::<OutcomeResponse>().await {
            Ok(outcome) => outcome.into_outcome(),
            Err(err) => AuthOutcome::denied(err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    tokens: Option<TokenPair>,
}
