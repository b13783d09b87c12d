//! Protocol-level Telegram auth operations: pure request/response, no polling.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::config::Endpoints;
use crate::error::{AuthError, Result};
use crate::events::{AuthEvent, EventSink, SharedSink, TracingSink};
use crate::fingerprint::VisitorIdSource;
use crate::payload::LoginPayload;
use crate::session::{AuthOutcome, ConfirmPoll, ConfirmRequest, SignInOptions, SignInSession};
use crate::token::{AuthUser, TokenPair};
use crate::two_factor::{TwoFactorKind, TwoFactorMethod};

/// Backend client for the Telegram sign-in protocol.
///
/// Stateless per call; each sign-in attempt is correlated across log records
/// by the id generated in [`init_sign_in`](Self::init_sign_in).
pub struct TelegramAuthService {
    client: reqwest::Client,
    endpoints: Endpoints,
    sink: SharedSink,
    visitor: Option<Arc<dyn VisitorIdSource>>,
    max_payload_age: chrono::Duration,
}

impl TelegramAuthService {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            sink: Arc::new(TracingSink),
            visitor: None,
            max_payload_age: chrono::Duration::hours(24),
        }
    }

    pub fn with_event_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_visitor_id_source(mut self, source: Arc<dyn VisitorIdSource>) -> Self {
        self.visitor = Some(source);
        self
    }

    /// Override the payload staleness window (default 24 h).
    pub fn with_max_payload_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_payload_age = max_age;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let mut request = self.client.post(url);
        if let Some(visitor) = &self.visitor {
            request = request.header("X-Visitor-Id", visitor.visitor_id());
        }
        request
    }

    /// Begin a Telegram sign-in attempt.
    ///
    /// The OAuth redirect URL is constructed client-side and is always part of
    /// the result; backend-issued fields (`session_id`, `code`, `qr`,
    /// `link_to_bot`) are merged in when the init call succeeds. A failing
    /// init call degrades to a redirect-only session rather than erroring;
    /// the caller can still open the login page.
    ///
    /// # Errors
    ///
    /// Only URL construction failures (malformed OAuth base) are fatal.
    pub async fn init_sign_in(&self, options: &SignInOptions) -> Result<SignInSession> {
        let correlation_id = Uuid::new_v4();
        let auth_url = build_auth_url(&self.endpoints.oauth_base, options)?;
        let mut session = SignInSession {
            correlation_id,
            auth_url,
            session_id: None,
            code: None,
            qr: None,
            link_to_bot: None,
            binding: options.binding,
        };

        self.sink.log(
            AuthEvent::new("telegram_sign_in_started")
                .with_correlation_id(correlation_id)
                .with_detail(json!({ "bot": options.bot_name, "binding": options.binding })),
        );

        let body = InitRequest {
            bot_name: &options.bot_name,
            redirect_url: options.redirect_url.as_deref(),
            origin: options.origin.as_deref(),
            is_binding: options.binding,
        };
        let url = self.endpoints.url(&self.endpoints.init_path);
        match self.post(url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<InitResponse>().await {
                Ok(init) => {
                    session.session_id = init.id;
                    session.code = init.code;
                    session.qr = init.qr;
                    session.link_to_bot = init.link_to_bot;
                }
                Err(err) => {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        error = %err,
                        "telegram init response unreadable; continuing with redirect URL only"
                    );
                }
            },
            Ok(resp) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    status = %resp.status(),
                    "telegram init rejected; continuing with redirect URL only"
                );
            }
            Err(err) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "telegram init unreachable; continuing with redirect URL only"
                );
            }
        }

        Ok(session)
    }

    /// Check a raw widget payload for required fields and freshness.
    ///
    /// Never errors; failures are logged as suspicious activity and reported
    /// to the event sink.
    pub fn validate_payload(&self, raw: &serde_json::Value) -> bool {
        let payload = match LoginPayload::parse(raw) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "suspicious telegram payload: missing required fields");
                self.sink.log(
                    AuthEvent::new("suspicious_auth_payload")
                        .with_detail(json!({ "reason": err.to_string() })),
                );
                return false;
            }
        };
        let now = Utc::now();
        if !payload.is_fresh(now, self.max_payload_age) {
            let age_secs = payload.age(now).num_seconds();
            tracing::warn!(age_secs, "suspicious telegram payload: stale auth_date");
            self.sink.log(
                AuthEvent::new("suspicious_auth_payload")
                    .with_detail(json!({ "reason": "stale", "age_secs": age_secs })),
            );
            return false;
        }
        true
    }

    /// Authenticate with a payload delivered directly by the widget.
    ///
    /// Validates and normalizes the payload, then posts it to the widget-auth
    /// endpoint. Invalid payloads are denied without a network call; backend
    /// and transport errors map to a denial rather than an `Err`.
    pub async fn handle_auth_result(&self, raw: &serde_json::Value) -> AuthOutcome {
        if !self.validate_payload(raw) {
            return AuthOutcome::denied("invalid telegram payload");
        }
        // validate_payload just parsed this successfully.
        let payload = match LoginPayload::parse(raw) {
            Ok(payload) => payload,
            Err(err) => return AuthOutcome::denied(err.to_string()),
        };

        let url = self.endpoints.url(&self.endpoints.widget_auth_path);
        let resp = match self.post(url).json(&payload).send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(error = %err, "widget auth request failed");
                return AuthOutcome::denied(err.to_string());
            }
        };
        if !resp.status().is_success() {
            return AuthOutcome::denied(format!(
                "widget auth rejected with status {}",
                resp.status()
            ));
        }
        match resp.json::<OutcomeResponse>().await {
            Ok(outcome) => outcome.into_outcome(),
            Err(err) => AuthOutcome::denied(err.to_string()),
        }
    }

    /// Ask the backend whether the session has been confirmed.
    ///
    /// Cancellation via `cancel` resolves to [`ConfirmPoll::Aborted`],
    /// distinguished from transport errors so callers do not burn their retry
    /// budget on a deliberate stop.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingSessionId`] when the request carries no id (no
    /// network call is made); transport and non-2xx failures otherwise.
    pub async fn confirm(
        &self,
        request: &ConfirmRequest,
        cancel: &CancellationToken,
    ) -> Result<ConfirmPoll> {
        let session_id = request.session_id.trim();
        if session_id.is_empty() {
            return Err(AuthError::MissingSessionId);
        }
        if cancel.is_cancelled() {
            return Ok(ConfirmPoll::Aborted);
        }

        let body = ConfirmBody {
            id: session_id,
            is_binding: request.binding,
            two_factor_type: request.two_factor,
        };
        let url = self.endpoints.url(&self.endpoints.confirm_path);
        let exchange = async {
            let resp = self.post(url).json(&body).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AuthError::api(
                    status.as_u16(),
                    "confirm request rejected".to_string(),
                ));
            }
            let outcome: OutcomeResponse = resp
                .json()
                .await
                .map_err(|err| AuthError::InvalidResponse(err.to_string()))?;
            outcome.into_poll()
        };

        tokio::select! {
            _ = cancel.cancelled() => Ok(ConfirmPoll::Aborted),
            result = exchange => result,
        }
    }
}

/// Build the OAuth redirect URL for the login page.
///
/// Fails before any network traffic when the base or parameters are
/// malformed; that failure is fatal to the sign-in attempt.
fn build_auth_url(oauth_base: &str, options: &SignInOptions) -> Result<String> {
    if options.bot_name.trim().is_empty() {
        return Err(AuthError::Configuration("bot_name is required".into()));
    }
    let mut url = Url::parse(oauth_base)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("bot_id", &options.bot_name);
        if let Some(redirect) = &options.redirect_url {
            query.append_pair("redirect_url", redirect);
        }
        if let Some(origin) = &options.origin {
            query.append_pair("origin", origin);
        }
        if !options.request_access.is_empty() {
            query.append_pair("request_access", &options.request_access.join(","));
        }
        if options.binding {
            query.append_pair("is_binding", "true");
        }
    }
    Ok(url.into())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitRequest<'a> {
    bot_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<&'a str>,
    is_binding: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    qr: Option<String>,
    #[serde(default)]
    link_to_bot: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody<'a> {
    id: &'a str,
    is_binding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    two_factor_type: Option<TwoFactorKind>,
}

/// Outcome-shaped backend response, shared by the confirm, widget-auth,
/// two-factor and password endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutcomeResponse {
    #[serde(default)]
    pub is_success: bool,
    #[serde(default)]
    pub tokens: Option<TokenPair>,
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default)]
    pub requires_two_factor: bool,
    #[serde(default)]
    pub two_factor_methods: Vec<TwoFactorMethod>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OutcomeResponse {
    fn granted(self) -> Result<(TokenPair, AuthUser)> {
        let tokens = self
            .tokens
            .ok_or_else(|| AuthError::InvalidResponse("success response missing tokens".into()))?;
        let user = self
            .user
            .ok_or_else(|| AuthError::InvalidResponse("success response missing user".into()))?;
        Ok((tokens, user))
    }

    pub fn into_poll(self) -> Result<ConfirmPoll> {
        if self.requires_two_factor && !self.two_factor_methods.is_empty() {
            return Ok(ConfirmPoll::TwoFactorRequired {
                methods: self.two_factor_methods,
            });
        }
        if self.is_success {
            let (tokens, user) = self.granted()?;
            return Ok(ConfirmPoll::Authorized { tokens, user });
        }
        // No success and no two-factor requirement: still pending.
        Ok(ConfirmPoll::Pending)
    }

    pub fn into_outcome(self) -> AuthOutcome {
        if self.requires_two_factor && !self.two_factor_methods.is_empty() {
            return AuthOutcome::TwoFactorRequired {
                methods: self.two_factor_methods,
            };
        }
        if self.is_success {
            return match self.granted() {
                Ok((tokens, user)) => AuthOutcome::Granted { tokens, user },
                Err(err) => AuthOutcome::denied(err.to_string()),
            };
        }
        let reason = self
            .error
            .unwrap_or_else(|| "authentication rejected".to_string());
        AuthOutcome::denied(reason)
    }
}
